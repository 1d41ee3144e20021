use std::io::Write;

/// 以默认等级（Info）初始化日志
///
/// 可以通过 `RUST_LOG` 覆盖，例如 `RUST_LOG=radiant_nrc=debug`。
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

/// 初始化日志，重复调用时静默忽略（测试中常见）
pub fn init_log_with_level(level: log::LevelFilter) {
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => {
                    buf.default_level_style(log::Level::Warn).fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)))
                }
                log::Level::Error => {
                    buf.default_level_style(log::Level::Error).fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)))
                }
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let text_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(75, 75, 75))));

            // SDK 回调转发过来的日志使用自定义 target，直接显示 target 更直观
            let origin = match (record.file(), record.line()) {
                (Some(file), Some(line)) if !record.target().starts_with("sdk::") => {
                    let file = file.rsplit(['/', '\\']).next().unwrap_or(file);
                    format!("{file}:{line}")
                }
                _ => record.target().to_string(),
            };
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {grey_style}[{origin}]{grey_style:#} \
                 {text_style}{}{text_style:#}",
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .try_init();
}
