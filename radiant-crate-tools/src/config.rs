use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// 从 TOML 文件加载配置
pub fn load_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).with_context(|| format!("读取配置文件失败: {:?}", path))?;

    parse_toml(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path))
}

/// 从 TOML 文本解析配置
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> anyhow::Result<T> {
    Ok(toml::from_str(content)?)
}

/// 保存配置到 TOML 文件
pub fn save_toml<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(value).context("序列化配置失败")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("创建配置目录失败: {:?}", parent))?;
    }
    fs::write(path, content).with_context(|| format!("写入配置文件失败: {:?}", path))?;

    Ok(())
}
