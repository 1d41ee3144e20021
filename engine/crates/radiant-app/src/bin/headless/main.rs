//! 离屏运行路径追踪的帧编排
//!
//! 读取 `config/pathtracer.toml`，在无窗口的设备上渲染若干帧并打印每帧的执行情况。

use anyhow::Context;

use radiant_app::app_config::AppConfig;
use radiant_app::demo_scene::DemoScene;
use radiant_app::pathtracer::Pathtracer;
use radiant_crate_tools::config::load_toml;
use radiant_crate_tools::init_log::init_log;
use radiant_crate_tools::path::RadiantPath;
use radiant_gfx::device::GraphicsApi;
use radiant_gfx::handles::GfxFramebufferHandle;
use radiant_gfx::headless::{HeadlessDevice, HeadlessShaderCompiler};
use radiant_nrc::create_nrc_integration;
use radiant_nrc::headless::HeadlessNrcSdk;
use radiant_nrc::vulkan::REQUIRED_VULKAN_EXTENSIONS;
use radiant_nrd::headless::HeadlessDenoiserEngine;

fn load_config() -> AppConfig {
    let path = RadiantPath::config_path("pathtracer.toml");
    match load_toml(&path) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("failed to load {}, using defaults: {err:#}", path.display());
            AppConfig::default()
        }
    }
}

fn run(config: AppConfig) -> anyhow::Result<()> {
    let mut device = match config.graphics_api {
        GraphicsApi::Vulkan => HeadlessDevice::new(GraphicsApi::Vulkan).with_extensions(REQUIRED_VULKAN_EXTENSIONS),
        GraphicsApi::D3d12 => HeadlessDevice::new(GraphicsApi::D3d12),
    };
    let mut compiler = HeadlessShaderCompiler::new();
    let mut scene = DemoScene::new(&mut device).context("failed to create demo scene")?;

    let mut pathtracer = Pathtracer::new(
        &mut device,
        &scene,
        create_nrc_integration(config.graphics_api, Box::new(HeadlessNrcSdk::new())),
        Box::new(HeadlessDenoiserEngine::new()),
        config.width,
        config.height,
    )?;

    let mut settings = config.pathtracer.clone();
    let framebuffer = GfxFramebufferHandle::default();
    for frame in 0..config.frames {
        if config.switch_at_frame == Some(frame) {
            if let Some(technique) = config.switch_technique {
                log::info!("switching technique to {technique:?}");
                settings.technique = technique;
            }
        }

        let report = pathtracer.render(&mut device, &mut compiler, &mut scene, &mut settings, framebuffer)?;
        let dispatches =
            report.primary_dispatches.iter().map(|(pass, w, h)| format!("{}@{w}x{h}", pass.name())).collect::<Vec<_>>();
        log::info!(
            "[F{}] {:?}: [{}] accumulated={} nrd={} loss={:?}{}",
            report.frame_index,
            report.technique,
            dispatches.join(", "),
            report.accumulated_frames,
            report.nrd_ran,
            report.nrc_training_loss,
            if report.nrc_fell_back { " (NRC fallback)" } else { "" }
        );
    }

    log::info!(
        "{} submissions, {} barriers ({} elided)",
        device.submitted().len(),
        pathtracer.tracker().total_barriers(),
        pathtracer.tracker().total_elided()
    );
    pathtracer.destroy(&mut device);
    Ok(())
}

fn main() {
    init_log();
    tracy_client::Client::start();
    tracy_client::set_thread_name!("RenderThread");

    let config = load_config();
    log::info!("running {} frames at {}x{} on {:?}", config.frames, config.width, config.height, config.graphics_api);
    if let Err(err) = run(config) {
        log::error!("headless run failed: {err:#}");
        std::process::exit(1);
    }
}
