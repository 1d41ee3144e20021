use radiant_gfx::device::GraphicsApi;
use radiant_render_interface::settings::PathtracerSettings;
use serde::{Deserialize, Serialize};

/// 离屏程序的启动配置，对应 `config/pathtracer.toml`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub graphics_api: GraphicsApi,
    pub width: u32,
    pub height: u32,
    /// 运行的帧数
    pub frames: u32,
    /// 运行到这一帧时切换到 `switch_technique`，用于观察切换行为
    pub switch_at_frame: Option<u32>,
    pub switch_technique: Option<radiant_render_interface::settings::TechSelection>,
    pub pathtracer: PathtracerSettings,
}
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            graphics_api: GraphicsApi::Vulkan,
            width: 1280,
            height: 720,
            frames: 16,
            switch_at_frame: None,
            switch_technique: None,
            pathtracer: PathtracerSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiant_crate_tools::config::parse_toml;
    use radiant_render_interface::settings::{DenoiserSelection, TechSelection};

    #[test]
    fn test_parse_partial_config() {
        let config: AppConfig = parse_toml(
            r#"
            graphics_api = "d3d12"
            width = 640
            height = 360

            [pathtracer]
            technique = "spatial_hash_cache"
            denoiser = "nrd"

            [pathtracer.sharc]
            downscale_factor = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics_api, GraphicsApi::D3d12);
        assert_eq!(config.frames, 16);
        assert_eq!(config.pathtracer.technique, TechSelection::SpatialHashCache);
        assert_eq!(config.pathtracer.denoiser, DenoiserSelection::Nrd);
        assert_eq!(config.pathtracer.sharc.downscale_factor, 4);
        assert_eq!(config.pathtracer.sharc.stale_frame_num, 64);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config: AppConfig =
            parse_toml(include_str!("../../../../config/pathtracer.toml")).unwrap();
        assert!(config.width > 0 && config.height > 0);
    }
}
