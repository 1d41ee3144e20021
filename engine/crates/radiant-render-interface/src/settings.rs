//! 用户可调的渲染参数
//!
//! 一份纯数据记录：帧编排每帧读取，只回写两个派生信号
//! （`reset_accumulation` 与 `rebuild_acceleration_structure`）。
//! 所有字段都可以从 TOML 加载，缺省字段取默认值。

use serde::{Deserialize, Serialize};

/// 主渲染技术，同一帧只会执行其中之一
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechSelection {
    /// 参考路径追踪
    #[default]
    #[serde(alias = "none")]
    Reference,
    NeuralCache,
    SpatialHashCache,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoiserSelection {
    #[default]
    None,
    /// 只做逐帧累积
    Accumulation,
    Nrd,
}

/// 调试输出，非 `None` 时会关闭降噪和 cache resolve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum DebugOutput {
    #[default]
    None = 0,
    DiffuseReflectance = 1,
    WorldSpaceNormals = 2,
    WorldSpacePosition = 3,
    Barycentrics = 4,
    HitT = 5,
    InstanceId = 6,
    Emissives = 7,
    BounceHeatmap = 8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ToneMappingOperator {
    Linear = 0,
    #[default]
    Reinhard = 1,
}

/// NRC 把查询结果写入输出图像的方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum NrcResolveMode {
    #[default]
    AddQueryResultToOutput = 0,
    ReplaceOutputWithQueryResult = 1,
    TrainingBounceHeatMap = 2,
    TrainingBounceHeatMapSmoothed = 3,
    PrimaryVertexTrainingRadiance = 4,
    PrimaryVertexTrainingRadianceSmoothed = 5,
    SecondaryVertexTrainingRadiance = 6,
    SecondaryVertexTrainingRadianceSmoothed = 7,
    QueryIndex = 8,
    TrainingQueryIndex = 9,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NrcSettings {
    pub learn_irradiance: bool,
    pub include_direct_illumination: bool,
    pub train_cache: bool,
    pub calculate_training_loss: bool,
    pub max_average_radiance: f32,
    pub resolve_mode: NrcResolveMode,
    pub skip_delta_vertices: bool,
    pub termination_heuristic_threshold: f32,
}
impl Default for NrcSettings {
    fn default() -> Self {
        Self {
            learn_irradiance: true,
            include_direct_illumination: true,
            train_cache: true,
            calculate_training_loss: false,
            max_average_radiance: 1.0,
            resolve_mode: NrcResolveMode::AddQueryResultToOutput,
            skip_delta_vertices: false,
            termination_heuristic_threshold: 0.01,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharcSettings {
    pub enable_clear: bool,
    pub enable_update: bool,
    pub enable_resolve: bool,
    pub enable_debug: bool,
    pub enable_antifirefly: bool,
    pub downscale_factor: u32,
    pub scene_scale: f32,
    pub accumulation_frame_num: u32,
    pub stale_frame_num: u32,
    pub roughness_threshold: f32,
}
impl Default for SharcSettings {
    fn default() -> Self {
        Self {
            enable_clear: false,
            enable_update: true,
            enable_resolve: true,
            enable_debug: false,
            enable_antifirefly: false,
            downscale_factor: 5,
            scene_scale: 50.0,
            accumulation_frame_num: 10,
            stale_frame_num: 64,
            roughness_threshold: 0.4,
        }
    }
}

/// 路径追踪的全部可调参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathtracerSettings {
    pub technique: TechSelection,
    pub denoiser: DenoiserSelection,
    pub debug_output: DebugOutput,

    pub enable_animations: bool,
    pub enable_jitter: bool,
    pub enable_transmission: bool,
    pub enable_back_face_cull: bool,
    pub bounces_max: u32,
    pub enable_accumulation: bool,
    pub accumulated_frames_max: u32,
    pub samples_per_pixel: u32,
    /// 负数表示不指定
    pub target_light: i32,

    pub exposure_adjustment: f32,
    pub roughness_min: f32,
    pub roughness_max: f32,
    pub metalness_min: f32,
    pub metalness_max: f32,

    pub enable_sky: bool,
    pub sky_color: [f32; 3],
    pub sky_intensity: f32,
    pub enable_emissives: bool,
    pub enable_lighting: bool,
    pub enable_absorption: bool,
    pub enable_transparent_shadows: bool,
    pub enable_soft_shadows: bool,
    pub enable_russian_roulette: bool,
    pub throughput_threshold: f32,

    pub enable_tonemapping: bool,
    pub tone_mapping_operator: ToneMappingOperator,
    pub tone_mapping_clamp: bool,

    pub nrc: NrcSettings,
    pub sharc: SharcSettings,

    /// 回写信号：下一帧重置累积
    #[serde(skip)]
    pub reset_accumulation: bool,
    /// 回写信号：下一帧重建加速结构
    #[serde(skip)]
    pub rebuild_acceleration_structure: bool,
}
impl Default for PathtracerSettings {
    fn default() -> Self {
        Self {
            technique: TechSelection::Reference,
            denoiser: DenoiserSelection::None,
            debug_output: DebugOutput::None,

            enable_animations: false,
            enable_jitter: true,
            enable_transmission: false,
            enable_back_face_cull: true,
            bounces_max: 8,
            enable_accumulation: false,
            accumulated_frames_max: 128,
            samples_per_pixel: 1,
            target_light: 0,

            exposure_adjustment: 0.0,
            roughness_min: 0.0,
            roughness_max: 1.0,
            metalness_min: 0.0,
            metalness_max: 1.0,

            enable_sky: true,
            sky_color: [0.5, 0.75, 1.0],
            sky_intensity: 2.0,
            enable_emissives: true,
            enable_lighting: true,
            enable_absorption: true,
            enable_transparent_shadows: true,
            enable_soft_shadows: true,
            enable_russian_roulette: true,
            throughput_threshold: 0.01,

            enable_tonemapping: true,
            tone_mapping_operator: ToneMappingOperator::Reinhard,
            tone_mapping_clamp: true,

            nrc: NrcSettings::default(),
            sharc: SharcSettings::default(),

            reset_accumulation: false,
            rebuild_acceleration_structure: false,
        }
    }
}
// tools
impl PathtracerSettings {
    #[inline]
    pub fn debug_view_active(&self) -> bool {
        self.debug_output != DebugOutput::None
    }

    /// 本帧是否累积：显式开启，或者选择了纯累积的降噪方式
    #[inline]
    pub fn accumulation_enabled(&self) -> bool {
        self.enable_accumulation || self.denoiser == DenoiserSelection::Accumulation
    }

    /// NRD 是否在本帧执行
    #[inline]
    pub fn nrd_requested(&self) -> bool {
        self.denoiser == DenoiserSelection::Nrd && !self.debug_view_active()
    }

    #[inline]
    pub fn sky_radiance(&self) -> [f32; 4] {
        if self.enable_sky {
            let [r, g, b] = self.sky_color;
            [r * self.sky_intensity, g * self.sky_intensity, b * self.sky_intensity, 1.0]
        } else {
            [0.0, 0.0, 0.0, 1.0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            technique = "neural_cache"
            denoiser = "nrd"

            [sharc]
            downscale_factor = 4
        "#;
        let settings: PathtracerSettings = toml::from_str(text).unwrap();
        assert_eq!(settings.technique, TechSelection::NeuralCache);
        assert_eq!(settings.denoiser, DenoiserSelection::Nrd);
        assert_eq!(settings.sharc.downscale_factor, 4);
        assert_eq!(settings.sharc.stale_frame_num, 64);
        assert_eq!(settings.bounces_max, 8);
        assert!(settings.nrc.train_cache);
    }

    #[test]
    fn test_none_alias_maps_to_reference() {
        let settings: PathtracerSettings = toml::from_str(r#"technique = "none""#).unwrap();
        assert_eq!(settings.technique, TechSelection::Reference);
    }

    #[test]
    fn test_debug_view_suppresses_denoiser() {
        let mut settings = PathtracerSettings {
            denoiser: DenoiserSelection::Nrd,
            ..Default::default()
        };
        assert!(settings.nrd_requested());

        settings.debug_output = DebugOutput::HitT;
        assert!(!settings.nrd_requested());
    }
}
