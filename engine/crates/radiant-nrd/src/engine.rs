//! 降噪引擎的协议
//!
//! 引擎通过 [`DenoiserEngine::describe_requirements`] 声明资源需求，
//! 通过 [`DenoiserEngine::compute_dispatches`] 给出每帧的 dispatch 计划。

use crate::error::NrdError;
use crate::format::Format;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DenoiserMethod {
    ReblurDiffuseSpecular,
    RelaxDiffuseSpecular,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerMode {
    NearestClamp,
    LinearClamp,
    NearestMirroredRepeat,
    LinearMirroredRepeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// 只读纹理（SRV）
    Texture,
    /// 可写纹理（UAV）
    StorageTexture,
}

/// 一次 dispatch 引用的资源
///
/// 池中的纹理携带池内索引，新增资源种类不会影响 dispatch 循环的结构。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    InMv,
    InNormalRoughness,
    InViewZ,
    InDiffRadianceHitDist,
    InSpecRadianceHitDist,
    InDiffConfidence,
    InSpecConfidence,
    OutDiffRadianceHitDist,
    OutSpecRadianceHitDist,
    OutValidation,
    TransientPool(u32),
    PermanentPool(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRangeDesc {
    pub descriptor_type: DescriptorType,
    pub base_register_index: u32,
    pub descriptors_num: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub shader_file_name: String,
    pub shader_entry_point: String,
    pub resource_ranges: Vec<ResourceRangeDesc>,
}
impl PipelineDesc {
    #[inline]
    pub fn resources_num(&self) -> u32 {
        self.resource_ranges.iter().map(|r| r.descriptors_num).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolTextureDesc {
    pub format: Format,
}

/// 引擎实例声明的全部资源需求
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceDesc {
    pub constant_buffer_max_data_size: u32,
    pub constant_buffer_register_index: u32,
    pub samplers_space_index: u32,
    pub samplers_base_register_index: u32,
    pub samplers: Vec<SamplerMode>,
    pub pipelines: Vec<PipelineDesc>,
    pub permanent_pool: Vec<PoolTextureDesc>,
    pub transient_pool: Vec<PoolTextureDesc>,
}

/// 引擎给出的一次 compute dispatch
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchDesc {
    pub name: Option<String>,
    pub constant_buffer_data: Vec<u8>,
    /// 按 pipeline 的 resource range 顺序展开
    pub resources: Vec<ResourceType>,
    pub pipeline_index: usize,
    pub grid_width: u32,
    pub grid_height: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccumulationMode {
    #[default]
    Continue,
    Restart,
    ClearAndRestart,
}

/// 每帧的公共设置
///
/// 矩阵以列主序存放。
#[derive(Clone, Debug, PartialEq)]
pub struct CommonSettings {
    pub world_to_view_matrix: [f32; 16],
    pub world_to_view_matrix_prev: [f32; 16],
    pub view_to_clip_matrix: [f32; 16],
    pub view_to_clip_matrix_prev: [f32; 16],

    pub motion_vector_scale: [f32; 3],
    pub camera_jitter: [f32; 2],
    pub camera_jitter_prev: [f32; 2],
    pub resource_size: [u32; 2],
    pub resource_size_prev: [u32; 2],
    pub rect_size: [u32; 2],
    pub rect_size_prev: [u32; 2],

    pub frame_index: u32,
    pub is_motion_vector_in_world_space: bool,
    pub enable_validation: bool,
    pub disocclusion_threshold: f32,
    pub disocclusion_threshold_alternate: f32,
    pub is_disocclusion_threshold_mix_available: bool,
    pub accumulation_mode: AccumulationMode,
}
impl Default for CommonSettings {
    fn default() -> Self {
        let identity = glam::Mat4::IDENTITY.to_cols_array();
        Self {
            world_to_view_matrix: identity,
            world_to_view_matrix_prev: identity,
            view_to_clip_matrix: identity,
            view_to_clip_matrix_prev: identity,
            motion_vector_scale: [1.0, 1.0, 0.0],
            camera_jitter: [0.0; 2],
            camera_jitter_prev: [0.0; 2],
            resource_size: [0; 2],
            resource_size_prev: [0; 2],
            rect_size: [0; 2],
            rect_size_prev: [0; 2],
            frame_index: 0,
            is_motion_vector_in_world_space: false,
            enable_validation: false,
            disocclusion_threshold: 0.01,
            disocclusion_threshold_alternate: 0.05,
            is_disocclusion_threshold_mix_available: false,
            accumulation_mode: AccumulationMode::Continue,
        }
    }
}

/// hit distance 归一化参数：`(a + |viewZ| * b) * lerp(1, c, exp2(d * roughness^2))`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitDistanceParameters {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}
impl Default for HitDistanceParameters {
    fn default() -> Self {
        Self {
            a: 3.0,
            b: 0.1,
            c: 20.0,
            d: -25.0,
        }
    }
}
impl HitDistanceParameters {
    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.a, self.b, self.c, self.d]
    }
}

/// REBLUR 方法设置
#[derive(Clone, Debug, PartialEq)]
pub struct ReblurSettings {
    pub hit_distance_parameters: HitDistanceParameters,
    pub max_accumulated_frame_num: u32,
    pub max_fast_accumulated_frame_num: u32,
    pub history_fix_frame_num: u32,
    pub diffuse_prepass_blur_radius: f32,
    pub specular_prepass_blur_radius: f32,
    pub min_blur_radius: f32,
    pub max_blur_radius: f32,
    pub lobe_angle_fraction: f32,
    pub roughness_fraction: f32,
    pub enable_anti_firefly: bool,
}
impl Default for ReblurSettings {
    fn default() -> Self {
        Self {
            hit_distance_parameters: HitDistanceParameters::default(),
            max_accumulated_frame_num: 30,
            max_fast_accumulated_frame_num: 6,
            history_fix_frame_num: 3,
            diffuse_prepass_blur_radius: 30.0,
            specular_prepass_blur_radius: 50.0,
            min_blur_radius: 1.0,
            max_blur_radius: 30.0,
            lobe_angle_fraction: 0.15,
            roughness_fraction: 0.15,
            enable_anti_firefly: false,
        }
    }
}

/// 不透明的降噪引擎
pub trait DenoiserEngine {
    fn create_instance(&mut self, method: DenoiserMethod) -> Result<(), NrdError>;
    fn destroy_instance(&mut self);

    /// 只在 `create_instance` 成功后有效
    fn describe_requirements(&self) -> &InstanceDesc;

    fn set_method_settings(&mut self, settings: &ReblurSettings);
    fn set_common_settings(&mut self, settings: &CommonSettings);

    /// 本帧的 dispatch 计划，数量和顺序由引擎决定
    fn compute_dispatches(&mut self) -> Vec<DispatchDesc>;
}
