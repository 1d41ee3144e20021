//! GPU 常量缓冲区的内存布局
//!
//! 字段顺序和 shader 侧保持一致，所有字段都是 4 字节对齐，不含隐式 padding。

use bytemuck::{Pod, Zeroable};

use crate::view::PlanarViewConstants;

pub const MAX_LIGHTS: usize = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct LightConstants {
    pub direction: [f32; 3],
    pub light_type: u32,
    pub color: [f32; 3],
    pub intensity: f32,
    pub position: [f32; 3],
    pub radius: f32,
    pub angular_size: f32,
    pub range: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
}

/// NRC 在每帧填写的 shader 参数
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct NrcConstants {
    pub scene_bounds_min: [f32; 3],
    pub learn_irradiance: u32,
    pub scene_bounds_max: [f32; 3],
    pub include_direct_lighting: u32,
    pub frame_dimensions: [u32; 2],
    pub training_dimensions: [u32; 2],
    pub max_path_vertices: u32,
    pub samples_per_pixel: u32,
    pub resolve_mode: u32,
    pub enable_termination_heuristic: u32,
    pub termination_heuristic_threshold: f32,
    pub training_termination_heuristic_threshold: f32,
    pub radiance_unpack_multiplier: f32,
    pub active: u32,
}

/// 光照常量，绑定在 Globals 槽的 b0
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct LightingConstants {
    pub sky_color: [f32; 4],
    pub light_count: i32,
    pub sharc_accumulation_frame_num: i32,
    pub sharc_stale_frame_num: i32,
    pub sharc_enable_antifirefly: i32,
    pub sharc_entries_num: i32,
    pub sharc_downscale_factor: i32,
    pub sharc_scene_scale: f32,
    pub sharc_roughness_threshold: f32,
    pub sharc_camera_position: [f32; 4],
    pub sharc_camera_position_prev: [f32; 4],
    pub view: PlanarViewConstants,
    pub view_prev: PlanarViewConstants,
    pub update_pass_view: PlanarViewConstants,
    pub sun_light: LightConstants,
    pub head_light: LightConstants,
    pub lights: [LightConstants; MAX_LIGHTS],
    pub nrc_constants: NrcConstants,
}

/// 全局/调试常量，绑定在 Globals 槽的 b1，tonemap pass 也会读取
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GlobalConstants {
    pub enable_jitter: i32,
    pub sharc_debug: i32,
    pub enable_back_face_cull: i32,
    pub bounces_max: i32,
    pub frame_index: i32,
    pub enable_accumulation: u32,
    pub recip_accumulated_frames: f32,
    pub accumulated_frames_max: i32,
    pub enable_emissives: i32,
    pub enable_lighting: i32,
    pub enable_transmission: i32,
    pub enable_occlusion: i32,
    pub enable_absorption: i32,
    pub enable_transparent_shadows: i32,
    pub enable_soft_shadows: i32,
    pub enable_russian_roulette: i32,
    pub samples_per_pixel: i32,
    pub target_light: i32,
    pub debug_output_mode: u32,
    pub intensity_scale: f32,
    pub throughput_threshold: f32,
    pub exposure_scale: f32,
    pub tone_mapping_operator: u32,
    pub clamp: u32,
    pub nrc_enable_termination_heuristic: u32,
    pub nrc_skip_delta_vertices: u32,
    pub _pad0: u32,
    pub nrc_termination_heuristic_threshold: f32,
    pub nrd_hit_distance_params: [f32; 4],
    pub roughness_min: f32,
    pub roughness_max: f32,
    pub metalness_min: f32,
    pub metalness_max: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_buffer_sizes() {
        // 常量缓冲区按 16 字节对齐
        assert_eq!(size_of::<GlobalConstants>() % 16, 0);
        assert_eq!(size_of::<LightConstants>(), 64);
        assert_eq!(size_of::<NrcConstants>(), 64);
        assert_eq!(size_of::<PlanarViewConstants>() % 16, 0);
        assert_eq!(size_of::<LightingConstants>() % 16, 0);
    }
}
