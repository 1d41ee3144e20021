//! NRC 的上下文设置与帧设置

pub use radiant_render_interface::settings::NrcResolveMode;

/// 训练路径的目标数量
pub const TARGET_TRAINING_PATHS: u32 = 256 * 256;

/// 会触发重新配置的设置
///
/// 帧编排每帧构造一份快照，只有与上次应用的快照不同时才调用 `configure`。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextSettings {
    pub learn_irradiance: bool,
    pub include_direct_lighting: bool,
    pub frame_dimensions: [u32; 2],
    pub training_dimensions: [u32; 2],
    pub max_path_vertices: u32,
    pub samples_per_pixel: u32,
    pub scene_bounds_min: [f32; 3],
    pub scene_bounds_max: [f32; 3],
}

/// 每帧都可以变化、不需要重新配置的设置
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSettings {
    pub max_expected_average_radiance_value: f32,
    pub termination_heuristic_threshold: f32,
    pub training_termination_heuristic_threshold: f32,
    pub resolve_mode: NrcResolveMode,
}
impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            max_expected_average_radiance_value: 1.0,
            termination_heuristic_threshold: 0.01,
            training_termination_heuristic_threshold: 0.01,
            resolve_mode: NrcResolveMode::AddQueryResultToOutput,
        }
    }
}

/// 由帧尺寸计算训练分辨率
///
/// 保持宽高比，总路径数接近 [`TARGET_TRAINING_PATHS`]，且不超过帧尺寸。
pub fn compute_ideal_training_dimensions(frame_dimensions: [u32; 2]) -> [u32; 2] {
    let [width, height] = frame_dimensions;
    if width == 0 || height == 0 {
        return [0, 0];
    }

    let aspect = width as f64 / height as f64;
    let training_height = (TARGET_TRAINING_PATHS as f64 / aspect).sqrt();
    let training_width = training_height * aspect;

    [
        (training_width.round() as u32).clamp(1, width),
        (training_height.round() as u32).clamp(1, height),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_dimensions_keep_aspect() {
        let [w, h] = compute_ideal_training_dimensions([1920, 1080]);
        let paths = w * h;
        assert!(paths.abs_diff(TARGET_TRAINING_PATHS) < TARGET_TRAINING_PATHS / 50);
        assert!(((w as f32 / h as f32) - 1920.0 / 1080.0).abs() < 0.02);
    }

    #[test]
    fn test_training_dimensions_clamped_to_frame() {
        assert_eq!(compute_ideal_training_dimensions([64, 32]), [64, 32]);
        assert_eq!(compute_ideal_training_dimensions([0, 32]), [0, 0]);
    }

    #[test]
    fn test_context_settings_dirty_compare() {
        let a = ContextSettings {
            frame_dimensions: [640, 480],
            training_dimensions: compute_ideal_training_dimensions([640, 480]),
            ..Default::default()
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.scene_bounds_max = [1.0, 0.0, 0.0];
        assert_ne!(a, b);
    }
}
