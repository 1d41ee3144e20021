//! 每帧上传的两个常量缓冲区

use glam::Vec3;

use radiant_nrd::engine::HitDistanceParameters;
use radiant_render_interface::constants::{GlobalConstants, LightingConstants, MAX_LIGHTS};
use radiant_render_interface::scene::{LightKind, SceneGraph, SceneLight};
use radiant_render_interface::settings::{PathtracerSettings, ToneMappingOperator};
use radiant_render_interface::view::PlanarView;

/// 场景里没有方向光时使用的太阳
pub fn default_sun() -> SceneLight {
    SceneLight::directional("Sun", Vec3::new(-0.049, -0.87, 0.48), 20.0, 0.8)
}

/// 天空、视图、太阳与场景光源
pub fn lighting_constants(
    settings: &PathtracerSettings,
    scene: &dyn SceneGraph,
    view: &PlanarView,
    view_prev: &PlanarView,
) -> LightingConstants {
    let mut constants = LightingConstants {
        sky_color: settings.sky_radiance(),
        view: view.fill_constants(),
        view_prev: view_prev.fill_constants(),
        update_pass_view: view.fill_constants(),
        ..Default::default()
    };

    let scene_sun = scene.lights().iter().find(|light| light.kind == LightKind::Directional);
    let fallback_sun = scene_sun.is_none().then(default_sun);
    constants.sun_light = scene_sun.or(fallback_sun.as_ref()).map(SceneLight::fill_constants).unwrap_or_default();

    let lights = fallback_sun.iter().chain(scene.lights()).take(MAX_LIGHTS).map(SceneLight::fill_constants);
    for (slot, light) in constants.lights.iter_mut().zip(lights) {
        *slot = light;
        constants.light_count += 1;
    }
    if scene.lights().len() + fallback_sun.iter().len() > MAX_LIGHTS {
        log::warn!("scene has more than {MAX_LIGHTS} lights, the rest are ignored");
    }

    constants
}

/// 全局常量需要的帧状态
#[derive(Clone, Copy, Debug)]
pub struct FrameState {
    pub frame_index: u32,
    pub accumulated_frames: u32,
    /// 本帧重置了累积
    pub reset_accumulation: bool,
    pub denoiser_active: bool,
}

/// 降噪时抖动会破坏时域重投影，只在同时开启累积时保留
#[inline]
pub fn jitter_enabled(settings: &PathtracerSettings, denoiser_active: bool) -> bool {
    settings.enable_jitter && (!denoiser_active || settings.enable_accumulation)
}

pub fn global_constants(settings: &PathtracerSettings, frame: FrameState) -> GlobalConstants {
    let accumulation = settings.accumulation_enabled();
    let tone_mapping_operator = if settings.enable_tonemapping {
        settings.tone_mapping_operator
    } else {
        ToneMappingOperator::Linear
    };

    let mut constants = GlobalConstants {
        enable_jitter: jitter_enabled(settings, frame.denoiser_active) as i32,
        sharc_debug: settings.sharc.enable_debug as i32,
        enable_back_face_cull: settings.enable_back_face_cull as i32,
        bounces_max: settings.bounces_max as i32,
        frame_index: frame.frame_index as i32,
        enable_accumulation: accumulation as u32,
        recip_accumulated_frames: if accumulation { 1.0 / frame.accumulated_frames.max(1) as f32 } else { 1.0 },
        accumulated_frames_max: if frame.reset_accumulation { 1 } else { settings.accumulated_frames_max as i32 },
        enable_emissives: settings.enable_emissives as i32,
        enable_lighting: settings.enable_lighting as i32,
        enable_transmission: settings.enable_transmission as i32,
        enable_absorption: settings.enable_absorption as i32,
        enable_transparent_shadows: settings.enable_transparent_shadows as i32,
        enable_soft_shadows: settings.enable_soft_shadows as i32,
        enable_russian_roulette: settings.enable_russian_roulette as i32,
        samples_per_pixel: settings.samples_per_pixel as i32,
        target_light: settings.target_light,
        debug_output_mode: settings.debug_output as u32,
        intensity_scale: 1.0,
        throughput_threshold: settings.throughput_threshold,
        exposure_scale: settings.exposure_adjustment.exp2(),
        tone_mapping_operator: tone_mapping_operator as u32,
        clamp: settings.tone_mapping_clamp as u32,
        nrc_enable_termination_heuristic: (settings.nrc.termination_heuristic_threshold > 0.0) as u32,
        nrc_skip_delta_vertices: settings.nrc.skip_delta_vertices as u32,
        nrc_termination_heuristic_threshold: settings.nrc.termination_heuristic_threshold,
        roughness_min: settings.roughness_min,
        roughness_max: settings.roughness_min.max(settings.roughness_max),
        metalness_min: settings.metalness_min,
        metalness_max: settings.metalness_min.max(settings.metalness_max),
        ..Default::default()
    };

    if frame.denoiser_active {
        constants.nrd_hit_distance_params = HitDistanceParameters::default().to_array();
    }
    constants
}

#[cfg(test)]
mod tests {
    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::HeadlessDevice;
    use radiant_render_interface::settings::DenoiserSelection;

    use super::*;
    use crate::demo_scene::DemoScene;

    fn frame(reset: bool, denoiser_active: bool) -> FrameState {
        FrameState {
            frame_index: 7,
            accumulated_frames: 4,
            reset_accumulation: reset,
            denoiser_active,
        }
    }

    #[test]
    fn test_jitter_kept_only_with_accumulation_when_denoising() {
        let mut settings = PathtracerSettings::default();
        assert!(jitter_enabled(&settings, false));
        assert!(!jitter_enabled(&settings, true));
        settings.enable_accumulation = true;
        assert!(jitter_enabled(&settings, true));
        settings.enable_jitter = false;
        assert!(!jitter_enabled(&settings, false));
    }

    #[test]
    fn test_global_constants() {
        let settings = PathtracerSettings {
            denoiser: DenoiserSelection::Accumulation,
            exposure_adjustment: 1.0,
            roughness_min: 0.5,
            roughness_max: 0.2,
            ..Default::default()
        };

        let constants = global_constants(&settings, frame(false, false));
        assert_eq!(constants.enable_accumulation, 1);
        assert_eq!(constants.recip_accumulated_frames, 0.25);
        assert_eq!(constants.accumulated_frames_max, 128);
        assert_eq!(constants.exposure_scale, 2.0);
        assert_eq!(constants.roughness_max, 0.5);
        assert_eq!(constants.nrd_hit_distance_params, [0.0; 4]);

        let constants = global_constants(&settings, frame(true, true));
        assert_eq!(constants.accumulated_frames_max, 1);
        assert_eq!(constants.nrd_hit_distance_params, [3.0, 0.1, 20.0, -25.0]);
    }

    #[test]
    fn test_default_sun_when_scene_has_none() {
        let mut device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let mut scene = DemoScene::new(&mut device).unwrap();
        let settings = PathtracerSettings::default();
        let view = PlanarView::default();

        let constants = lighting_constants(&settings, &scene, &view, &view);
        assert_eq!(constants.light_count, 2);
        assert_eq!(constants.sun_light.intensity, 20.0);

        scene.remove_directional_lights();
        let constants = lighting_constants(&settings, &scene, &view, &view);
        assert_eq!(constants.light_count, 2);
        assert_eq!(constants.sun_light.direction, default_sun().direction.to_array());
        assert_eq!(constants.sun_light.light_type, LightKind::Directional as u32);
    }
}
