//! 降噪阶段：打包 -> NRD -> 解析
//!
//! 渲染目标与 NRD 实例在第一次启用降噪时创建；初始化失败后本次会话不再尝试。

use radiant_gfx::commands::{GfxCommandList, GfxComputeState};
use radiant_gfx::device::{GfxDevice, GfxShaderCompiler};
use radiant_gfx::handles::{GfxBindingSetHandle, GfxTextureHandle};
use radiant_nrd::engine::{DenoiserEngine, DenoiserMethod, ReblurSettings};
use radiant_nrd::integration::{DisocclusionThresholds, NrdFrameInputs, NrdIntegration};
use radiant_nrd::render_targets::RenderTargets;
use radiant_render_graph::{RgDispatchAccess, RgHazardTracker, RgStage};
use radiant_render_interface::binding_slots::{BindingSlot, BindingSlots};
use radiant_render_interface::view::PlanarView;

use crate::pathtracer::pipelines::{ComputeKind, PathtracerPipelines};

pub const DENOISER_GROUP_SIZE: u32 = 16;

/// 降噪器每帧需要的视图与帧信息
pub struct DenoiserFrame<'a> {
    pub globals: GfxBindingSetHandle,
    pub output: GfxTextureHandle,
    pub view: &'a PlanarView,
    pub view_prev: &'a PlanarView,
    pub frame_index: u32,
    pub reset: bool,
    /// 主路径追踪使用了 NRC，打包时需要对应的 shader 变体
    pub nrc: bool,
}

struct DenoiserResources {
    targets: RenderTargets,
    in_set: GfxBindingSetHandle,
    out_set: GfxBindingSetHandle,
}

pub struct DenoiserStage {
    nrd: NrdIntegration,
    resources: Option<DenoiserResources>,
    unavailable: bool,
    /// 上一帧降噪是否生效，用于判断是否需要丢弃降噪历史
    was_active: bool,
}
// new & init
impl DenoiserStage {
    pub fn new(engine: Box<dyn DenoiserEngine>) -> Self {
        Self {
            nrd: NrdIntegration::new(engine, DenoiserMethod::ReblurDiffuseSpecular),
            resources: None,
            unavailable: false,
            was_active: false,
        }
    }

    /// 按需创建渲染目标并初始化 NRD，返回降噪器是否可用
    pub fn ensure_ready(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        pipelines: &PathtracerPipelines,
        width: u32,
        height: u32,
    ) -> bool {
        if self.unavailable {
            return false;
        }
        if self.resources.is_some() && self.nrd.is_available() {
            return true;
        }

        let _span = tracy_client::span!("init_denoiser");
        let resources = match Self::create_resources(device, pipelines, width, height) {
            Ok(resources) => resources,
            Err(err) => {
                log::error!("failed to create denoiser render targets, denoising disabled: {err:#}");
                self.unavailable = true;
                return false;
            }
        };

        if !self.nrd.initialize(device, compiler, width, height) {
            log::error!("denoiser unavailable for this session");
            Self::destroy_resources(resources, device);
            self.unavailable = true;
            return false;
        }

        self.resources = Some(resources);
        true
    }

    fn create_resources(
        device: &mut dyn GfxDevice,
        pipelines: &PathtracerPipelines,
        width: u32,
        height: u32,
    ) -> anyhow::Result<DenoiserResources> {
        let targets = RenderTargets::new(device, width, height)?;
        let layout = pipelines.layout(BindingSlot::Denoiser);
        let in_set = match device.create_binding_set(&targets.binding_set_desc(false), layout) {
            Ok(set) => set,
            Err(err) => {
                targets.destroy(device);
                return Err(err);
            }
        };
        let out_set = match device.create_binding_set(&targets.binding_set_desc(true), layout) {
            Ok(set) => set,
            Err(err) => {
                device.destroy_binding_set(in_set);
                targets.destroy(device);
                return Err(err);
            }
        };
        Ok(DenoiserResources {
            targets,
            in_set,
            out_set,
        })
    }
}
// getters
impl DenoiserStage {
    #[inline]
    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    /// 主路径追踪写入的降噪输入
    #[inline]
    pub fn in_set(&self) -> Option<GfxBindingSetHandle> {
        self.resources.as_ref().map(|r| r.in_set)
    }

    pub fn targets(&self) -> Option<&RenderTargets> {
        self.resources.as_ref().map(|r| &r.targets)
    }

    /// 主路径追踪写入的纹理
    pub fn input_textures(&self) -> Vec<GfxTextureHandle> {
        self.targets()
            .map(|t| {
                vec![
                    t.in_diff_radiance_hit_dist,
                    t.in_spec_radiance_hit_dist,
                    t.view_space_z,
                    t.normal_roughness,
                    t.motion_vectors,
                    t.emissive,
                    t.diffuse_albedo,
                    t.specular_albedo,
                ]
            })
            .unwrap_or_default()
    }
}
// update
impl DenoiserStage {
    /// 记录本帧降噪是否生效；与上一帧不同时返回 true，表示需要重置降噪历史
    pub fn track_activation(&mut self, active: bool) -> bool {
        std::mem::replace(&mut self.was_active, active) != active
    }

    /// 主 dispatch 之前清空 view-space Z
    pub fn clear_view_z(&self, cmd: &mut GfxCommandList, tracker: &mut RgHazardTracker) {
        let Some(targets) = self.targets() else {
            return;
        };
        tracker.prepare_dispatch(
            cmd,
            &RgDispatchAccess::new("nrd-clear-viewz").write_image(targets.view_space_z, RgStage::Transfer),
        );
        cmd.clear_texture_float(targets.view_space_z, [0.0; 4]);
    }

    /// 打包、NRD、解析，结果写回路径追踪输出
    pub fn denoise(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        pipelines: &mut PathtracerPipelines,
        cmd: &mut GfxCommandList,
        tracker: &mut RgHazardTracker,
        frame: &DenoiserFrame,
    ) -> anyhow::Result<()> {
        let _span = tracy_client::span!("denoise");
        let Some(resources) = &self.resources else {
            anyhow::bail!("denoise called before the denoiser was initialized");
        };
        let extent = resources.targets.extent();
        let groups_x = extent.width.div_ceil(DENOISER_GROUP_SIZE);
        let groups_y = extent.height.div_ceil(DENOISER_GROUP_SIZE);
        let inputs = self.input_textures();

        cmd.begin_marker("Denoiser");

        // pack
        {
            let kind = ComputeKind::DenoiserPack { nrc: frame.nrc };
            let pipeline = pipelines.compute_pipeline(device, compiler, kind)?;
            let sets = BindingSlots::new()
                .with(BindingSlot::Globals, frame.globals)
                .with(BindingSlot::Denoiser, resources.in_set);
            tracker.prepare_dispatch(
                cmd,
                &RgDispatchAccess::new("nrd-pack")
                    .read_write_images(inputs.iter().copied(), RgStage::Compute),
            );
            cmd.dispatch(
                &GfxComputeState {
                    pipeline,
                    bindings: pipelines.compute_sets(kind, &sets),
                },
                groups_x,
                groups_y,
            );
        }

        let reblur_settings = ReblurSettings::default();
        self.nrd.run_denoiser_passes(
            device,
            cmd,
            tracker,
            &resources.targets,
            &NrdFrameInputs {
                view: frame.view,
                view_prev: frame.view_prev,
                frame_index: frame.frame_index,
                disocclusion: DisocclusionThresholds::default(),
                enable_validation: false,
                method_settings: Some(&reblur_settings),
                reset: frame.reset,
            },
        )?;

        // resolve
        {
            let kind = ComputeKind::DenoiserResolve;
            let pipeline = pipelines.compute_pipeline(device, compiler, kind)?;
            let sets = BindingSlots::new()
                .with(BindingSlot::Globals, frame.globals)
                .with(BindingSlot::Denoiser, resources.out_set);
            let targets = &resources.targets;
            tracker.prepare_dispatch(
                cmd,
                &RgDispatchAccess::new("nrd-resolve")
                    .read_image(targets.out_diff_radiance_hit_dist, RgStage::Compute)
                    .read_image(targets.out_spec_radiance_hit_dist, RgStage::Compute)
                    .read_write_image(frame.output, RgStage::Compute),
            );
            cmd.dispatch(
                &GfxComputeState {
                    pipeline,
                    bindings: pipelines.compute_sets(kind, &sets),
                },
                groups_x,
                groups_y,
            );
        }

        cmd.end_marker();
        Ok(())
    }
}
// destroy
impl DenoiserStage {
    /// 提交之后释放 binding 缓存淘汰的 set
    pub fn release_retired(&mut self, device: &mut dyn GfxDevice) {
        self.nrd.release_retired(device);
    }

    fn destroy_resources(resources: DenoiserResources, device: &mut dyn GfxDevice) {
        device.destroy_binding_set(resources.in_set);
        device.destroy_binding_set(resources.out_set);
        resources.targets.destroy(device);
    }

    /// 释放渲染目标与 NRD 实例；之后可以按新的尺寸重新初始化
    pub fn destroy(&mut self, device: &mut dyn GfxDevice, tracker: &mut RgHazardTracker) {
        if let Some(resources) = self.resources.take() {
            for texture in resources.targets.all() {
                tracker.forget_image(texture);
            }
            Self::destroy_resources(resources, device);
        }
        self.nrd.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use radiant_gfx::binding::{GfxBindingLayoutDesc, GfxShaderStages};
    use radiant_gfx::commands::GfxCommand;
    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::{HeadlessDevice, HeadlessShaderCompiler};
    use radiant_nrd::headless::HeadlessDenoiserEngine;

    use super::*;

    fn pipelines(device: &mut HeadlessDevice) -> PathtracerPipelines {
        let bindless = device
            .create_binding_layout(&GfxBindingLayoutDesc::new(GfxShaderStages::ALL, 4, "Bindless"))
            .unwrap();
        PathtracerPipelines::new(device, bindless).unwrap()
    }

    #[test]
    fn test_track_activation_resets_on_change() {
        let mut stage = DenoiserStage::new(Box::new(HeadlessDenoiserEngine::new()));
        assert!(stage.track_activation(true));
        assert!(!stage.track_activation(true));
        assert!(stage.track_activation(false));
        assert!(!stage.track_activation(false));
    }

    #[test]
    fn test_failed_init_disables_for_session() {
        tracy_client::Client::start();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut compiler = HeadlessShaderCompiler::new();
        let pipelines = pipelines(&mut device);
        let textures_before = device.live_textures();

        let mut stage = DenoiserStage::new(Box::new(HeadlessDenoiserEngine::new().failing_creation()));
        assert!(!stage.ensure_ready(&mut device, &mut compiler, &pipelines, 64, 64));
        assert!(stage.is_unavailable());
        assert_eq!(device.live_textures(), textures_before);
        assert!(!stage.ensure_ready(&mut device, &mut compiler, &pipelines, 64, 64));
    }

    #[test]
    fn test_pack_then_resolve_around_nrd() {
        tracy_client::Client::start();
        let mut device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let mut compiler = HeadlessShaderCompiler::new();
        let mut pipelines = pipelines(&mut device);
        let output = device
            .create_texture(&radiant_gfx::resources::GfxTextureDesc::new_2d_uav(
                40,
                24,
                ash::vk::Format::R32G32B32A32_SFLOAT,
                "PathTracerOutput",
            ))
            .unwrap();
        let globals = pipelines.resolve_sets(&BindingSlots::new())[BindingSlot::Globals.index()];

        let mut stage = DenoiserStage::new(Box::new(HeadlessDenoiserEngine::new()));
        assert!(stage.ensure_ready(&mut device, &mut compiler, &pipelines, 40, 24));

        let view = PlanarView::new(40, 24, glam::Mat4::IDENTITY);
        let mut tracker = RgHazardTracker::new();
        let mut cmd = device.create_command_list("denoise");
        cmd.open();
        stage.clear_view_z(&mut cmd, &mut tracker);
        stage
            .denoise(
                &mut device,
                &mut compiler,
                &mut pipelines,
                &mut cmd,
                &mut tracker,
                &DenoiserFrame {
                    globals,
                    output,
                    view: &view,
                    view_prev: &view,
                    frame_index: 0,
                    reset: true,
                    nrc: false,
                },
            )
            .unwrap();
        cmd.close();

        let dispatch_groups = cmd
            .commands()
            .iter()
            .filter_map(|c| match c {
                GfxCommand::Dispatch {
                    groups_x, groups_y, ..
                } => Some((*groups_x, *groups_y)),
                _ => None,
            })
            .collect::<Vec<_>>();
        // 打包与解析各一次，中间至少有一个 NRD dispatch
        assert!(dispatch_groups.len() >= 3);
        assert_eq!(dispatch_groups.first(), Some(&(3, 2)));
        assert_eq!(dispatch_groups.last(), Some(&(3, 2)));
        assert!(cmd.commands().iter().any(|c| matches!(c, GfxCommand::ClearTextureFloat { .. })));
        device.execute_command_list(&cmd).unwrap();

        stage.destroy(&mut device, &mut tracker);
        assert!(stage.targets().is_none());
    }
}
