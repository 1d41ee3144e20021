//! 路径追踪的帧编排
//!
//! 每帧只执行一种主技术（参考路径追踪 / NRC / SHARC），降噪与 tonemap 串在其后。
//! 所有光追 pipeline 共享同一组 binding 槽位，未启用的子系统绑定空 set。
//!
//! 一帧的流程：
//!
//! ```text
//! refresh scene -> (idle + rebuild AS / output) -> view & accumulation -> constants
//!   -> NRC begin / SHARC clear & swap -> upload -> primary dispatch
//!   -> denoiser -> tonemap -> submit -> NRC end frame
//! ```

pub mod accel;
pub mod constants;
pub mod denoiser;
pub mod nrc;
pub mod pipelines;
pub mod sharc;
pub mod tonemap;

use anyhow::Context;
use ash::vk;
use glam::Vec2;

use radiant_gfx::binding::{GfxBindingSetDesc, GfxBindingSetItem};
use radiant_gfx::commands::{GfxCommandList, GfxComputeState, GfxRayTracingState};
use radiant_gfx::device::{GfxDevice, GfxQueue, GfxShaderCompiler};
use radiant_gfx::handles::{
    GfxBindingSetHandle, GfxBufferHandle, GfxFramebufferHandle, GfxSamplerHandle, GfxTextureHandle,
};
use radiant_gfx::resources::{GfxBufferDesc, GfxTextureDesc};
use radiant_gfx::sampler::GfxSamplerDesc;
use radiant_nrc::NrcIntegration;
use radiant_nrd::engine::DenoiserEngine;
use radiant_render_graph::{RgDispatchAccess, RgHazardTracker, RgStage};
use radiant_render_interface::accumulation::AccumulationState;
use radiant_render_interface::binding_slots::{BindingSlot, BindingSlots};
use radiant_render_interface::constants::{GlobalConstants, LightingConstants};
use radiant_render_interface::frame_counter::FrameCounter;
use radiant_render_interface::scene::SceneGraph;
use radiant_render_interface::settings::{DenoiserSelection, PathtracerSettings, TechSelection};
use radiant_render_interface::view::{PlanarView, halton_jitter};

use crate::pathtracer::accel::SceneAccelStructures;
use crate::pathtracer::constants::{FrameState, global_constants, jitter_enabled, lighting_constants};
use crate::pathtracer::denoiser::{DenoiserFrame, DenoiserStage};
use crate::pathtracer::nrc::NrcStage;
use crate::pathtracer::pipelines::{ComputeKind, PathtracerPipelines, RtPass, RtPipelineKey};
use crate::pathtracer::sharc::{SHARC_ENTRIES_NUM, SharcCache};
use crate::pathtracer::tonemap::TonemapPass;

const OUTPUT_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

/// 一帧实际执行了什么
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// 本帧实际执行的主技术，NRC 不可用时为 [`TechSelection::Reference`]
    pub technique: TechSelection,
    /// 主技术的光追 dispatch，按录制顺序
    pub primary_dispatches: Vec<(RtPass, u32, u32)>,
    pub accumulated_frames: u32,
    pub accumulation_reset: bool,
    pub acceleration_rebuilt: bool,
    pub nrd_ran: bool,
    pub nrc_training_loss: Option<f32>,
    /// 请求了 NRC，但 NRC 已停用
    pub nrc_fell_back: bool,
    pub sharc_swapped: bool,
}

/// 一次光追 dispatch
struct RayDispatch {
    key: RtPipelineKey,
    width: u32,
    height: u32,
    access: RgDispatchAccess,
}

pub struct Pathtracer {
    width: u32,
    height: u32,

    frame_counter: FrameCounter,
    accumulation: AccumulationState,
    view: PlanarView,
    view_prev: PlanarView,
    /// 上一帧实际使用的 (技术, 降噪方式)，变化时重置累积
    prev_selection: Option<(TechSelection, DenoiserSelection)>,
    scene_reloaded: bool,

    tracker: RgHazardTracker,
    pipelines: PathtracerPipelines,
    accel: SceneAccelStructures,

    lighting_cb: GfxBufferHandle,
    global_cb: GfxBufferHandle,
    sampler: GfxSamplerHandle,
    output: Option<GfxTextureHandle>,
    globals_set: Option<GfxBindingSetHandle>,

    sharc: Option<SharcCache>,
    nrc: NrcStage,
    denoiser: DenoiserStage,
    tonemap: TonemapPass,
}
// new & init
impl Pathtracer {
    pub fn new(
        device: &mut dyn GfxDevice,
        scene: &dyn SceneGraph,
        nrc: Box<dyn NrcIntegration>,
        denoiser_engine: Box<dyn DenoiserEngine>,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Pathtracer::new");
        let pipelines = PathtracerPipelines::new(device, scene.gpu_buffers().bindless_layout)?;
        let lighting_cb = device.create_buffer(&GfxBufferDesc::volatile_constant(
            size_of::<LightingConstants>() as u64,
            "LightingConstants",
        ))?;
        let global_cb = device.create_buffer(&GfxBufferDesc::volatile_constant(
            size_of::<GlobalConstants>() as u64,
            "GlobalConstants",
        ))?;
        let sampler = device.create_sampler(&GfxSamplerDesc::anisotropic_wrap())?;
        let tonemap = TonemapPass::new(device)?;

        log::info!("path tracer created at {width}x{height} ({:?})", device.graphics_api());
        Ok(Self {
            width,
            height,
            frame_counter: FrameCounter::new(0),
            accumulation: AccumulationState::default(),
            view: PlanarView::new(width, height, scene.camera_view()),
            view_prev: PlanarView::new(width, height, scene.camera_view()),
            prev_selection: None,
            scene_reloaded: true,
            tracker: RgHazardTracker::new(),
            pipelines,
            accel: SceneAccelStructures::default(),
            lighting_cb,
            global_cb,
            sampler,
            output: None,
            globals_set: None,
            sharc: None,
            nrc: NrcStage::new(nrc),
            denoiser: DenoiserStage::new(denoiser_engine),
            tonemap,
        })
    }

    /// 输出纹理与 Globals 槽的 binding set；TLAS 重建后 set 也要重建
    fn recreate_globals(&mut self, device: &mut dyn GfxDevice, scene: &dyn SceneGraph) -> anyhow::Result<()> {
        let output = match self.output {
            Some(output) => output,
            None => {
                let output = device.create_texture(&GfxTextureDesc::new_2d_uav(
                    self.width,
                    self.height,
                    OUTPUT_FORMAT,
                    "PathTracerOutput",
                ))?;
                self.output = Some(output);
                output
            }
        };
        if let Some(set) = self.globals_set.take() {
            device.destroy_binding_set(set);
        }

        let tlas = self.accel.tlas().context("top-level acceleration structure missing")?;
        let buffers = scene.gpu_buffers();
        let desc = GfxBindingSetDesc::new(vec![
            GfxBindingSetItem::volatile_constant_buffer(0, self.lighting_cb),
            GfxBindingSetItem::volatile_constant_buffer(1, self.global_cb),
            GfxBindingSetItem::accel_struct(0, tlas),
            GfxBindingSetItem::structured_buffer_srv(1, buffers.instances),
            GfxBindingSetItem::structured_buffer_srv(2, buffers.geometries),
            GfxBindingSetItem::structured_buffer_srv(3, buffers.materials),
            GfxBindingSetItem::sampler(0, self.sampler),
            GfxBindingSetItem::texture_uav(0, output),
        ]);
        self.globals_set = Some(device.create_binding_set(&desc, self.pipelines.layout(BindingSlot::Globals))?);
        Ok(())
    }
}
// getters
impl Pathtracer {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_counter.frame_id()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn output(&self) -> Option<GfxTextureHandle> {
        self.output
    }

    #[inline]
    pub fn accumulation(&self) -> &AccumulationState {
        &self.accumulation
    }

    #[inline]
    pub fn tracker(&self) -> &RgHazardTracker {
        &self.tracker
    }

    #[inline]
    pub fn pipelines(&self) -> &PathtracerPipelines {
        &self.pipelines
    }

    #[inline]
    pub fn nrc(&self) -> &NrcStage {
        &self.nrc
    }

    #[inline]
    pub fn denoiser(&self) -> &DenoiserStage {
        &self.denoiser
    }

    #[inline]
    pub fn sharc(&self) -> Option<&SharcCache> {
        self.sharc.as_ref()
    }

    #[inline]
    pub fn tonemap(&self) -> &TonemapPass {
        &self.tonemap
    }

    /// NRC 停用后请求 NRC 时回退到参考路径追踪
    fn effective_technique(&self, requested: TechSelection) -> TechSelection {
        match requested {
            TechSelection::NeuralCache if !self.nrc.is_enabled() => TechSelection::Reference,
            technique => technique,
        }
    }
}
// update
impl Pathtracer {
    /// 场景重新加载之后调用
    pub fn scene_loaded(&mut self, settings: &mut PathtracerSettings) {
        self.scene_reloaded = true;
        settings.rebuild_acceleration_structure = true;
        settings.reset_accumulation = true;
    }

    /// 释放尺寸相关的资源，下一帧按新尺寸重建
    pub fn resize(&mut self, device: &mut dyn GfxDevice, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        let _span = tracy_client::span!("Pathtracer::resize");
        device.wait_idle();
        self.release_size_dependent(device);
        self.tracker.reset();
        self.width = width;
        self.height = height;
        self.accumulation.request_reset();
        log::info!("path tracer resized to {width}x{height}");
    }

    /// 录制并提交一帧
    ///
    /// 出错时本帧的命令不会提交，已经开始的 NRC 帧随之作废，下一帧可以正常开始。
    pub fn render(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        scene: &mut dyn SceneGraph,
        settings: &mut PathtracerSettings,
        framebuffer: GfxFramebufferHandle,
    ) -> anyhow::Result<FrameReport> {
        let result = self.render_frame(device, compiler, scene, settings, framebuffer);
        if let Err(err) = &result {
            log::error!("{} failed: {err:#}", self.frame_counter.frame_name());
            self.nrc.abort_frame();
        }
        result
    }

    fn render_frame(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        scene: &mut dyn SceneGraph,
        settings: &mut PathtracerSettings,
        framebuffer: GfxFramebufferHandle,
    ) -> anyhow::Result<FrameReport> {
        let _span = tracy_client::span!("Pathtracer::render");
        let frame_id = self.frame_counter.frame_id();
        let frame_index = self.frame_counter.shader_frame_index();
        let (width, height) = (self.width, self.height);
        let extent = self.extent();
        let mut report = FrameReport {
            frame_index: frame_id,
            ..Default::default()
        };

        scene.refresh(frame_id);

        let requested = settings.technique;
        let mut technique = self.effective_technique(requested);
        let selection = (technique, settings.denoiser);
        let switched = self.prev_selection.is_some_and(|prev| prev != selection);
        if switched {
            log::info!(
                "{} switched to {:?} + {:?}, accumulation reset",
                self.frame_counter.frame_name(),
                selection.0,
                selection.1
            );
            settings.reset_accumulation = true;
        }
        self.prev_selection = Some(selection);

        // 结构性变化需要等 GPU 空闲
        let rebuild_accel = settings.rebuild_acceleration_structure || self.accel.tlas().is_none();
        if self.output.is_none() || rebuild_accel {
            let _span = tracy_client::span!("recreate_frame_resources");
            device.wait_idle();
            if rebuild_accel {
                self.accel.recreate(device, &*scene)?;
                settings.rebuild_acceleration_structure = false;
                report.acceleration_rebuilt = true;
            }
            self.recreate_globals(device, &*scene)?;
        }
        let output = self.output.context("path tracer output missing")?;
        let globals = self.globals_set.context("globals binding set missing")?;

        let denoiser_active = settings.nrd_requested()
            && self.denoiser.ensure_ready(device, compiler, &self.pipelines, width, height);
        let denoiser_reset = self.denoiser.track_activation(denoiser_active) || switched || self.scene_reloaded;

        // view & accumulation
        self.view_prev = if self.frame_counter.is_first_frame() {
            PlanarView::new(width, height, scene.camera_view())
        } else {
            self.view
        };
        self.view.set_viewport(width, height);
        self.view.set_matrices(scene.camera_view(), PlanarView::perspective(width, height));
        self.view.set_pixel_offset(if jitter_enabled(settings, denoiser_active) {
            halton_jitter(frame_index)
        } else {
            Vec2::ZERO
        });
        if settings.reset_accumulation || self.scene_reloaded {
            self.accumulation.request_reset();
        }
        report.accumulated_frames = self.accumulation.advance(
            self.view.view_matrix(),
            settings.enable_animations,
            settings.accumulation_enabled(),
        );
        report.accumulation_reset = self.accumulation.reset_pending();

        let mut lighting = lighting_constants(settings, &*scene, &self.view, &self.view_prev);

        let mut cmd = device.create_command_list("Pathtracer");
        cmd.open();

        report.nrc_fell_back = technique != requested;
        if technique == TechSelection::NeuralCache {
            let snapshot = NrcStage::context_settings(settings, scene.bounds(), width, height);
            let layout = self.pipelines.layout(BindingSlot::NeuralCache);
            let frame_settings = NrcStage::frame_settings(settings);
            if !self.nrc.begin_frame(
                device,
                &mut cmd,
                &mut self.tracker,
                layout,
                &snapshot,
                &frame_settings,
                &mut lighting.nrc_constants,
            ) {
                technique = TechSelection::Reference;
                report.nrc_fell_back = true;
            }
        }

        if technique == TechSelection::SpatialHashCache {
            if self.sharc.is_none() {
                let layout = self.pipelines.layout(BindingSlot::SpatialCache);
                self.sharc = Some(SharcCache::new(device, layout, SHARC_ENTRIES_NUM)?);
                log::info!("SHARC cache created with {SHARC_ENTRIES_NUM} entries");
            }
            if let Some(sharc) = self.sharc.as_mut() {
                sharc.fill_constants(&mut lighting, &settings.sharc, self.view.view_origin());
                let update = settings.sharc.enable_update;
                if sharc.needs_clear() || (update && (settings.sharc.enable_clear || self.scene_reloaded)) {
                    sharc.clear(&mut cmd, &mut self.tracker);
                }
                if update && settings.sharc.enable_resolve {
                    sharc.swap(&mut cmd, &mut self.tracker);
                    report.sharc_swapped = true;
                }
            }
        }
        report.technique = technique;

        let global = global_constants(
            settings,
            FrameState {
                frame_index,
                accumulated_frames: report.accumulated_frames,
                reset_accumulation: report.accumulation_reset,
                denoiser_active,
            },
        );
        cmd.write_buffer(self.lighting_cb, &lighting);
        cmd.write_buffer(self.global_cb, &global);
        self.accel.record_builds(&mut cmd, &*scene);
        if denoiser_active {
            self.denoiser.clear_view_z(&mut cmd, &mut self.tracker);
        }

        // primary
        let mut sets = BindingSlots::new()
            .with(BindingSlot::Globals, globals)
            .with(BindingSlot::Bindless, scene.gpu_buffers().bindless_set);
        if denoiser_active {
            sets.set_or_clear(BindingSlot::Denoiser, self.denoiser.in_set());
        }
        let denoiser_inputs = if denoiser_active { self.denoiser.input_textures() } else { Vec::new() };
        let primary_access = |name: &'static str| {
            RgDispatchAccess::new(name)
                .read_write_image(output, RgStage::RayTracing)
                .read_write_images(denoiser_inputs.iter().copied(), RgStage::RayTracing)
        };

        cmd.begin_marker("PathTracing");
        match technique {
            TechSelection::NeuralCache => {
                let nrc_buffers = self.nrc.buffers();
                sets.set(BindingSlot::NeuralCache, self.nrc.binding_set().context("NRC binding set missing")?);

                let query = RtPipelineKey {
                    pass: RtPass::NrcQuery,
                    denoiser: denoiser_active,
                };
                let dispatch = RayDispatch {
                    key: query,
                    width,
                    height,
                    access: primary_access(RtPass::NrcQuery.name())
                        .read_write_buffers(nrc_buffers.iter().copied(), RgStage::RayTracing),
                };
                report.primary_dispatches.push(self.trace_rays(device, compiler, &mut cmd, &sets, dispatch)?);

                if settings.nrc.train_cache {
                    let [training_width, training_height] = self.nrc.training_dimensions();
                    // query 与 update 写同一组 buffer，两者之间的顺序由 SDK 保证
                    let dispatch = RayDispatch {
                        key: RtPipelineKey {
                            pass: RtPass::NrcUpdate,
                            denoiser: false,
                        },
                        width: training_width,
                        height: training_height,
                        access: RgDispatchAccess::new(RtPass::NrcUpdate.name())
                            .read_write_buffers(nrc_buffers.iter().copied(), RgStage::RayTracing)
                            .unordered_with(RtPass::NrcQuery.name()),
                    };
                    report.primary_dispatches.push(self.trace_rays(device, compiler, &mut cmd, &sets, dispatch)?);
                }

                self.tracker.prepare_dispatch(
                    &mut cmd,
                    &RgDispatchAccess::new("nrc-query-and-train")
                        .read_write_buffers(nrc_buffers.iter().copied(), RgStage::Compute),
                );
                report.nrc_training_loss = self.nrc.query_and_train(&mut cmd, settings.nrc.calculate_training_loss);

                if !settings.debug_view_active() && self.nrc.is_enabled() {
                    self.tracker.prepare_dispatch(
                        &mut cmd,
                        &RgDispatchAccess::new("nrc-resolve")
                            .read_buffers(nrc_buffers.iter().copied(), RgStage::Compute)
                            .read_write_image(output, RgStage::Compute),
                    );
                    self.nrc.resolve(&*device, &mut cmd, output);
                }
            }
            TechSelection::SpatialHashCache => {
                let sharc = self.sharc.as_ref().context("SHARC cache missing")?;
                let sharc_buffers = sharc.buffers();
                let groups = sharc.dispatch_groups();
                sets.set(BindingSlot::SpatialCache, sharc.binding_set());

                if settings.sharc.enable_update {
                    let downscale = settings.sharc.downscale_factor.max(1);
                    // update pass 不写降噪输入
                    let dispatch = RayDispatch {
                        key: RtPipelineKey {
                            pass: RtPass::SharcUpdate,
                            denoiser: false,
                        },
                        width: (width / downscale).max(1),
                        height: (height / downscale).max(1),
                        access: RgDispatchAccess::new(RtPass::SharcUpdate.name())
                            .read_write_buffers(sharc_buffers, RgStage::RayTracing),
                    };
                    report.primary_dispatches.push(self.trace_rays(device, compiler, &mut cmd, &sets, dispatch)?);

                    if settings.sharc.enable_resolve {
                        for kind in [ComputeKind::SharcResolve, ComputeKind::SharcCompaction] {
                            let pipeline = self.pipelines.compute_pipeline(device, compiler, kind)?;
                            self.tracker.prepare_dispatch(
                                &mut cmd,
                                &RgDispatchAccess::new(kind.name()).read_write_buffers(sharc_buffers, RgStage::Compute),
                            );
                            cmd.dispatch(
                                &GfxComputeState {
                                    pipeline,
                                    bindings: self.pipelines.compute_sets(kind, &sets),
                                },
                                groups,
                                1,
                            );
                        }
                    }
                }

                let dispatch = RayDispatch {
                    key: RtPipelineKey {
                        pass: RtPass::SharcQuery,
                        denoiser: denoiser_active,
                    },
                    width,
                    height,
                    access: primary_access(RtPass::SharcQuery.name())
                        .read_write_buffers(sharc_buffers, RgStage::RayTracing),
                };
                report.primary_dispatches.push(self.trace_rays(device, compiler, &mut cmd, &sets, dispatch)?);
            }
            TechSelection::Reference => {
                let dispatch = RayDispatch {
                    key: RtPipelineKey {
                        pass: RtPass::Reference,
                        denoiser: denoiser_active,
                    },
                    width,
                    height,
                    access: primary_access(RtPass::Reference.name()),
                };
                report.primary_dispatches.push(self.trace_rays(device, compiler, &mut cmd, &sets, dispatch)?);
            }
        }
        cmd.end_marker();

        if denoiser_active {
            self.denoiser.denoise(
                device,
                compiler,
                &mut self.pipelines,
                &mut cmd,
                &mut self.tracker,
                &DenoiserFrame {
                    globals,
                    output,
                    view: &self.view,
                    view_prev: &self.view_prev,
                    frame_index,
                    reset: denoiser_reset,
                    nrc: technique == TechSelection::NeuralCache,
                },
            )?;
            report.nrd_ran = true;
        }

        self.tonemap.draw(
            device,
            compiler,
            &mut cmd,
            &mut self.tracker,
            self.global_cb,
            output,
            framebuffer,
            extent,
        )?;

        cmd.close();
        device.execute_command_list(&cmd)?;
        self.denoiser.release_retired(device);
        self.tonemap.release_retired(device);

        self.accumulation.end_frame();
        settings.reset_accumulation = false;
        self.scene_reloaded = false;
        if technique == TechSelection::NeuralCache {
            self.nrc.end_frame(device.native_queue(GfxQueue::Graphics));
        }
        self.nrc.release_if_disabled(device, &mut self.tracker);

        log::debug!(
            "{} {:?}: {} ray dispatches, accumulated {}",
            self.frame_counter.frame_name(),
            report.technique,
            report.primary_dispatches.len(),
            report.accumulated_frames
        );
        self.frame_counter.next_frame();
        tracy_client::frame_mark();
        Ok(report)
    }
}
// tools
impl Pathtracer {
    /// 按变体选择 pipeline，只绑定变体需要的槽位，其余槽位使用空 set
    fn trace_rays(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        cmd: &mut GfxCommandList,
        available: &BindingSlots<GfxBindingSetHandle>,
        dispatch: RayDispatch,
    ) -> anyhow::Result<(RtPass, u32, u32)> {
        let RayDispatch {
            key,
            width,
            height,
            access,
        } = dispatch;

        let mut sets = BindingSlots::new();
        for slot in key.active_slots() {
            let set = available
                .get(slot)
                .with_context(|| format!("binding slot {slot} is not ready for {}", key.pass.name()))?;
            sets.set(slot, set);
        }

        let pipeline = self.pipelines.rt_pipeline(device, compiler, key)?;
        self.tracker.prepare_dispatch(cmd, &access);
        cmd.dispatch_rays(
            &GfxRayTracingState {
                pipeline,
                bindings: self.pipelines.resolve_sets(&sets),
            },
            width,
            height,
        );
        Ok((key.pass, width, height))
    }
}
// destroy
impl Pathtracer {
    fn release_size_dependent(&mut self, device: &mut dyn GfxDevice) {
        if let Some(set) = self.globals_set.take() {
            device.destroy_binding_set(set);
        }
        if let Some(output) = self.output.take() {
            self.tracker.forget_image(output);
            device.destroy_texture(output);
        }
        self.denoiser.destroy(device, &mut self.tracker);
        self.tonemap.release_targets(device, &mut self.tracker);
    }

    pub fn destroy(mut self, device: &mut dyn GfxDevice) {
        let _span = tracy_client::span!("Pathtracer::destroy");
        device.wait_idle();
        self.release_size_dependent(device);
        if let Some(sharc) = self.sharc.take() {
            sharc.destroy(device, &mut self.tracker);
        }
        self.nrc.destroy(device, &mut self.tracker);
        self.accel.destroy(device);
        self.tonemap.destroy(device, &mut self.tracker);
        self.pipelines.destroy(device);
        device.destroy_sampler(self.sampler);
        device.destroy_buffer(self.lighting_cb);
        device.destroy_buffer(self.global_cb);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use glam::{Mat4, Vec3};
    use radiant_gfx::commands::GfxCommand;
    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::{HeadlessDevice, HeadlessShaderCompiler};
    use radiant_nrc::create_nrc_integration;
    use radiant_nrc::headless::{HeadlessNrcProbe, HeadlessNrcSdk};
    use radiant_nrc::sdk::NrcOp;
    use radiant_nrd::headless::HeadlessDenoiserEngine;
    use radiant_render_interface::settings::DebugOutput;

    use super::*;
    use crate::demo_scene::DemoScene;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 40;

    struct Harness {
        device: HeadlessDevice,
        compiler: HeadlessShaderCompiler,
        scene: DemoScene,
        pathtracer: Pathtracer,
        nrc_probe: Arc<Mutex<HeadlessNrcProbe>>,
    }
    impl Harness {
        fn new() -> Self {
            tracy_client::Client::start();
            let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
            let scene = DemoScene::new(&mut device).unwrap();
            let sdk = HeadlessNrcSdk::new();
            let nrc_probe = sdk.probe();
            let pathtracer = Pathtracer::new(
                &mut device,
                &scene,
                create_nrc_integration(GraphicsApi::D3d12, Box::new(sdk)),
                Box::new(HeadlessDenoiserEngine::new()),
                WIDTH,
                HEIGHT,
            )
            .unwrap();
            Self {
                device,
                compiler: HeadlessShaderCompiler::new(),
                scene,
                pathtracer,
                nrc_probe,
            }
        }

        fn frame(&mut self, settings: &mut PathtracerSettings) -> FrameReport {
            self.pathtracer
                .render(
                    &mut self.device,
                    &mut self.compiler,
                    &mut self.scene,
                    settings,
                    GfxFramebufferHandle::default(),
                )
                .unwrap()
        }

        fn last_commands(&self) -> &[GfxCommand] {
            self.device.last_submission().unwrap()
        }
    }

    fn markers(commands: &[GfxCommand]) -> Vec<&str> {
        commands
            .iter()
            .filter_map(|c| match c {
                GfxCommand::BeginMarker(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    fn ray_dispatch_count(commands: &[GfxCommand]) -> usize {
        commands.iter().filter(|c| matches!(c, GfxCommand::DispatchRays { .. })).count()
    }

    #[test]
    fn test_one_primary_technique_per_frame() {
        let mut harness = Harness::new();
        for technique in [TechSelection::Reference, TechSelection::NeuralCache, TechSelection::SpatialHashCache] {
            let mut settings = PathtracerSettings {
                technique,
                ..Default::default()
            };
            let report = harness.frame(&mut settings);
            assert_eq!(report.technique, technique);

            let passes = report.primary_dispatches.iter().map(|(pass, ..)| *pass).collect::<Vec<_>>();
            let expected = match technique {
                TechSelection::Reference => vec![RtPass::Reference],
                TechSelection::NeuralCache => vec![RtPass::NrcQuery, RtPass::NrcUpdate],
                TechSelection::SpatialHashCache => vec![RtPass::SharcUpdate, RtPass::SharcQuery],
            };
            assert_eq!(passes, expected);
            assert_eq!(ray_dispatch_count(harness.last_commands()), expected.len());
        }
    }

    #[test]
    fn test_reference_without_accumulation() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings::default();

        for frame in 0..4 {
            let report = harness.frame(&mut settings);
            assert_eq!(report.primary_dispatches, vec![(RtPass::Reference, WIDTH, HEIGHT)]);
            assert_eq!(report.accumulated_frames, 1);
            assert_eq!(report.acceleration_rebuilt, frame == 0);
            assert!(!report.nrd_ran);
        }
        assert_eq!(harness.device.wait_idle_count(), 1);
    }

    #[test]
    fn test_accumulation_resets_on_camera_move() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings {
            enable_accumulation: true,
            ..Default::default()
        };

        let counts = (0..3).map(|_| harness.frame(&mut settings).accumulated_frames).collect::<Vec<_>>();
        assert_eq!(counts, vec![1, 2, 3]);

        harness
            .scene
            .set_camera(Mat4::look_at_rh(Vec3::new(1.0, 2.0, 8.0), Vec3::new(0.0, 1.0, 0.0), Vec3::Y));
        let report = harness.frame(&mut settings);
        assert_eq!(report.accumulated_frames, 1);
        assert!(report.accumulation_reset);
        assert_eq!(harness.frame(&mut settings).accumulated_frames, 2);

        settings.enable_animations = true;
        assert_eq!(harness.frame(&mut settings).accumulated_frames, 1);
        assert_eq!(harness.frame(&mut settings).accumulated_frames, 1);
    }

    #[test]
    fn test_nrd_runs_after_primary_dispatch() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings {
            denoiser: DenoiserSelection::Nrd,
            ..Default::default()
        };

        let report = harness.frame(&mut settings);
        assert!(report.nrd_ran);
        let commands = harness.last_commands();
        let rays = commands.iter().position(|c| matches!(c, GfxCommand::DispatchRays { .. })).unwrap();
        let computes = commands
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, GfxCommand::Dispatch { .. }))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        // pack、NRD 的 pass、resolve 都在主 dispatch 之后
        assert!(computes.len() >= 3);
        assert!(computes.iter().all(|idx| *idx > rays));
        let markers = markers(commands);
        let order = ["AccelStructures", "PathTracing", "Denoiser", "Tonemapping"]
            .map(|name| markers.iter().position(|m| *m == name).unwrap());
        assert!(order.is_sorted());

        let GfxCommand::DispatchRays { state, .. } = &commands[rays] else {
            unreachable!();
        };
        assert_eq!(state.bindings[BindingSlot::Denoiser.index()], harness.pathtracer.denoiser().in_set().unwrap());

        settings.debug_output = DebugOutput::WorldSpaceNormals;
        assert!(!harness.frame(&mut settings).nrd_ran);
    }

    #[test]
    fn test_nrc_without_training() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings {
            technique: TechSelection::NeuralCache,
            ..Default::default()
        };
        settings.nrc.train_cache = false;

        let report = harness.frame(&mut settings);
        assert_eq!(report.primary_dispatches, vec![(RtPass::NrcQuery, WIDTH, HEIGHT)]);
        {
            let probe = harness.nrc_probe.lock().unwrap();
            assert_eq!(probe.query_and_train_calls, 1);
            assert_eq!(probe.resolve_calls, 1);
            assert_eq!(probe.end_frames, 1);
        }

        settings.debug_output = DebugOutput::WorldSpaceNormals;
        harness.frame(&mut settings);
        let probe = harness.nrc_probe.lock().unwrap();
        assert_eq!(probe.query_and_train_calls, 2);
        assert_eq!(probe.resolve_calls, 1);
    }

    #[test]
    fn test_nrc_update_dispatch_skips_barriers_against_query() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings {
            technique: TechSelection::NeuralCache,
            ..Default::default()
        };
        settings.nrc.train_cache = true;

        let report = harness.frame(&mut settings);
        let training = harness.pathtracer.nrc().training_dimensions();
        assert_eq!(report.primary_dispatches[1], (RtPass::NrcUpdate, training[0], training[1]));
        assert_eq!(harness.pathtracer.tracker().total_elided(), harness.pathtracer.nrc().buffers().len());
    }

    #[test]
    fn test_nrc_configured_once_per_snapshot() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings {
            technique: TechSelection::NeuralCache,
            ..Default::default()
        };

        for _ in 0..3 {
            harness.frame(&mut settings);
        }
        assert_eq!(harness.nrc_probe.lock().unwrap().configure_calls, 1);

        harness.pathtracer.resize(&mut harness.device, WIDTH * 2, HEIGHT);
        let report = harness.frame(&mut settings);
        assert_eq!(report.primary_dispatches[0], (RtPass::NrcQuery, WIDTH * 2, HEIGHT));
        assert_eq!(harness.nrc_probe.lock().unwrap().configure_calls, 2);
    }

    #[test]
    fn test_nrc_failure_falls_back_to_reference() {
        let mut harness = Harness::new();
        harness.nrc_probe.lock().unwrap().fail_on.push(NrcOp::Configure);
        let mut settings = PathtracerSettings {
            technique: TechSelection::NeuralCache,
            ..Default::default()
        };

        let report = harness.frame(&mut settings);
        assert!(report.nrc_fell_back);
        assert_eq!(report.technique, TechSelection::Reference);
        assert_eq!(report.primary_dispatches, vec![(RtPass::Reference, WIDTH, HEIGHT)]);
        assert!(!harness.pathtracer.nrc().is_enabled());
        assert_eq!(harness.nrc_probe.lock().unwrap().shutdown_calls, 1);

        harness.nrc_probe.lock().unwrap().fail_on.clear();
        let report = harness.frame(&mut settings);
        assert!(report.nrc_fell_back);
        assert_eq!(report.technique, TechSelection::Reference);
        assert_eq!(harness.nrc_probe.lock().unwrap().initialize_calls, 1);
    }

    #[test]
    fn test_failed_frame_does_not_disable_nrc() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings {
            technique: TechSelection::NeuralCache,
            ..Default::default()
        };
        settings.nrc.train_cache = false;
        harness.frame(&mut settings);

        // NRC 帧已经开始之后，update pass 的 pipeline 编译失败
        settings.nrc.train_cache = true;
        harness.compiler = HeadlessShaderCompiler::new().fail_on(pipelines::PATHTRACER_LIBRARY);
        let result = harness.pathtracer.render(
            &mut harness.device,
            &mut harness.compiler,
            &mut harness.scene,
            &mut settings,
            GfxFramebufferHandle::default(),
        );
        assert!(result.is_err());
        assert_eq!(harness.nrc_probe.lock().unwrap().begin_frames, 2);
        assert_eq!(harness.nrc_probe.lock().unwrap().end_frames, 1);
        assert_eq!(harness.device.submitted().len(), 1);

        harness.compiler = HeadlessShaderCompiler::new();
        let report = harness.frame(&mut settings);
        assert_eq!(report.technique, TechSelection::NeuralCache);
        assert!(!report.nrc_fell_back);
        assert_eq!(report.primary_dispatches.len(), 2);
        assert!(harness.pathtracer.nrc().is_enabled());
        assert_eq!(harness.nrc_probe.lock().unwrap().end_frames, 2);
    }

    #[test]
    fn test_sharc_swaps_buffers_each_resolve() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings {
            technique: TechSelection::SpatialHashCache,
            ..Default::default()
        };

        let report = harness.frame(&mut settings);
        assert!(report.sharc_swapped);
        let (current, prev) = harness.pathtracer.sharc().unwrap().voxel_buffers();
        let set = harness.pathtracer.sharc().unwrap().binding_set();

        let report = harness.frame(&mut settings);
        assert!(report.sharc_swapped);
        let sharc = harness.pathtracer.sharc().unwrap();
        assert_eq!(sharc.voxel_buffers(), (prev, current));
        assert_ne!(sharc.binding_set(), set);

        // update pass 按降采样分辨率，query 是全分辨率
        let downscale = settings.sharc.downscale_factor.max(1);
        assert_eq!(
            report.primary_dispatches,
            vec![
                (RtPass::SharcUpdate, (WIDTH / downscale).max(1), (HEIGHT / downscale).max(1)),
                (RtPass::SharcQuery, WIDTH, HEIGHT),
            ]
        );
        let compute_dispatches = harness
            .last_commands()
            .iter()
            .filter(|c| matches!(c, GfxCommand::Dispatch { .. }))
            .count();
        assert_eq!(compute_dispatches, 2);
    }

    #[test]
    fn test_technique_switch_resets_accumulation_without_rebuild() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings {
            enable_accumulation: true,
            ..Default::default()
        };
        harness.frame(&mut settings);
        assert_eq!(harness.frame(&mut settings).accumulated_frames, 2);

        settings.technique = TechSelection::SpatialHashCache;
        let report = harness.frame(&mut settings);
        assert!(!report.acceleration_rebuilt);
        assert!(report.accumulation_reset);
        assert_eq!(report.accumulated_frames, 1);
        assert!(!settings.reset_accumulation);
        assert_eq!(harness.device.wait_idle_count(), 1);

        let commands = harness.last_commands();
        let query = commands
            .iter()
            .filter_map(|c| match c {
                GfxCommand::DispatchRays { state, .. } => Some(state),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(
            query.bindings[BindingSlot::SpatialCache.index()],
            harness.pathtracer.sharc().unwrap().binding_set()
        );
        assert_eq!(harness.frame(&mut settings).accumulated_frames, 2);
    }

    #[test]
    fn test_sharc_buffers_cleared_on_first_use_after_switch() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings::default();
        settings.sharc.enable_clear = false;
        harness.frame(&mut settings);
        harness.frame(&mut settings);
        assert!(harness.pathtracer.sharc().is_none());

        settings.technique = TechSelection::SpatialHashCache;
        harness.frame(&mut settings);
        let sharc = harness.pathtracer.sharc().unwrap();
        assert!(!sharc.needs_clear());

        let commands = harness.last_commands();
        let first_rays = commands.iter().position(|c| matches!(c, GfxCommand::DispatchRays { .. })).unwrap();
        let cleared = commands[..first_rays]
            .iter()
            .filter_map(|c| match c {
                GfxCommand::ClearBufferUint { buffer, .. } => Some(*buffer),
                _ => None,
            })
            .collect::<Vec<_>>();
        for buffer in sharc.buffers() {
            assert!(cleared.contains(&buffer));
        }

        // 之后的帧不再整体清空 hash entries
        let [hash_entries, ..] = sharc.buffers();
        harness.frame(&mut settings);
        assert!(!harness.last_commands().contains(&GfxCommand::ClearBufferUint {
            buffer: hash_entries,
            value: 0
        }));
    }

    #[test]
    fn test_scene_reload_rebuilds_acceleration_structures() {
        let mut harness = Harness::new();
        let mut settings = PathtracerSettings::default();
        harness.frame(&mut settings);

        harness.pathtracer.scene_loaded(&mut settings);
        let report = harness.frame(&mut settings);
        assert!(report.acceleration_rebuilt);
        assert!(report.accumulation_reset);
        assert!(!settings.rebuild_acceleration_structure);
        assert_eq!(harness.device.wait_idle_count(), 2);
    }

    #[test]
    fn test_destroy_releases_resources() {
        let mut harness = Harness::new();
        let textures_before = harness.device.live_textures();
        let layouts_before = harness.device.live_binding_layouts();
        let mut settings = PathtracerSettings {
            technique: TechSelection::SpatialHashCache,
            denoiser: DenoiserSelection::Nrd,
            ..Default::default()
        };
        harness.frame(&mut settings);
        assert!(harness.device.live_textures() > textures_before);

        let Harness {
            mut device, pathtracer, ..
        } = harness;
        pathtracer.destroy(&mut device);
        assert_eq!(device.live_textures(), textures_before);
        assert_eq!(device.live_graphics_pipelines(), 0);
        // 只剩场景的 Bindless layout
        assert_eq!(device.live_binding_layouts(), 1);
        assert!(layouts_before > 1);
    }
}
