//! 帧编排中的 NRC 阶段
//!
//! 包装 [`NrcIntegration`]：首次使用时初始化，配置快照变化时重新配置并重建 binding set。
//! SDK 的任何失败都会让 NRC 在本次会话中停用，帧编排随后回退到参考路径追踪。
//! 已经录制进本帧命令的资源要等提交之后才能释放，所以停用分两步：
//! 失败时只做标记，[`NrcStage::release_if_disabled`] 在提交后释放。

use radiant_gfx::commands::GfxCommandList;
use radiant_gfx::device::{GfxDevice, GfxNativeHandle};
use radiant_gfx::handles::{GfxBindingLayoutHandle, GfxBindingSetHandle, GfxBufferHandle, GfxTextureHandle};
use radiant_nrc::settings::{ContextSettings, FrameSettings, compute_ideal_training_dimensions};
use radiant_nrc::{NrcError, NrcIntegration, NrcState};
use radiant_render_graph::RgHazardTracker;
use radiant_render_interface::constants::NrcConstants;
use radiant_render_interface::scene::SceneBounds;
use radiant_render_interface::settings::PathtracerSettings;

pub struct NrcStage {
    integration: Box<dyn NrcIntegration>,
    binding_set: Option<GfxBindingSetHandle>,

    /// 本帧 SDK 确实开始了一帧，提交后需要 end_frame，提交失败时需要 abort_frame
    frame_begun: bool,
    disabled: bool,
    released: bool,
}
// new & init
impl NrcStage {
    pub fn new(integration: Box<dyn NrcIntegration>) -> Self {
        Self {
            integration,
            binding_set: None,
            frame_begun: false,
            disabled: false,
            released: false,
        }
    }

    /// 由当前设置与场景构造配置快照
    pub fn context_settings(
        settings: &PathtracerSettings,
        bounds: SceneBounds,
        width: u32,
        height: u32,
    ) -> ContextSettings {
        let frame_dimensions = [width, height];
        ContextSettings {
            learn_irradiance: settings.nrc.learn_irradiance,
            include_direct_lighting: settings.nrc.include_direct_illumination,
            frame_dimensions,
            training_dimensions: compute_ideal_training_dimensions(frame_dimensions),
            max_path_vertices: settings.bounces_max,
            samples_per_pixel: settings.samples_per_pixel,
            scene_bounds_min: bounds.min.to_array(),
            scene_bounds_max: bounds.max.to_array(),
        }
    }

    pub fn frame_settings(settings: &PathtracerSettings) -> FrameSettings {
        FrameSettings {
            max_expected_average_radiance_value: settings.nrc.max_average_radiance,
            termination_heuristic_threshold: settings.nrc.termination_heuristic_threshold,
            training_termination_heuristic_threshold: settings.nrc.termination_heuristic_threshold,
            resolve_mode: settings.nrc.resolve_mode,
        }
    }
}
// getters
impl NrcStage {
    /// 本次会话中是否还可以使用
    #[inline]
    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    #[inline]
    pub fn binding_set(&self) -> Option<GfxBindingSetHandle> {
        self.binding_set
    }

    #[inline]
    pub fn integration(&self) -> &dyn NrcIntegration {
        self.integration.as_ref()
    }

    /// update pass 的分辨率
    pub fn training_dimensions(&self) -> [u32; 2] {
        self.integration.context_settings().map_or([0, 0], |settings| settings.training_dimensions)
    }

    pub fn buffers(&self) -> Vec<GfxBufferHandle> {
        self.integration.buffers().iter().map(|(_, buffer)| buffer).collect()
    }
}
// update
impl NrcStage {
    /// 初始化、按需重新配置、开始本帧并填写 shader 常量
    ///
    /// 返回 `false` 表示 NRC 已停用，本帧应当使用参考路径追踪。
    #[allow(clippy::too_many_arguments)]
    pub fn begin_frame(
        &mut self,
        device: &mut dyn GfxDevice,
        cmd: &mut GfxCommandList,
        tracker: &mut RgHazardTracker,
        layout: GfxBindingLayoutHandle,
        snapshot: &ContextSettings,
        frame: &FrameSettings,
        constants: &mut NrcConstants,
    ) -> bool {
        let _span = tracy_client::span!("nrc_begin_frame");
        if self.disabled {
            return false;
        }
        match self.try_begin_frame(device, cmd, tracker, layout, snapshot, frame) {
            Ok(()) => {
                self.integration.populate_shader_constants(constants);
                true
            }
            Err(err) => {
                self.disable(err);
                false
            }
        }
    }

    fn try_begin_frame(
        &mut self,
        device: &mut dyn GfxDevice,
        cmd: &mut GfxCommandList,
        tracker: &mut RgHazardTracker,
        layout: GfxBindingLayoutHandle,
        snapshot: &ContextSettings,
        frame: &FrameSettings,
    ) -> anyhow::Result<()> {
        if !self.integration.is_initialized() {
            self.integration.initialize(device)?;
        }

        if self.integration.context_settings() != Some(snapshot) {
            if let Some(set) = self.binding_set.take() {
                device.destroy_binding_set(set);
            }
            // configure 会替换全部 buffer
            for buffer in self.buffers() {
                tracker.forget_buffer(buffer);
            }
            self.integration.configure(device, snapshot)?;
            self.binding_set = Some(device.create_binding_set(&self.integration.buffers().binding_set_desc(), layout)?);
            log::info!(
                "NRC configured for {}x{}, training {}x{}, {} bytes of buffers",
                snapshot.frame_dimensions[0],
                snapshot.frame_dimensions[1],
                snapshot.training_dimensions[0],
                snapshot.training_dimensions[1],
                self.integration.current_memory_consumption()
            );
        }

        self.integration.begin_frame(cmd, frame)?;
        // command list 没有原生句柄时 SDK 什么都不做
        self.frame_begun = self.integration.state() == NrcState::BegunFrame;
        Ok(())
    }

    /// 返回训练 loss；失败时停用 NRC
    pub fn query_and_train(&mut self, cmd: &mut GfxCommandList, calculate_training_loss: bool) -> Option<f32> {
        match self.integration.query_and_train(cmd, calculate_training_loss) {
            Ok(loss) => calculate_training_loss.then_some(loss),
            Err(err) => {
                self.disable(err);
                None
            }
        }
    }

    pub fn resolve(&mut self, device: &dyn GfxDevice, cmd: &mut GfxCommandList, output: GfxTextureHandle) {
        if let Err(err) = self.integration.resolve(device, cmd, output) {
            self.disable(err);
        }
    }

    /// 提交之后调用
    pub fn end_frame(&mut self, queue: Option<GfxNativeHandle>) {
        if !std::mem::take(&mut self.frame_begun) || self.disabled {
            return;
        }
        if let Err(err) = self.integration.end_frame(queue) {
            self.disable(err);
        }
    }

    /// 本帧录制或提交失败，命令不会被执行
    pub fn abort_frame(&mut self) {
        if std::mem::take(&mut self.frame_begun) {
            self.integration.abort_frame();
        }
    }

    fn disable(&mut self, err: impl Into<anyhow::Error>) {
        let err = err.into();
        match err.downcast_ref::<NrcError>() {
            Some(nrc_err) => log::error!("NRC disabled for this session, falling back to reference path tracing: {nrc_err}"),
            None => log::error!("NRC disabled for this session, falling back to reference path tracing: {err:#}"),
        }
        self.disabled = true;
        self.frame_begun = false;
    }

    /// 提交之后释放停用的 NRC 的全部资源
    pub fn release_if_disabled(&mut self, device: &mut dyn GfxDevice, tracker: &mut RgHazardTracker) {
        if !self.disabled || self.released {
            return;
        }
        self.destroy(device, tracker);
        self.released = true;
    }
}
// destroy
impl NrcStage {
    pub fn destroy(&mut self, device: &mut dyn GfxDevice, tracker: &mut RgHazardTracker) {
        if let Some(set) = self.binding_set.take() {
            device.destroy_binding_set(set);
        }
        for buffer in self.buffers() {
            tracker.forget_buffer(buffer);
        }
        self.integration.shutdown(device);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::HeadlessDevice;
    use radiant_nrc::buffers::NrcBufferHandles;
    use radiant_nrc::create_nrc_integration;
    use radiant_nrc::headless::{HeadlessNrcProbe, HeadlessNrcSdk};
    use radiant_nrc::sdk::NrcOp;
    use radiant_render_graph::{RgDispatchAccess, RgStage};

    use super::*;

    fn stage(device: &mut HeadlessDevice) -> (NrcStage, Arc<Mutex<HeadlessNrcProbe>>, GfxBindingLayoutHandle) {
        let sdk = HeadlessNrcSdk::new();
        let probe = sdk.probe();
        let layout = device.create_binding_layout(&NrcBufferHandles::binding_layout_desc(2)).unwrap();
        (NrcStage::new(create_nrc_integration(GraphicsApi::D3d12, Box::new(sdk))), probe, layout)
    }

    fn bounds() -> SceneBounds {
        SceneBounds {
            min: glam::Vec3::splat(-1.0),
            max: glam::Vec3::splat(1.0),
        }
    }

    #[test]
    fn test_configure_once_per_snapshot() {
        tracy_client::Client::start();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let (mut nrc, probe, layout) = stage(&mut device);
        let mut settings = PathtracerSettings::default();
        let mut constants = NrcConstants::default();
        let mut tracker = RgHazardTracker::new();

        for _ in 0..3 {
            let snapshot = NrcStage::context_settings(&settings, bounds(), 64, 32);
            let mut cmd = device.create_command_list("frame");
            cmd.open();
            assert!(nrc.begin_frame(&mut device, &mut cmd, &mut tracker, layout, &snapshot, &NrcStage::frame_settings(&settings), &mut constants));
            nrc.query_and_train(&mut cmd, false);
            cmd.close();
            nrc.end_frame(Some(GfxNativeHandle(1)));
        }
        assert_eq!(probe.lock().unwrap().configure_calls, 1);
        assert_eq!(probe.lock().unwrap().end_frames, 3);
        assert_eq!(constants.frame_dimensions, [64, 32]);
        let first_set = nrc.binding_set();

        let old_buffers = nrc.buffers();
        let mut cmd = device.create_command_list("frame");
        cmd.open();
        tracker.prepare_dispatch(
            &mut cmd,
            &RgDispatchAccess::new("query").read_write_buffers(old_buffers.iter().copied(), RgStage::RayTracing),
        );
        cmd.close();
        assert!(old_buffers.iter().all(|buffer| tracker.buffer_state(*buffer).is_some()));

        settings.bounces_max += 1;
        let snapshot = NrcStage::context_settings(&settings, bounds(), 64, 32);
        let mut cmd = device.create_command_list("frame");
        cmd.open();
        assert!(nrc.begin_frame(&mut device, &mut cmd, &mut tracker, layout, &snapshot, &NrcStage::frame_settings(&settings), &mut constants));
        cmd.close();
        assert_eq!(probe.lock().unwrap().configure_calls, 2);
        assert_ne!(nrc.binding_set(), first_set);
        assert_eq!(nrc.training_dimensions(), [64, 32]);
        assert!(old_buffers.iter().all(|buffer| tracker.buffer_state(*buffer).is_none()));
    }

    #[test]
    fn test_frame_without_native_command_list_is_not_ended() {
        tracy_client::Client::start();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let (mut nrc, probe, layout) = stage(&mut device);
        let settings = PathtracerSettings::default();
        let snapshot = NrcStage::context_settings(&settings, bounds(), 64, 32);
        let mut tracker = RgHazardTracker::new();
        let mut constants = NrcConstants::default();

        let mut cmd = GfxCommandList::new("no native", None);
        cmd.open();
        assert!(nrc.begin_frame(&mut device, &mut cmd, &mut tracker, layout, &snapshot, &NrcStage::frame_settings(&settings), &mut constants));
        cmd.close();
        nrc.end_frame(Some(GfxNativeHandle(1)));

        assert!(nrc.is_enabled());
        assert_eq!(probe.lock().unwrap().end_frames, 0);
    }

    #[test]
    fn test_aborted_frame_keeps_nrc_enabled() {
        tracy_client::Client::start();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let (mut nrc, probe, layout) = stage(&mut device);
        let settings = PathtracerSettings::default();
        let snapshot = NrcStage::context_settings(&settings, bounds(), 64, 32);
        let mut tracker = RgHazardTracker::new();
        let mut constants = NrcConstants::default();

        let mut cmd = device.create_command_list("frame");
        cmd.open();
        assert!(nrc.begin_frame(&mut device, &mut cmd, &mut tracker, layout, &snapshot, &NrcStage::frame_settings(&settings), &mut constants));
        nrc.abort_frame();
        assert_eq!(nrc.integration().state(), NrcState::EndedFrame);

        let mut cmd = device.create_command_list("frame");
        cmd.open();
        assert!(nrc.begin_frame(&mut device, &mut cmd, &mut tracker, layout, &snapshot, &NrcStage::frame_settings(&settings), &mut constants));
        cmd.close();
        nrc.end_frame(Some(GfxNativeHandle(1)));
        assert!(nrc.is_enabled());
        assert_eq!(probe.lock().unwrap().begin_frames, 2);
        assert_eq!(probe.lock().unwrap().end_frames, 1);
    }

    #[test]
    fn test_failure_disables_for_session() {
        tracy_client::Client::start();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let (mut nrc, probe, layout) = stage(&mut device);
        probe.lock().unwrap().fail_on.push(NrcOp::BeginFrame);
        let settings = PathtracerSettings::default();
        let snapshot = NrcStage::context_settings(&settings, bounds(), 64, 32);
        let mut tracker = RgHazardTracker::new();
        let mut constants = NrcConstants::default();

        let mut cmd = device.create_command_list("frame");
        cmd.open();
        assert!(!nrc.begin_frame(&mut device, &mut cmd, &mut tracker, layout, &snapshot, &NrcStage::frame_settings(&settings), &mut constants));
        cmd.close();
        assert!(!nrc.is_enabled());

        nrc.release_if_disabled(&mut device, &mut tracker);
        nrc.release_if_disabled(&mut device, &mut tracker);
        assert_eq!(probe.lock().unwrap().shutdown_calls, 1);
        assert_eq!(nrc.binding_set(), None);

        probe.lock().unwrap().fail_on.clear();
        cmd.open();
        assert!(!nrc.begin_frame(&mut device, &mut cmd, &mut tracker, layout, &snapshot, &NrcStage::frame_settings(&settings), &mut constants));
        cmd.close();
        assert_eq!(probe.lock().unwrap().initialize_calls, 1);
    }
}
