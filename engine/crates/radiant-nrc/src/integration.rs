//! NRC 集成的公共部分
//!
//! 状态机与 buffer 管理由 [`NrcContext`] 实现，两种图形 API 的差异
//! （设备检查、原生 buffer 的描述方式）通过 [`NrcBackend`] 注入。

use std::marker::PhantomData;
use std::sync::Arc;

use radiant_gfx::commands::GfxCommandList;
use radiant_gfx::device::{GfxDevice, GfxNativeHandle, GraphicsApi};
use radiant_gfx::handles::{GfxBufferHandle, GfxTextureHandle};
use radiant_gfx::resources::GfxBufferDesc;
use radiant_render_interface::constants::NrcConstants;

use crate::buffers::{self, NrcBufferHandles};
use crate::callbacks;
use crate::d3d12::D3d12Backend;
use crate::error::NrcError;
use crate::sdk::{AllocatorFn, DeallocatorFn, GlobalSettings, NativeBufferInfo, NativeBuffers, NrcOp, NrcSdk};
use crate::settings::{ContextSettings, FrameSettings};
use crate::vulkan::VulkanBackend;

/// 默认由 SDK 分配 GPU buffer
pub const ENABLE_SDK_MEMORY_ALLOCATION: bool = true;
pub const USE_CUSTOM_CPU_ALLOCATOR: bool = false;
pub const ENABLE_DEBUG_BUFFERS: bool = true;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NrcState {
    Uninitialized,
    Initialized,
    Configured,
    BegunFrame,
    Resolved,
    EndedFrame,
}

/// 帧编排使用的 NRC 接口
///
/// 每帧的调用顺序：`begin_frame` -> `query_and_train` -> `resolve`（可选）-> `end_frame`。
/// command list 没有原生句柄时，每帧的调用都不做任何事。
pub trait NrcIntegration {
    fn graphics_api(&self) -> GraphicsApi;

    fn initialize(&mut self, device: &mut dyn GfxDevice) -> Result<(), NrcError>;
    fn shutdown(&mut self, device: &mut dyn GfxDevice);

    /// 按新的设置重新配置 context，旧的 buffer 在调用开始时就失效
    fn configure(&mut self, device: &mut dyn GfxDevice, settings: &ContextSettings) -> Result<(), NrcError>;

    fn begin_frame(&mut self, cmd: &mut GfxCommandList, frame: &FrameSettings) -> Result<(), NrcError>;
    /// 返回训练 loss；没有请求或没有执行时为 0
    fn query_and_train(&mut self, cmd: &mut GfxCommandList, calculate_training_loss: bool) -> Result<f32, NrcError>;
    fn resolve(
        &mut self,
        device: &dyn GfxDevice,
        cmd: &mut GfxCommandList,
        output: GfxTextureHandle,
    ) -> Result<(), NrcError>;
    fn end_frame(&mut self, queue: Option<GfxNativeHandle>) -> Result<(), NrcError>;
    /// 本帧的命令没有提交：状态退回 `EndedFrame`，下一帧可以重新 `begin_frame`
    fn abort_frame(&mut self);

    fn populate_shader_constants(&self, constants: &mut NrcConstants);

    fn state(&self) -> NrcState;
    fn is_initialized(&self) -> bool {
        self.state() != NrcState::Uninitialized
    }
    /// 最近一次成功应用的设置
    fn context_settings(&self) -> Option<&ContextSettings>;
    fn buffers(&self) -> &NrcBufferHandles;
    fn current_memory_consumption(&self) -> u64;
}

/// 不同图形 API 的差异点
pub trait NrcBackend {
    const API: GraphicsApi;

    /// 检查设备是否满足要求，返回交给 SDK 的原生设备
    fn native_device(device: &dyn GfxDevice) -> Result<GfxNativeHandle, NrcError>;

    /// 调用者分配模式下，调整 buffer 描述
    fn adjust_buffer_desc(desc: GfxBufferDesc) -> GfxBufferDesc {
        desc
    }

    /// 调用者分配模式下，描述交给 SDK 的 buffer
    fn native_buffer_info(device: &dyn GfxDevice, buffer: GfxBufferHandle) -> NativeBufferInfo;
}

/// 根据图形 API 选择后端，启动时调用一次
pub fn create_nrc_integration(api: GraphicsApi, sdk: Box<dyn NrcSdk>) -> Box<dyn NrcIntegration> {
    match api {
        GraphicsApi::Vulkan => Box::new(NrcContext::<VulkanBackend>::new(sdk)),
        GraphicsApi::D3d12 => Box::new(NrcContext::<D3d12Backend>::new(sdk)),
    }
}

pub struct NrcContext<B: NrcBackend> {
    sdk: Box<dyn NrcSdk>,
    state: NrcState,
    sdk_memory_allocation: bool,

    buffers: NrcBufferHandles,
    settings: Option<ContextSettings>,

    _backend: PhantomData<B>,
}
// new & init
impl<B: NrcBackend> NrcContext<B> {
    pub fn new(sdk: Box<dyn NrcSdk>) -> Self {
        Self {
            sdk,
            state: NrcState::Uninitialized,
            sdk_memory_allocation: ENABLE_SDK_MEMORY_ALLOCATION,
            buffers: NrcBufferHandles::default(),
            settings: None,
            _backend: PhantomData,
        }
    }

    /// 由集成层创建 buffer 并交给 SDK
    pub fn with_caller_owned_memory(mut self) -> Self {
        self.sdk_memory_allocation = false;
        self
    }

    fn global_settings(&self) -> GlobalSettings {
        GlobalSettings {
            logger: Some(Arc::new(callbacks::logger_callback)),
            memory_logger: Some(Arc::new(callbacks::memory_events_callback)),
            allocator: USE_CUSTOM_CPU_ALLOCATOR
                .then_some((callbacks::custom_allocate as AllocatorFn, callbacks::custom_deallocate as DeallocatorFn)),
            enable_gpu_memory_allocation: self.sdk_memory_allocation,
            enable_debug_buffers: ENABLE_DEBUG_BUFFERS,
        }
    }
}
// tools
impl<B: NrcBackend> NrcContext<B> {
    fn expect_state(&self, op: NrcOp, allowed: &[NrcState]) -> Result<(), NrcError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(NrcError::InvalidState { op, state: self.state })
        }
    }

    fn configure_sdk_owned(
        &mut self,
        device: &mut dyn GfxDevice,
        settings: &ContextSettings,
    ) -> Result<NrcBufferHandles, NrcError> {
        NrcError::check(NrcOp::Configure, self.sdk.configure(settings, None))?;

        let allocation_info = self.sdk.buffers_allocation_info(settings);
        buffers::import_native_buffers(device, &allocation_info, self.sdk.buffers())
            .map_err(|err| NrcError::gfx("wrap NRC buffers", err))
    }

    fn configure_caller_owned(
        &mut self,
        device: &mut dyn GfxDevice,
        settings: &ContextSettings,
    ) -> Result<NrcBufferHandles, NrcError> {
        let allocation_info = self.sdk.buffers_allocation_info(settings);
        let descs = buffers::fill_buffer_descs(&allocation_info).map(|desc| desc.map(B::adjust_buffer_desc));
        let mut handles =
            buffers::create_resources(device, &descs).map_err(|err| NrcError::gfx("create NRC buffers", err))?;

        let mut native = NativeBuffers::default();
        for (idx, handle) in handles.iter() {
            *native.get_mut(idx) = B::native_buffer_info(device, handle);
        }

        if let Err(err) = NrcError::check(NrcOp::Configure, self.sdk.configure(settings, Some(&native))) {
            handles.release(device);
            return Err(err);
        }
        Ok(handles)
    }
}
impl<B: NrcBackend> NrcIntegration for NrcContext<B> {
    fn graphics_api(&self) -> GraphicsApi {
        B::API
    }

    fn initialize(&mut self, device: &mut dyn GfxDevice) -> Result<(), NrcError> {
        self.expect_state(NrcOp::Initialize, &[NrcState::Uninitialized])?;
        let native_device = B::native_device(device)?;

        NrcError::check(NrcOp::Initialize, self.sdk.initialize(B::API, self.global_settings()))?;
        if let Err(err) = NrcError::check(NrcOp::CreateContext, self.sdk.create_context(native_device)) {
            self.sdk.shutdown();
            return Err(err);
        }

        self.state = NrcState::Initialized;
        log::info!(
            "NRC initialized ({:?}, {} memory)",
            B::API,
            if self.sdk_memory_allocation { "SDK-owned" } else { "caller-owned" }
        );
        Ok(())
    }

    fn shutdown(&mut self, device: &mut dyn GfxDevice) {
        if self.state == NrcState::Uninitialized {
            return;
        }
        self.buffers.release(device);
        self.settings = None;
        self.sdk.destroy_context();
        self.sdk.shutdown();
        self.state = NrcState::Uninitialized;
        log::info!("NRC shut down");
    }

    fn configure(&mut self, device: &mut dyn GfxDevice, settings: &ContextSettings) -> Result<(), NrcError> {
        self.expect_state(
            NrcOp::Configure,
            &[NrcState::Initialized, NrcState::Configured, NrcState::EndedFrame],
        )?;

        self.buffers.release(device);
        self.settings = None;
        self.state = NrcState::Initialized;

        let handles = if self.sdk_memory_allocation {
            self.configure_sdk_owned(device, settings)?
        } else {
            self.configure_caller_owned(device, settings)?
        };

        self.buffers = handles;
        self.settings = Some(settings.clone());
        self.state = NrcState::Configured;
        log::info!(
            "NRC configured: frame {}x{}, training {}x{}, {} bytes",
            settings.frame_dimensions[0],
            settings.frame_dimensions[1],
            settings.training_dimensions[0],
            settings.training_dimensions[1],
            self.current_memory_consumption()
        );
        Ok(())
    }

    fn begin_frame(&mut self, cmd: &mut GfxCommandList, frame: &FrameSettings) -> Result<(), NrcError> {
        let Some(native_cmd) = cmd.native_handle() else {
            return Ok(());
        };
        self.expect_state(NrcOp::BeginFrame, &[NrcState::Configured, NrcState::EndedFrame])?;

        NrcError::check(NrcOp::BeginFrame, self.sdk.begin_frame(native_cmd, frame))?;
        cmd.record_external("NRC BeginFrame");
        self.state = NrcState::BegunFrame;
        Ok(())
    }

    fn query_and_train(&mut self, cmd: &mut GfxCommandList, calculate_training_loss: bool) -> Result<f32, NrcError> {
        let Some(native_cmd) = cmd.native_handle() else {
            return Ok(0.0);
        };
        self.expect_state(NrcOp::QueryAndTrain, &[NrcState::BegunFrame])?;

        let mut loss = 0.0;
        let status = self.sdk.query_and_train(native_cmd, calculate_training_loss.then_some(&mut loss));
        NrcError::check(NrcOp::QueryAndTrain, status)?;
        cmd.record_external("NRC QueryAndTrain");
        Ok(loss)
    }

    fn resolve(
        &mut self,
        device: &dyn GfxDevice,
        cmd: &mut GfxCommandList,
        output: GfxTextureHandle,
    ) -> Result<(), NrcError> {
        let Some(native_cmd) = cmd.native_handle() else {
            return Ok(());
        };
        self.expect_state(NrcOp::Resolve, &[NrcState::BegunFrame])?;

        let native_output = device.native_texture(output).ok_or_else(|| NrcError::Gfx {
            what: "resolve".to_string(),
            message: "output texture has no native resource".to_string(),
        })?;
        NrcError::check(NrcOp::Resolve, self.sdk.resolve(native_cmd, native_output))?;
        cmd.record_external("NRC Resolve");
        self.state = NrcState::Resolved;
        Ok(())
    }

    fn end_frame(&mut self, queue: Option<GfxNativeHandle>) -> Result<(), NrcError> {
        let Some(queue) = queue else {
            return Ok(());
        };
        self.expect_state(NrcOp::EndFrame, &[NrcState::BegunFrame, NrcState::Resolved])?;

        NrcError::check(NrcOp::EndFrame, self.sdk.end_frame(queue))?;
        self.state = NrcState::EndedFrame;
        Ok(())
    }

    fn abort_frame(&mut self) {
        if matches!(self.state, NrcState::BegunFrame | NrcState::Resolved) {
            log::warn!("NRC frame abandoned before submission");
            self.state = NrcState::EndedFrame;
        }
    }

    fn populate_shader_constants(&self, constants: &mut NrcConstants) {
        if self.settings.is_some() {
            self.sdk.populate_shader_constants(constants);
        } else {
            *constants = NrcConstants::default();
        }
    }

    fn state(&self) -> NrcState {
        self.state
    }

    fn context_settings(&self) -> Option<&ContextSettings> {
        self.settings.as_ref()
    }

    fn buffers(&self) -> &NrcBufferHandles {
        &self.buffers
    }

    fn current_memory_consumption(&self) -> u64 {
        if self.settings.is_none() {
            return 0;
        }
        self.sdk.buffers().total_allocated_size()
    }
}

#[cfg(test)]
mod tests {
    use radiant_gfx::device::{GfxQueue, GraphicsApi};
    use radiant_gfx::headless::HeadlessDevice;
    use radiant_gfx::resources::GfxTextureDesc;

    use super::*;
    use crate::headless::HeadlessNrcSdk;
    use crate::sdk::NrcStatus;
    use crate::settings::compute_ideal_training_dimensions;
    use crate::vulkan::REQUIRED_VULKAN_EXTENSIONS;

    fn context_settings(width: u32, height: u32) -> ContextSettings {
        ContextSettings {
            learn_irradiance: true,
            include_direct_lighting: true,
            frame_dimensions: [width, height],
            training_dimensions: compute_ideal_training_dimensions([width, height]),
            max_path_vertices: 8,
            samples_per_pixel: 1,
            scene_bounds_min: [-10.0; 3],
            scene_bounds_max: [10.0; 3],
        }
    }

    fn run_frame(
        nrc: &mut dyn NrcIntegration,
        device: &mut HeadlessDevice,
        output: GfxTextureHandle,
        resolve: bool,
    ) -> Result<(), NrcError> {
        let mut cmd = device.create_command_list("nrc");
        cmd.open();
        nrc.begin_frame(&mut cmd, &FrameSettings::default())?;
        nrc.query_and_train(&mut cmd, false)?;
        if resolve {
            nrc.resolve(&*device, &mut cmd, output)?;
        }
        cmd.close();
        nrc.end_frame(device.native_queue(GfxQueue::Graphics))
    }

    #[test]
    fn test_sdk_owned_lifecycle() {
        let sdk = HeadlessNrcSdk::new();
        let probe = sdk.probe();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let output = device
            .create_texture(&GfxTextureDesc::new_2d_uav(64, 32, ash::vk::Format::R32G32B32A32_SFLOAT, "out"))
            .unwrap();

        let mut nrc = create_nrc_integration(GraphicsApi::D3d12, Box::new(sdk));
        assert_eq!(nrc.graphics_api(), GraphicsApi::D3d12);
        nrc.initialize(&mut device).unwrap();
        nrc.configure(&mut device, &context_settings(64, 32)).unwrap();
        assert_eq!(nrc.state(), NrcState::Configured);
        assert!(!nrc.buffers().is_empty());
        assert!(nrc.current_memory_consumption() > 0);

        run_frame(nrc.as_mut(), &mut device, output, true).unwrap();
        assert_eq!(nrc.state(), NrcState::EndedFrame);
        run_frame(nrc.as_mut(), &mut device, output, false).unwrap();

        let mut constants = NrcConstants::default();
        nrc.populate_shader_constants(&mut constants);
        assert_eq!(constants.active, 1);
        assert_eq!(constants.frame_dimensions, [64, 32]);

        nrc.shutdown(&mut device);
        assert_eq!(nrc.state(), NrcState::Uninitialized);
        assert_eq!(device.live_buffers(), 0);

        let probe = probe.lock().unwrap();
        assert_eq!(probe.begin_frames, 2);
        assert_eq!(probe.resolve_calls, 1);
        assert_eq!(probe.end_frames, 2);
        assert_eq!(probe.shutdown_calls, 1);
        assert!(probe.caller_buffers.is_none());
    }

    #[test]
    fn test_reconfigure_replaces_buffers() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut nrc = NrcContext::<D3d12Backend>::new(Box::new(HeadlessNrcSdk::new()));
        nrc.initialize(&mut device).unwrap();

        nrc.configure(&mut device, &context_settings(64, 32)).unwrap();
        let first = *nrc.buffers();
        let live = device.live_buffers();

        nrc.configure(&mut device, &context_settings(128, 64)).unwrap();
        assert_ne!(first, *nrc.buffers());
        assert_eq!(device.live_buffers(), live);
        assert_eq!(nrc.context_settings().unwrap().frame_dimensions, [128, 64]);
    }

    #[test]
    fn test_failed_configure_leaves_no_buffers() {
        let sdk = HeadlessNrcSdk::new();
        let control = sdk.probe();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut nrc = NrcContext::<D3d12Backend>::new(Box::new(sdk));
        nrc.initialize(&mut device).unwrap();
        nrc.configure(&mut device, &context_settings(64, 32)).unwrap();

        control.lock().unwrap().fail_on.push(NrcOp::Configure);
        let err = nrc.configure(&mut device, &context_settings(128, 64)).unwrap_err();
        assert!(matches!(
            err,
            NrcError::Sdk {
                op: NrcOp::Configure,
                status: NrcStatus::InternalError
            }
        ));
        assert!(nrc.buffers().is_empty());
        assert!(nrc.context_settings().is_none());
        assert_eq!(nrc.current_memory_consumption(), 0);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_caller_owned_vulkan_passes_device_address() {
        let sdk = HeadlessNrcSdk::new();
        let probe = sdk.probe();
        let mut device = HeadlessDevice::new(GraphicsApi::Vulkan).with_extensions(REQUIRED_VULKAN_EXTENSIONS);
        let mut nrc = NrcContext::<VulkanBackend>::new(Box::new(sdk)).with_caller_owned_memory();

        nrc.initialize(&mut device).unwrap();
        nrc.configure(&mut device, &context_settings(64, 32)).unwrap();

        let probe = probe.lock().unwrap();
        let passed = probe.caller_buffers.expect("buffers handed to the SDK");
        for (idx, handle) in nrc.buffers().iter() {
            let info = passed.get(idx);
            assert_eq!(info.resource, device.native_buffer(handle));
            assert_eq!(info.allocated_offset, 0);
            assert_ne!(info.device_address, 0);
            assert!(device.buffer_desc(handle).unwrap().needs_device_address);
        }
        assert_eq!(nrc.current_memory_consumption(), passed.total_allocated_size());
    }

    #[test]
    fn test_vulkan_requires_extensions() {
        let mut device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let mut nrc = create_nrc_integration(GraphicsApi::Vulkan, Box::new(HeadlessNrcSdk::new()));
        assert!(matches!(nrc.initialize(&mut device), Err(NrcError::MissingExtension(_))));
        assert!(!nrc.is_initialized());
    }

    #[test]
    fn test_missing_native_device() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12).without_native_handles();
        let mut nrc = create_nrc_integration(GraphicsApi::D3d12, Box::new(HeadlessNrcSdk::new()));
        assert!(matches!(nrc.initialize(&mut device), Err(NrcError::MissingNativeDevice)));
    }

    #[test]
    fn test_per_frame_calls_without_native_handles_are_noops() {
        let sdk = HeadlessNrcSdk::new();
        let probe = sdk.probe();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let output = device
            .create_texture(&GfxTextureDesc::new_2d_uav(8, 8, ash::vk::Format::R32G32B32A32_SFLOAT, "out"))
            .unwrap();
        let mut nrc = NrcContext::<D3d12Backend>::new(Box::new(sdk));
        nrc.initialize(&mut device).unwrap();
        nrc.configure(&mut device, &context_settings(8, 8)).unwrap();

        let mut cmd = GfxCommandList::new("no native", None);
        cmd.open();
        nrc.begin_frame(&mut cmd, &FrameSettings::default()).unwrap();
        assert_eq!(nrc.query_and_train(&mut cmd, true).unwrap(), 0.0);
        nrc.resolve(&device, &mut cmd, output).unwrap();
        nrc.end_frame(None).unwrap();

        assert!(cmd.commands().is_empty());
        assert_eq!(nrc.state(), NrcState::Configured);
        let probe = probe.lock().unwrap();
        assert_eq!(probe.begin_frames + probe.query_and_train_calls + probe.resolve_calls, 0);
    }

    #[test]
    fn test_abandoned_frame_can_begin_again() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut nrc = NrcContext::<D3d12Backend>::new(Box::new(HeadlessNrcSdk::new()));
        nrc.initialize(&mut device).unwrap();
        nrc.configure(&mut device, &context_settings(16, 16)).unwrap();

        // 还没开始的帧不受影响
        nrc.abort_frame();
        assert_eq!(nrc.state(), NrcState::Configured);

        let mut cmd = device.create_command_list("nrc");
        cmd.open();
        nrc.begin_frame(&mut cmd, &FrameSettings::default()).unwrap();
        nrc.query_and_train(&mut cmd, false).unwrap();
        nrc.abort_frame();
        assert_eq!(nrc.state(), NrcState::EndedFrame);

        nrc.begin_frame(&mut cmd, &FrameSettings::default()).unwrap();
        assert_eq!(nrc.state(), NrcState::BegunFrame);
    }

    #[test]
    fn test_per_frame_failure_is_typed() {
        let sdk = HeadlessNrcSdk::new();
        let control = sdk.probe();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut nrc = NrcContext::<D3d12Backend>::new(Box::new(sdk));
        nrc.initialize(&mut device).unwrap();
        nrc.configure(&mut device, &context_settings(16, 16)).unwrap();
        control.lock().unwrap().fail_on.push(NrcOp::QueryAndTrain);

        let mut cmd = device.create_command_list("nrc");
        cmd.open();
        nrc.begin_frame(&mut cmd, &FrameSettings::default()).unwrap();
        let err = nrc.query_and_train(&mut cmd, true).unwrap_err();
        assert!(matches!(err, NrcError::Sdk { op: NrcOp::QueryAndTrain, .. }));
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut nrc = NrcContext::<D3d12Backend>::new(Box::new(HeadlessNrcSdk::new()));
        nrc.initialize(&mut device).unwrap();

        let mut cmd = device.create_command_list("nrc");
        cmd.open();
        let err = nrc.begin_frame(&mut cmd, &FrameSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            NrcError::InvalidState {
                op: NrcOp::BeginFrame,
                state: NrcState::Initialized
            }
        ));
        assert!(matches!(nrc.initialize(&mut device), Err(NrcError::InvalidState { .. })));
    }

    #[test]
    fn test_training_loss_reported_when_requested() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut nrc = NrcContext::<D3d12Backend>::new(Box::new(HeadlessNrcSdk::new()));
        nrc.initialize(&mut device).unwrap();
        nrc.configure(&mut device, &context_settings(16, 16)).unwrap();

        let mut cmd = device.create_command_list("nrc");
        cmd.open();
        nrc.begin_frame(&mut cmd, &FrameSettings::default()).unwrap();
        assert!(nrc.query_and_train(&mut cmd, true).unwrap() > 0.0);
        assert_eq!(nrc.query_and_train(&mut cmd, false).unwrap(), 0.0);
    }
}
