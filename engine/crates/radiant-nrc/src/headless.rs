//! 用于测试和离屏演示的 NRC SDK
//!
//! buffer 需求按 NRC 的实际形状计算，SDK 分配模式下用递增的假地址模拟原生 buffer。
//! 调用计数和失败注入都通过共享的 [`HeadlessNrcProbe`] 完成。

use std::sync::{Arc, Mutex, MutexGuard};

use radiant_gfx::device::{GfxNativeHandle, GraphicsApi};
use radiant_render_interface::constants::NrcConstants;

use crate::sdk::{
    AllocationInfo, BufferIdx, BuffersAllocationInfo, GlobalSettings, LogLevel, MemoryEventType, NativeBufferInfo,
    NativeBuffers, NrcOp, NrcSdk, NrcStatus,
};
use crate::settings::{ContextSettings, FrameSettings};

const QUERY_PATH_INFO_SIZE: u32 = 16;
const TRAINING_PATH_INFO_SIZE: u32 = 8;
const PATH_VERTEX_SIZE: u32 = 48;
const QUERY_RADIANCE_PARAMS_SIZE: u32 = 64;
const COUNTER_COUNT: u64 = 4;
const REPORTED_TRAINING_LOSS: f32 = 0.125;

#[derive(Debug, Default)]
pub struct HeadlessNrcProbe {
    pub initialize_calls: usize,
    pub shutdown_calls: usize,
    pub create_context_calls: usize,
    pub configure_calls: usize,
    pub begin_frames: usize,
    pub query_and_train_calls: usize,
    pub resolve_calls: usize,
    pub end_frames: usize,

    pub api: Option<GraphicsApi>,
    pub configured_settings: Vec<ContextSettings>,
    pub last_frame_settings: Option<FrameSettings>,
    /// 调用者分配模式下最近一次交给 SDK 的 buffer
    pub caller_buffers: Option<NativeBuffers>,

    /// 这些入口返回 `InternalError`
    pub fail_on: Vec<NrcOp>,
}

pub struct HeadlessNrcSdk {
    probe: Arc<Mutex<HeadlessNrcProbe>>,
    global: Option<GlobalSettings>,
    context: Option<ContextSettings>,
    frame: FrameSettings,
    buffers: NativeBuffers,
    next_native: u64,
}
// new & init
impl HeadlessNrcSdk {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(Mutex::new(HeadlessNrcProbe::default())),
            global: None,
            context: None,
            frame: FrameSettings::default(),
            buffers: NativeBuffers::default(),
            next_native: 0xC0DE_0000,
        }
    }
}
impl Default for HeadlessNrcSdk {
    fn default() -> Self {
        Self::new()
    }
}
// getters
impl HeadlessNrcSdk {
    #[inline]
    pub fn probe(&self) -> Arc<Mutex<HeadlessNrcProbe>> {
        self.probe.clone()
    }
}
// tools
impl HeadlessNrcSdk {
    fn lock(&self) -> MutexGuard<'_, HeadlessNrcProbe> {
        self.probe.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 记录一次调用，返回这次调用应当给出的状态
    fn enter(&self, op: NrcOp, record: impl FnOnce(&mut HeadlessNrcProbe)) -> NrcStatus {
        let mut probe = self.lock();
        if probe.fail_on.contains(&op) {
            return NrcStatus::InternalError;
        }
        record(&mut probe);
        NrcStatus::Ok
    }

    fn log(&self, message: &str, level: LogLevel) {
        if let Some(logger) = self.global.as_ref().and_then(|g| g.logger.as_ref()) {
            logger(message, level);
        }
    }

    fn memory_event(&self, event: MemoryEventType, size: u64, name: &str) {
        if let Some(memory_logger) = self.global.as_ref().and_then(|g| g.memory_logger.as_ref()) {
            memory_logger(event, size as usize, name);
        }
    }

    fn release_sdk_buffers(&mut self) {
        if !self.global.as_ref().is_some_and(|g| g.enable_gpu_memory_allocation) {
            self.buffers = NativeBuffers::default();
            return;
        }
        let buffers = std::mem::take(&mut self.buffers);
        for idx in BufferIdx::ALL {
            let info = buffers.get(idx);
            if info.resource.is_some() {
                self.memory_event(MemoryEventType::Deallocation, info.allocated_size, idx.debug_name());
            }
        }
    }
}
impl NrcSdk for HeadlessNrcSdk {
    fn initialize(&mut self, api: GraphicsApi, settings: GlobalSettings) -> NrcStatus {
        if self.global.is_some() {
            return NrcStatus::AlreadyInitialized;
        }
        let status = self.enter(NrcOp::Initialize, |probe| {
            probe.initialize_calls += 1;
            probe.api = Some(api);
        });
        if status.is_ok() {
            self.global = Some(settings);
            self.log("headless NRC library initialized", LogLevel::Info);
        }
        status
    }

    fn shutdown(&mut self) {
        self.release_sdk_buffers();
        self.global = None;
        self.lock().shutdown_calls += 1;
    }

    fn create_context(&mut self, _native_device: GfxNativeHandle) -> NrcStatus {
        self.enter(NrcOp::CreateContext, |probe| probe.create_context_calls += 1)
    }

    fn destroy_context(&mut self) {
        self.release_sdk_buffers();
        self.context = None;
    }

    fn buffers_allocation_info(&self, settings: &ContextSettings) -> BuffersAllocationInfo {
        let [frame_w, frame_h] = settings.frame_dimensions;
        let [train_w, train_h] = settings.training_dimensions;
        let query_paths = frame_w as u64 * frame_h as u64 * settings.samples_per_pixel.max(1) as u64;
        let training_paths = train_w as u64 * train_h as u64;
        let debug_enabled = self.global.as_ref().is_some_and(|g| g.enable_debug_buffers);

        let entry = |element_count: u64, element_size: u32| AllocationInfo {
            element_count,
            element_size,
            allow_uav: true,
        };
        let mut info = [AllocationInfo::default(); BufferIdx::COUNT];
        info[BufferIdx::QueryPathInfo.index()] = entry(query_paths, QUERY_PATH_INFO_SIZE);
        info[BufferIdx::TrainingPathInfo.index()] = entry(training_paths, TRAINING_PATH_INFO_SIZE);
        info[BufferIdx::TrainingPathVertices.index()] =
            entry(training_paths * settings.max_path_vertices as u64, PATH_VERTEX_SIZE);
        info[BufferIdx::QueryRadianceParams.index()] =
            entry(query_paths + training_paths, QUERY_RADIANCE_PARAMS_SIZE);
        info[BufferIdx::Counter.index()] = entry(COUNTER_COUNT, 4);
        if debug_enabled {
            info[BufferIdx::DebugTrainingPathInfo.index()] = entry(training_paths, TRAINING_PATH_INFO_SIZE);
        }
        info
    }

    fn configure(&mut self, settings: &ContextSettings, buffers: Option<&NativeBuffers>) -> NrcStatus {
        let sdk_owned = self.global.as_ref().is_some_and(|g| g.enable_gpu_memory_allocation);
        if sdk_owned == buffers.is_some() {
            return NrcStatus::InvalidArgument;
        }
        let status = self.enter(NrcOp::Configure, |probe| {
            probe.configure_calls += 1;
            probe.configured_settings.push(settings.clone());
            probe.caller_buffers = buffers.copied();
        });
        self.release_sdk_buffers();
        self.context = None;
        if !status.is_ok() {
            return status;
        }

        match buffers {
            Some(buffers) => self.buffers = *buffers,
            None => {
                let info = self.buffers_allocation_info(settings);
                let mut allocated = NativeBuffers::default();
                for idx in BufferIdx::ALL {
                    let entry = &info[idx.index()];
                    if entry.element_count == 0 {
                        continue;
                    }
                    self.next_native += 1;
                    let size = entry.element_count * entry.element_size as u64;
                    *allocated.get_mut(idx) = NativeBufferInfo {
                        resource: Some(GfxNativeHandle(self.next_native)),
                        allocated_size: size,
                        ..Default::default()
                    };
                    self.memory_event(MemoryEventType::Allocation, size, idx.debug_name());
                }
                self.memory_event(MemoryEventType::MemoryStats, allocated.total_allocated_size(), "");
                self.buffers = allocated;
            }
        }
        self.context = Some(settings.clone());
        self.log(
            &format!(
                "context configured for {}x{}",
                settings.frame_dimensions[0], settings.frame_dimensions[1]
            ),
            LogLevel::Info,
        );
        NrcStatus::Ok
    }

    fn buffers(&self) -> &NativeBuffers {
        &self.buffers
    }

    fn begin_frame(&mut self, _cmd: GfxNativeHandle, frame: &FrameSettings) -> NrcStatus {
        let status = self.enter(NrcOp::BeginFrame, |probe| {
            probe.begin_frames += 1;
            probe.last_frame_settings = Some(frame.clone());
        });
        if status.is_ok() {
            self.frame = frame.clone();
        }
        status
    }

    fn query_and_train(&mut self, _cmd: GfxNativeHandle, training_loss: Option<&mut f32>) -> NrcStatus {
        let status = self.enter(NrcOp::QueryAndTrain, |probe| probe.query_and_train_calls += 1);
        if let (NrcStatus::Ok, Some(loss)) = (status, training_loss) {
            *loss = REPORTED_TRAINING_LOSS;
        }
        status
    }

    fn resolve(&mut self, _cmd: GfxNativeHandle, _output: GfxNativeHandle) -> NrcStatus {
        self.enter(NrcOp::Resolve, |probe| probe.resolve_calls += 1)
    }

    fn end_frame(&mut self, _queue: GfxNativeHandle) -> NrcStatus {
        self.enter(NrcOp::EndFrame, |probe| probe.end_frames += 1)
    }

    fn populate_shader_constants(&self, constants: &mut NrcConstants) {
        let Some(context) = &self.context else {
            *constants = NrcConstants::default();
            return;
        };
        *constants = NrcConstants {
            scene_bounds_min: context.scene_bounds_min,
            learn_irradiance: context.learn_irradiance as u32,
            scene_bounds_max: context.scene_bounds_max,
            include_direct_lighting: context.include_direct_lighting as u32,
            frame_dimensions: context.frame_dimensions,
            training_dimensions: context.training_dimensions,
            max_path_vertices: context.max_path_vertices,
            samples_per_pixel: context.samples_per_pixel,
            resolve_mode: self.frame.resolve_mode as u32,
            enable_termination_heuristic: (self.frame.termination_heuristic_threshold > 0.0) as u32,
            termination_heuristic_threshold: self.frame.termination_heuristic_threshold,
            training_termination_heuristic_threshold: self.frame.training_termination_heuristic_threshold,
            radiance_unpack_multiplier: self.frame.max_expected_average_radiance_value,
            active: 1,
        };
    }
}
