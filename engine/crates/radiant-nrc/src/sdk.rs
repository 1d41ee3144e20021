//! NRC SDK 的边界
//!
//! SDK 本身是厂商提供的二进制库，这里只描述集成层需要的调用面。

use std::fmt;
use std::sync::Arc;

use radiant_gfx::device::{GfxNativeHandle, GraphicsApi};
use radiant_render_interface::constants::NrcConstants;

use crate::settings::{ContextSettings, FrameSettings};

/// SDK 调用的返回状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NrcStatus {
    Ok,
    SdkVersionMismatch,
    AlreadyInitialized,
    InternalError,
    OutOfMemory,
    InvalidArgument,
}
impl NrcStatus {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == NrcStatus::Ok
    }
}

/// 集成层调用的 SDK 入口，用于错误信息
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NrcOp {
    Initialize,
    CreateContext,
    Configure,
    BeginFrame,
    QueryAndTrain,
    Resolve,
    EndFrame,
}
impl fmt::Display for NrcOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NrcOp::Initialize => "Initialize",
            NrcOp::CreateContext => "Context::Create",
            NrcOp::Configure => "Context::Configure",
            NrcOp::BeginFrame => "Context::BeginFrame",
            NrcOp::QueryAndTrain => "Context::QueryAndTrain",
            NrcOp::Resolve => "Context::Resolve",
            NrcOp::EndFrame => "Context::EndFrame",
        };
        f.write_str(name)
    }
}

/// NRC 使用的 6 个 GPU buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferIdx {
    QueryPathInfo = 0,
    TrainingPathInfo = 1,
    TrainingPathVertices = 2,
    QueryRadianceParams = 3,
    Counter = 4,
    DebugTrainingPathInfo = 5,
}
impl BufferIdx {
    pub const COUNT: usize = 6;
    pub const ALL: [BufferIdx; Self::COUNT] = [
        BufferIdx::QueryPathInfo,
        BufferIdx::TrainingPathInfo,
        BufferIdx::TrainingPathVertices,
        BufferIdx::QueryRadianceParams,
        BufferIdx::Counter,
        BufferIdx::DebugTrainingPathInfo,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn debug_name(self) -> &'static str {
        match self {
            BufferIdx::QueryPathInfo => "NRC QueryPathInfo",
            BufferIdx::TrainingPathInfo => "NRC TrainingPathInfo",
            BufferIdx::TrainingPathVertices => "NRC TrainingPathVertices",
            BufferIdx::QueryRadianceParams => "NRC QueryRadianceParams",
            BufferIdx::Counter => "NRC Counter",
            BufferIdx::DebugTrainingPathInfo => "NRC DebugTrainingPathInfo",
        }
    }
}

/// 单个 buffer 的分配需求
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationInfo {
    pub element_count: u64,
    pub element_size: u32,
    pub allow_uav: bool,
}

pub type BuffersAllocationInfo = [AllocationInfo; BufferIdx::COUNT];

/// 交给 SDK（调用者分配模式）或由 SDK 返回（SDK 分配模式）的原生 buffer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeBufferInfo {
    pub resource: Option<GfxNativeHandle>,
    pub allocated_size: u64,
    pub allocated_offset: u64,
    /// 只有 Vulkan 需要
    pub device_address: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeBuffers(pub [NativeBufferInfo; BufferIdx::COUNT]);
impl NativeBuffers {
    #[inline]
    pub fn get(&self, idx: BufferIdx) -> &NativeBufferInfo {
        &self.0[idx.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, idx: BufferIdx) -> &mut NativeBufferInfo {
        &mut self.0[idx.index()]
    }

    pub fn total_allocated_size(&self) -> u64 {
        self.0.iter().map(|info| info.allocated_size).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryEventType {
    Allocation,
    Deallocation,
    MemoryStats,
}

/// SDK 可能从内部线程调用回调
pub type LoggerFn = Arc<dyn Fn(&str, LogLevel) + Send + Sync>;
pub type MemoryEventsFn = Arc<dyn Fn(MemoryEventType, usize, &str) + Send + Sync>;
pub type AllocatorFn = fn(usize) -> *mut u8;
/// # Safety
/// 指针必须来自配对的 [`AllocatorFn`]，大小与分配时一致
pub type DeallocatorFn = unsafe fn(*mut u8, usize);

/// SDK 的全局初始化参数
#[derive(Clone, Default)]
pub struct GlobalSettings {
    pub logger: Option<LoggerFn>,
    pub memory_logger: Option<MemoryEventsFn>,
    pub allocator: Option<(AllocatorFn, DeallocatorFn)>,
    /// true 时由 SDK 分配 GPU buffer
    pub enable_gpu_memory_allocation: bool,
    pub enable_debug_buffers: bool,
}
impl fmt::Debug for GlobalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalSettings")
            .field("logger", &self.logger.is_some())
            .field("memory_logger", &self.memory_logger.is_some())
            .field("allocator", &self.allocator.is_some())
            .field("enable_gpu_memory_allocation", &self.enable_gpu_memory_allocation)
            .field("enable_debug_buffers", &self.enable_debug_buffers)
            .finish()
    }
}

/// NRC SDK 的调用面
///
/// 同一时刻只由一个集成对象持有。
pub trait NrcSdk: Send {
    fn initialize(&mut self, api: GraphicsApi, settings: GlobalSettings) -> NrcStatus;
    fn shutdown(&mut self);

    fn create_context(&mut self, native_device: GfxNativeHandle) -> NrcStatus;
    fn destroy_context(&mut self);

    fn buffers_allocation_info(&self, settings: &ContextSettings) -> BuffersAllocationInfo;
    /// `buffers` 为 `None` 表示由 SDK 自己分配
    fn configure(&mut self, settings: &ContextSettings, buffers: Option<&NativeBuffers>) -> NrcStatus;
    /// 最近一次成功配置后的 buffer
    fn buffers(&self) -> &NativeBuffers;

    fn begin_frame(&mut self, cmd: GfxNativeHandle, frame: &FrameSettings) -> NrcStatus;
    fn query_and_train(&mut self, cmd: GfxNativeHandle, training_loss: Option<&mut f32>) -> NrcStatus;
    fn resolve(&mut self, cmd: GfxNativeHandle, output: GfxNativeHandle) -> NrcStatus;
    fn end_frame(&mut self, queue: GfxNativeHandle) -> NrcStatus;

    fn populate_shader_constants(&self, constants: &mut NrcConstants);
}
