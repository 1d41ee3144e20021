//! 每个 dispatch 的资源访问意图

use ash::vk;
use radiant_gfx::handles::{GfxBufferHandle, GfxTextureHandle};

/// 访问方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}
impl RgAccess {
    #[inline]
    pub(crate) fn storage_access(self) -> vk::AccessFlags2 {
        match self {
            Self::ReadOnly => vk::AccessFlags2::SHADER_STORAGE_READ,
            Self::WriteOnly => vk::AccessFlags2::SHADER_STORAGE_WRITE,
            Self::ReadWrite => vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        }
    }
}

/// 访问发生的 pipeline 阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgStage {
    RayTracing,
    Compute,
    Fragment,
    Transfer,
}
impl RgStage {
    #[inline]
    pub(crate) fn pipeline_stage(self) -> vk::PipelineStageFlags2 {
        match self {
            Self::RayTracing => vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            Self::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
            Self::Fragment => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            Self::Transfer => vk::PipelineStageFlags2::TRANSFER,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResource {
    Image(GfxTextureHandle),
    Buffer(GfxBufferHandle),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgAccessIntent {
    pub resource: RgResource,
    pub stage: RgStage,
    pub access: RgAccess,
}

/// 一次 dispatch（或 clear / draw）声明的全部访问
#[derive(Clone, Debug)]
pub struct RgDispatchAccess {
    pub name: &'static str,
    pub intents: Vec<RgAccessIntent>,
    /// 与这些兄弟 dispatch 之间不需要任何顺序保证
    pub unordered_with: Vec<&'static str>,
}
// new & builder
impl RgDispatchAccess {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            intents: Vec::new(),
            unordered_with: Vec::new(),
        }
    }

    #[inline]
    fn intent(mut self, resource: RgResource, stage: RgStage, access: RgAccess) -> Self {
        self.intents.push(RgAccessIntent { resource, stage, access });
        self
    }

    pub fn read_image(self, image: GfxTextureHandle, stage: RgStage) -> Self {
        self.intent(RgResource::Image(image), stage, RgAccess::ReadOnly)
    }

    pub fn write_image(self, image: GfxTextureHandle, stage: RgStage) -> Self {
        self.intent(RgResource::Image(image), stage, RgAccess::WriteOnly)
    }

    pub fn read_write_image(self, image: GfxTextureHandle, stage: RgStage) -> Self {
        self.intent(RgResource::Image(image), stage, RgAccess::ReadWrite)
    }

    pub fn read_write_images(self, images: impl IntoIterator<Item = GfxTextureHandle>, stage: RgStage) -> Self {
        images.into_iter().fold(self, |access, image| access.read_write_image(image, stage))
    }

    pub fn read_buffer(self, buffer: GfxBufferHandle, stage: RgStage) -> Self {
        self.intent(RgResource::Buffer(buffer), stage, RgAccess::ReadOnly)
    }

    pub fn read_buffers(self, buffers: impl IntoIterator<Item = GfxBufferHandle>, stage: RgStage) -> Self {
        buffers.into_iter().fold(self, |access, buffer| access.read_buffer(buffer, stage))
    }

    pub fn write_buffer(self, buffer: GfxBufferHandle, stage: RgStage) -> Self {
        self.intent(RgResource::Buffer(buffer), stage, RgAccess::WriteOnly)
    }

    pub fn read_write_buffer(self, buffer: GfxBufferHandle, stage: RgStage) -> Self {
        self.intent(RgResource::Buffer(buffer), stage, RgAccess::ReadWrite)
    }

    pub fn read_write_buffers(self, buffers: impl IntoIterator<Item = GfxBufferHandle>, stage: RgStage) -> Self {
        buffers.into_iter().fold(self, |access, buffer| access.read_write_buffer(buffer, stage))
    }

    /// 声明与 `sibling` 之间没有真实的数据依赖
    ///
    /// 如果资源上一次写入来自 `sibling`，则不会插入 barrier。
    pub fn unordered_with(mut self, sibling: &'static str) -> Self {
        self.unordered_with.push(sibling);
        self
    }
}
