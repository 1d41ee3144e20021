//! 资源状态定义
//!
//! 封装 pipeline stage、access mask 和 image layout，
//! 并提供从访问意图（stage + 读写方式）推导状态的方法。

use ash::vk;

use crate::access::{RgAccess, RgStage};

const STORAGE_READ_WRITE: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
);

/// 图像资源状态
///
/// 描述图像在某个 dispatch 中的使用方式，用于自动计算 barrier。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgImageState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl Default for RgImageState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgImageState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }

    /// 未定义状态（刚创建或不关心内容）
    pub const UNDEFINED: Self =
        Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);

    /// 存储图像读写（光追着色器）
    pub const STORAGE_READ_WRITE_RAY_TRACING: Self =
        Self::new(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR, STORAGE_READ_WRITE, vk::ImageLayout::GENERAL);

    /// 存储图像读写（计算着色器）
    pub const STORAGE_READ_WRITE_COMPUTE: Self =
        Self::new(vk::PipelineStageFlags2::COMPUTE_SHADER, STORAGE_READ_WRITE, vk::ImageLayout::GENERAL);

    /// 传输目标（clear）
    pub const TRANSFER_DST: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    /// 由访问意图推导状态
    ///
    /// shader 阶段一律按 storage image（GENERAL layout）处理，
    /// transfer 阶段只支持写入（clear）。
    pub fn from_intent(stage: RgStage, access: RgAccess) -> Self {
        match stage {
            RgStage::Transfer => Self::TRANSFER_DST,
            _ => Self::new(stage.pipeline_stage(), access.storage_access(), vk::ImageLayout::GENERAL),
        }
    }

    // ============ 辅助方法 ============

    /// 写操作的 access flags
    const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
    );

    #[inline]
    pub fn is_write(&self) -> bool {
        self.access.intersects(Self::WRITE_ACCESS)
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        !self.is_write()
    }

    /// 获取用于 barrier src 的 access（去掉读操作）
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access
            & !(vk::AccessFlags2::SHADER_SAMPLED_READ
                | vk::AccessFlags2::SHADER_STORAGE_READ
                | vk::AccessFlags2::TRANSFER_READ
                | vk::AccessFlags2::MEMORY_READ)
    }
}

/// 缓冲区资源状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgBufferState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl Default for RgBufferState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgBufferState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self { stage, access }
    }

    pub const UNDEFINED: Self = Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);

    /// 存储缓冲区读写（光追着色器）
    pub const STORAGE_READ_WRITE_RAY_TRACING: Self =
        Self::new(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR, STORAGE_READ_WRITE);

    /// 存储缓冲区读写（计算着色器）
    pub const STORAGE_READ_WRITE_COMPUTE: Self = Self::new(vk::PipelineStageFlags2::COMPUTE_SHADER, STORAGE_READ_WRITE);

    /// 传输目标（clear / write）
    pub const TRANSFER_DST: Self = Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);

    pub fn from_intent(stage: RgStage, access: RgAccess) -> Self {
        match stage {
            RgStage::Transfer => Self::TRANSFER_DST,
            _ => Self::new(stage.pipeline_stage(), access.storage_access()),
        }
    }

    const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
    );

    #[inline]
    pub fn is_write(&self) -> bool {
        self.access.intersects(Self::WRITE_ACCESS)
    }

    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access & !(vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::TRANSFER_READ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_intent() {
        assert_eq!(
            RgImageState::from_intent(RgStage::RayTracing, RgAccess::ReadWrite),
            RgImageState::STORAGE_READ_WRITE_RAY_TRACING
        );
        assert_eq!(
            RgBufferState::from_intent(RgStage::Compute, RgAccess::ReadWrite),
            RgBufferState::STORAGE_READ_WRITE_COMPUTE
        );
        assert_eq!(RgImageState::from_intent(RgStage::Transfer, RgAccess::WriteOnly), RgImageState::TRANSFER_DST);

        let read = RgImageState::from_intent(RgStage::Fragment, RgAccess::ReadOnly);
        assert!(read.is_read_only());
        assert_eq!(read.layout, vk::ImageLayout::GENERAL);
    }
}
