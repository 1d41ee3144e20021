//! 命令流
//!
//! [`GfxCommandList`] 不直接调用图形 API，而是把命令记录为 [`GfxCommand`]，
//! 由 [`crate::device::GfxDevice::execute_command_list`] 统一提交。
//! 这样帧编排逻辑可以在没有 GPU 的环境下完整运行和测试。

use ash::vk;

use crate::accel::GfxTlasInstance;
use crate::device::GfxNativeHandle;
use crate::handles::{
    GfxAccelStructHandle, GfxBindingSetHandle, GfxBufferHandle, GfxComputePipelineHandle, GfxFramebufferHandle,
    GfxGraphicsPipelineHandle, GfxRtPipelineHandle, GfxTextureHandle,
};

/// 图像 barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageBarrier {
    pub texture: GfxTextureHandle,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}
impl GfxImageBarrier {
    pub fn new(texture: GfxTextureHandle) -> Self {
        Self {
            texture,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
        }
    }

    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.old_layout = old_layout;
        self.new_layout = new_layout;
        self
    }

    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.src_stage = stage;
        self.src_access = access;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.dst_stage = stage;
        self.dst_access = access;
        self
    }
}

/// 缓冲区 barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBufferBarrier {
    pub buffer: GfxBufferHandle,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}
impl GfxBufferBarrier {
    pub fn new(buffer: GfxBufferHandle) -> Self {
        Self {
            buffer,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
        }
    }

    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.src_stage = stage;
        self.src_access = access;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.dst_stage = stage;
        self.dst_access = access;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxRayTracingState {
    pub pipeline: GfxRtPipelineHandle,
    /// 按槽位顺序排列，长度必须与 pipeline 的 global layout 数量一致
    pub bindings: Vec<GfxBindingSetHandle>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxComputeState {
    pub pipeline: GfxComputePipelineHandle,
    pub bindings: Vec<GfxBindingSetHandle>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxGraphicsState {
    pub pipeline: GfxGraphicsPipelineHandle,
    pub framebuffer: GfxFramebufferHandle,
    pub bindings: Vec<GfxBindingSetHandle>,
    pub viewport: vk::Extent2D,
}

/// 记录下来的一条命令
#[derive(Clone, Debug, PartialEq)]
pub enum GfxCommand {
    BeginMarker(String),
    EndMarker,
    WriteBuffer {
        buffer: GfxBufferHandle,
        data: Vec<u8>,
    },
    ClearTextureFloat {
        texture: GfxTextureHandle,
        color: [f32; 4],
    },
    ClearBufferUint {
        buffer: GfxBufferHandle,
        value: u32,
    },
    ImageBarrier(GfxImageBarrier),
    BufferBarrier(GfxBufferBarrier),
    BuildBlas {
        blas: GfxAccelStructHandle,
    },
    /// 压缩所有标记了 compaction 且已经构建完成的 BLAS
    CompactBlases,
    BuildTlas {
        tlas: GfxAccelStructHandle,
        instances: Vec<GfxTlasInstance>,
    },
    DispatchRays {
        state: GfxRayTracingState,
        width: u32,
        height: u32,
    },
    Dispatch {
        state: GfxComputeState,
        groups_x: u32,
        groups_y: u32,
        groups_z: u32,
    },
    Draw {
        state: GfxGraphicsState,
        vertex_count: u32,
        instance_count: u32,
    },
    /// 外部 SDK 直接写入原生命令列表的工作
    External {
        label: String,
    },
}

pub struct GfxCommandList {
    name: String,
    /// 对应的原生命令列表；为 `None` 时 SDK 侧的调用会被跳过
    native: Option<GfxNativeHandle>,
    commands: Vec<GfxCommand>,
    is_open: bool,
    marker_depth: u32,
}
// new & init
impl GfxCommandList {
    pub fn new(name: impl Into<String>, native: Option<GfxNativeHandle>) -> Self {
        Self {
            name: name.into(),
            native,
            commands: Vec::new(),
            is_open: false,
            marker_depth: 0,
        }
    }
}
// getters
impl GfxCommandList {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[inline]
    pub fn native_handle(&self) -> Option<GfxNativeHandle> {
        self.native
    }
    #[inline]
    pub fn is_open(&self) -> bool {
        self.is_open
    }
    #[inline]
    pub fn commands(&self) -> &[GfxCommand] {
        &self.commands
    }
}
// lifecycle
impl GfxCommandList {
    pub fn open(&mut self) {
        self.commands.clear();
        self.marker_depth = 0;
        self.is_open = true;
    }

    pub fn close(&mut self) {
        debug_assert_eq!(self.marker_depth, 0, "unbalanced markers in command list '{}'", self.name);
        self.is_open = false;
    }

    #[inline]
    fn record(&mut self, command: GfxCommand) {
        debug_assert!(self.is_open, "recording into closed command list '{}'", self.name);
        self.commands.push(command);
    }
}
// 记录命令
impl GfxCommandList {
    pub fn begin_marker(&mut self, name: impl Into<String>) {
        self.marker_depth += 1;
        self.record(GfxCommand::BeginMarker(name.into()));
    }

    pub fn end_marker(&mut self) {
        self.marker_depth = self.marker_depth.saturating_sub(1);
        self.record(GfxCommand::EndMarker);
    }

    pub fn write_buffer<T: bytemuck::Pod>(&mut self, buffer: GfxBufferHandle, value: &T) {
        self.write_buffer_bytes(buffer, bytemuck::bytes_of(value));
    }

    pub fn write_buffer_bytes(&mut self, buffer: GfxBufferHandle, data: &[u8]) {
        self.record(GfxCommand::WriteBuffer {
            buffer,
            data: data.to_vec(),
        });
    }

    pub fn clear_texture_float(&mut self, texture: GfxTextureHandle, color: [f32; 4]) {
        self.record(GfxCommand::ClearTextureFloat { texture, color });
    }

    pub fn clear_buffer_uint(&mut self, buffer: GfxBufferHandle, value: u32) {
        self.record(GfxCommand::ClearBufferUint { buffer, value });
    }

    pub fn image_barrier(&mut self, barrier: GfxImageBarrier) {
        self.record(GfxCommand::ImageBarrier(barrier));
    }

    pub fn buffer_barrier(&mut self, barrier: GfxBufferBarrier) {
        self.record(GfxCommand::BufferBarrier(barrier));
    }

    pub fn build_blas(&mut self, blas: GfxAccelStructHandle) {
        self.record(GfxCommand::BuildBlas { blas });
    }

    pub fn compact_blases(&mut self) {
        self.record(GfxCommand::CompactBlases);
    }

    pub fn build_tlas(&mut self, tlas: GfxAccelStructHandle, instances: Vec<GfxTlasInstance>) {
        self.record(GfxCommand::BuildTlas { tlas, instances });
    }

    pub fn dispatch_rays(&mut self, state: &GfxRayTracingState, width: u32, height: u32) {
        self.record(GfxCommand::DispatchRays {
            state: state.clone(),
            width,
            height,
        });
    }

    pub fn dispatch(&mut self, state: &GfxComputeState, groups_x: u32, groups_y: u32) {
        self.record(GfxCommand::Dispatch {
            state: state.clone(),
            groups_x,
            groups_y,
            groups_z: 1,
        });
    }

    pub fn draw(&mut self, state: &GfxGraphicsState, vertex_count: u32) {
        self.record(GfxCommand::Draw {
            state: state.clone(),
            vertex_count,
            instance_count: 1,
        });
    }

    pub fn record_external(&mut self, label: impl Into<String>) {
        self.record(GfxCommand::External { label: label.into() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_clears_previous_commands() {
        let mut cmd = GfxCommandList::new("test", None);
        cmd.open();
        cmd.begin_marker("frame");
        cmd.record_external("sdk");
        cmd.end_marker();
        cmd.close();
        assert_eq!(cmd.commands().len(), 3);

        cmd.open();
        assert!(cmd.commands().is_empty());
        assert!(cmd.is_open());
    }
}
