//! Barrier 自动计算
//!
//! 根据资源状态转换生成图像和缓冲区 barrier。

use radiant_gfx::commands::{GfxBufferBarrier, GfxCommandList, GfxImageBarrier};
use radiant_gfx::handles::{GfxBufferHandle, GfxTextureHandle};

use crate::resource_state::{RgBufferState, RgImageState};

/// 图像 Barrier 描述
#[derive(Clone, Debug)]
pub struct ImageBarrierDesc {
    pub image: GfxTextureHandle,
    pub src_state: RgImageState,
    pub dst_state: RgImageState,
}

impl ImageBarrierDesc {
    pub fn new(image: GfxTextureHandle, src_state: RgImageState, dst_state: RgImageState) -> Self {
        Self {
            image,
            src_state,
            dst_state,
        }
    }

    /// 检查是否需要 barrier
    pub fn needs_barrier(&self) -> bool {
        // Layout 不同一定需要 barrier
        if self.src_state.layout != self.dst_state.layout {
            return true;
        }

        // 有写操作需要 barrier（确保可见性）
        self.src_state.is_write() || self.dst_state.is_write()
    }

    pub fn to_gfx_barrier(&self) -> GfxImageBarrier {
        GfxImageBarrier::new(self.image)
            .layout_transfer(self.src_state.layout, self.dst_state.layout)
            .src_mask(self.src_state.stage, self.src_state.src_access())
            .dst_mask(self.dst_state.stage, self.dst_state.access)
    }
}

/// 缓冲区 Barrier 描述
#[derive(Clone, Debug)]
pub struct BufferBarrierDesc {
    pub buffer: GfxBufferHandle,
    pub src_state: RgBufferState,
    pub dst_state: RgBufferState,
}

impl BufferBarrierDesc {
    pub fn new(buffer: GfxBufferHandle, src_state: RgBufferState, dst_state: RgBufferState) -> Self {
        Self {
            buffer,
            src_state,
            dst_state,
        }
    }

    pub fn needs_barrier(&self) -> bool {
        self.src_state.is_write() || self.dst_state.is_write()
    }

    pub fn to_gfx_barrier(&self) -> GfxBufferBarrier {
        GfxBufferBarrier::new(self.buffer)
            .src_mask(self.src_state.stage, self.src_state.src_access())
            .dst_mask(self.dst_state.stage, self.dst_state.access)
    }
}

/// 一次 dispatch 执行前需要的 Barrier 集合
#[derive(Clone, Debug, Default)]
pub struct PassBarriers {
    pub image_barriers: Vec<ImageBarrierDesc>,
    pub buffer_barriers: Vec<BufferBarrierDesc>,
    /// 因为声明了无序关系而省略的 barrier 数量
    pub elided: usize,
}

impl PassBarriers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image_barrier(&mut self, barrier: ImageBarrierDesc) {
        if barrier.needs_barrier() {
            self.image_barriers.push(barrier);
        }
    }

    pub fn add_buffer_barrier(&mut self, barrier: BufferBarrierDesc) {
        if barrier.needs_barrier() {
            self.buffer_barriers.push(barrier);
        }
    }

    pub fn has_barriers(&self) -> bool {
        !self.image_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    pub fn barrier_count(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    /// 写入命令列表
    pub fn record(&self, cmd: &mut GfxCommandList) {
        for barrier in &self.image_barriers {
            cmd.image_barrier(barrier.to_gfx_barrier());
        }
        for barrier in &self.buffer_barriers {
            cmd.buffer_barrier(barrier.to_gfx_barrier());
        }
    }
}

/// Barrier 计算器
pub struct BarrierCalculator;

impl BarrierCalculator {
    /// 如果需要 barrier，返回 `Some(ImageBarrierDesc)`
    pub fn compute_image_barrier(
        image: GfxTextureHandle,
        current_state: RgImageState,
        required_state: RgImageState,
    ) -> Option<ImageBarrierDesc> {
        let barrier = ImageBarrierDesc::new(image, current_state, required_state);
        if barrier.needs_barrier() { Some(barrier) } else { None }
    }

    pub fn compute_buffer_barrier(
        buffer: GfxBufferHandle,
        current_state: RgBufferState,
        required_state: RgBufferState,
    ) -> Option<BufferBarrierDesc> {
        let barrier = BufferBarrierDesc::new(buffer, current_state, required_state);
        if barrier.needs_barrier() { Some(barrier) } else { None }
    }
}
