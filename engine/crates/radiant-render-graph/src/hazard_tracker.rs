//! 跨 dispatch 的资源状态跟踪
//!
//! 路径追踪的每一帧由若干个固定顺序的 dispatch 组成。每个 dispatch 通过
//! [`RgDispatchAccess`] 声明自己访问的资源，[`RgHazardTracker`] 比较资源当前状态
//! 和所需状态，生成必要的 barrier，然后把资源状态推进到新的状态。
//!
//! 两个 dispatch 之间如果声明了 `unordered_with`，后者对前者写入的资源不插入 barrier。

use std::collections::HashMap;

use radiant_gfx::commands::GfxCommandList;
use radiant_gfx::handles::{GfxBufferHandle, GfxTextureHandle};

use crate::access::{RgDispatchAccess, RgResource};
use crate::barrier::{BarrierCalculator, PassBarriers};
use crate::resource_state::{RgBufferState, RgImageState};

#[derive(Clone, Copy, Debug)]
struct Tracked<S> {
    state: S,
    last_writer: Option<&'static str>,
}

impl<S> Tracked<S> {
    fn new(state: S) -> Self {
        Self {
            state,
            last_writer: None,
        }
    }
}

#[derive(Default)]
pub struct RgHazardTracker {
    images: HashMap<GfxTextureHandle, Tracked<RgImageState>>,
    buffers: HashMap<GfxBufferHandle, Tracked<RgBufferState>>,

    total_barriers: usize,
    total_elided: usize,
}

// new & init
impl RgHazardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 导入外部创建的图像，指定其当前状态
    pub fn import_image(&mut self, image: GfxTextureHandle, state: RgImageState) {
        self.images.insert(image, Tracked::new(state));
    }

    pub fn import_buffer(&mut self, buffer: GfxBufferHandle, state: RgBufferState) {
        self.buffers.insert(buffer, Tracked::new(state));
    }

    pub fn forget_image(&mut self, image: GfxTextureHandle) {
        self.images.remove(&image);
    }

    pub fn forget_buffer(&mut self, buffer: GfxBufferHandle) {
        self.buffers.remove(&buffer);
    }

    /// 清空所有状态（例如 wait_idle 之后）
    pub fn reset(&mut self) {
        self.images.clear();
        self.buffers.clear();
    }
}

// getters
impl RgHazardTracker {
    #[inline]
    pub fn image_state(&self, image: GfxTextureHandle) -> Option<RgImageState> {
        self.images.get(&image).map(|t| t.state)
    }

    #[inline]
    pub fn buffer_state(&self, buffer: GfxBufferHandle) -> Option<RgBufferState> {
        self.buffers.get(&buffer).map(|t| t.state)
    }

    #[inline]
    pub fn total_barriers(&self) -> usize {
        self.total_barriers
    }

    #[inline]
    pub fn total_elided(&self) -> usize {
        self.total_elided
    }
}

// tools
impl RgHazardTracker {
    /// 计算 dispatch 所需的 barrier，并写入命令列表
    ///
    /// 未导入过的资源视为 `UNDEFINED`。
    pub fn prepare_dispatch(&mut self, cmd: &mut GfxCommandList, access: &RgDispatchAccess) -> PassBarriers {
        let mut barriers = PassBarriers::new();

        for intent in &access.intents {
            match intent.resource {
                RgResource::Image(image) => {
                    let required = RgImageState::from_intent(intent.stage, intent.access);
                    let tracked = self.images.entry(image).or_insert_with(|| Tracked::new(RgImageState::UNDEFINED));

                    let unordered = tracked.last_writer.is_some_and(|w| access.unordered_with.contains(&w))
                        && tracked.state.layout == required.layout;
                    if unordered {
                        barriers.elided += 1;
                    } else if let Some(barrier) =
                        BarrierCalculator::compute_image_barrier(image, tracked.state, required)
                    {
                        barriers.add_image_barrier(barrier);
                    }

                    tracked.state = required;
                    if required.is_write() {
                        tracked.last_writer = Some(access.name);
                    }
                }
                RgResource::Buffer(buffer) => {
                    let required = RgBufferState::from_intent(intent.stage, intent.access);
                    let tracked =
                        self.buffers.entry(buffer).or_insert_with(|| Tracked::new(RgBufferState::UNDEFINED));

                    let unordered = tracked.last_writer.is_some_and(|w| access.unordered_with.contains(&w));
                    if unordered {
                        barriers.elided += 1;
                    } else if let Some(barrier) =
                        BarrierCalculator::compute_buffer_barrier(buffer, tracked.state, required)
                    {
                        barriers.add_buffer_barrier(barrier);
                    }

                    tracked.state = required;
                    if required.is_write() {
                        tracked.last_writer = Some(access.name);
                    }
                }
            }
        }

        if barriers.has_barriers() {
            log::trace!("'{}': {} barriers, {} elided", access.name, barriers.barrier_count(), barriers.elided);
        }
        barriers.record(cmd);

        self.total_barriers += barriers.barrier_count();
        self.total_elided += barriers.elided;
        barriers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RgStage;
    use radiant_gfx::commands::GfxCommand;
    use slotmap::SlotMap;

    fn handles() -> (GfxTextureHandle, GfxBufferHandle) {
        let mut images: SlotMap<GfxTextureHandle, ()> = SlotMap::with_key();
        let mut buffers: SlotMap<GfxBufferHandle, ()> = SlotMap::with_key();
        (images.insert(()), buffers.insert(()))
    }

    fn open_cmd() -> GfxCommandList {
        let mut cmd = GfxCommandList::new("test", None);
        cmd.open();
        cmd
    }

    #[test]
    fn test_write_then_read_needs_barrier() {
        let (image, _) = handles();
        let mut tracker = RgHazardTracker::new();
        tracker.import_image(image, RgImageState::STORAGE_READ_WRITE_RAY_TRACING);
        let mut cmd = open_cmd();

        let write = RgDispatchAccess::new("pathtrace").write_image(image, RgStage::RayTracing);
        let read = RgDispatchAccess::new("tonemap").read_image(image, RgStage::Fragment);

        tracker.prepare_dispatch(&mut cmd, &write);
        let barriers = tracker.prepare_dispatch(&mut cmd, &read);
        assert_eq!(barriers.image_barriers.len(), 1);
        assert!(cmd.commands().iter().any(|c| matches!(c, GfxCommand::ImageBarrier(_))));
    }

    #[test]
    fn test_first_use_transitions_from_undefined() {
        let (image, _) = handles();
        let mut tracker = RgHazardTracker::new();
        let mut cmd = open_cmd();

        let barriers =
            tracker.prepare_dispatch(&mut cmd, &RgDispatchAccess::new("clear").write_image(image, RgStage::Transfer));
        assert_eq!(barriers.image_barriers.len(), 1);
        assert_eq!(tracker.image_state(image), Some(RgImageState::TRANSFER_DST));
    }

    #[test]
    fn test_unordered_siblings_skip_barrier() {
        let (_, buffer) = handles();
        let mut tracker = RgHazardTracker::new();
        tracker.import_buffer(buffer, RgBufferState::STORAGE_READ_WRITE_COMPUTE);
        let mut cmd = open_cmd();

        let resolve = RgDispatchAccess::new("sharc_resolve").read_write_buffer(buffer, RgStage::Compute);
        let compact = RgDispatchAccess::new("sharc_compaction")
            .read_write_buffer(buffer, RgStage::Compute)
            .unordered_with("sharc_resolve");

        tracker.prepare_dispatch(&mut cmd, &resolve);
        let barriers = tracker.prepare_dispatch(&mut cmd, &compact);
        assert!(!barriers.has_barriers());
        assert_eq!(barriers.elided, 1);

        // 不声明无序关系时需要 barrier
        let ordered = RgDispatchAccess::new("next").read_buffer(buffer, RgStage::Compute);
        let barriers = tracker.prepare_dispatch(&mut cmd, &ordered);
        assert_eq!(barriers.buffer_barriers.len(), 1);
        assert_eq!(tracker.total_elided(), 1);
    }
}
