//! 空间哈希辐射缓存（SHARC）的 GPU 资源
//!
//! 4 个 buffer：hash entries、copy offset，以及双缓冲的 voxel 数据。
//! 两个 binding set 只在两个 voxel buffer 的位置上互换，resolve 时交换它们。

use glam::Vec3;

use radiant_gfx::binding::{GfxBindingSetDesc, GfxBindingSetItem};
use radiant_gfx::commands::GfxCommandList;
use radiant_gfx::device::GfxDevice;
use radiant_gfx::handles::{GfxBindingLayoutHandle, GfxBindingSetHandle, GfxBufferHandle};
use radiant_gfx::resources::GfxBufferDesc;
use radiant_render_graph::{RgDispatchAccess, RgHazardTracker, RgStage};
use radiant_render_interface::constants::LightingConstants;
use radiant_render_interface::settings::SharcSettings;

pub const SHARC_ENTRIES_NUM: u32 = 4 * 1024 * 1024;
pub const SHARC_GROUP_SIZE: u32 = 256;
const SHARC_INVALID_ENTRY: u32 = 0;

pub struct SharcCache {
    entries_num: u32,

    hash_entries: GfxBufferHandle,
    copy_offset: GfxBufferHandle,
    voxel_data: GfxBufferHandle,
    voxel_data_prev: GfxBufferHandle,

    binding_set: GfxBindingSetHandle,
    binding_set_swapped: GfxBindingSetHandle,

    /// (当前, 上一次) 相机位置，第一次填写常量时取当时的相机位置
    camera_positions: Option<(Vec3, Vec3)>,
    /// 新建的 buffer 内容未定义，第一次使用前必须清空
    needs_clear: bool,
}
// new & init
impl SharcCache {
    pub fn new(device: &mut dyn GfxDevice, layout: GfxBindingLayoutHandle, entries_num: u32) -> anyhow::Result<Self> {
        let entries = entries_num as u64;
        let hash_entries = device.create_buffer(&GfxBufferDesc::structured_uav(entries, 8, "SharcHashEntries"))?;
        let copy_offset = device.create_buffer(&GfxBufferDesc::structured_uav(entries, 4, "SharcCopyOffset"))?;
        let voxel_data = device.create_buffer(&GfxBufferDesc::structured_uav(entries, 16, "SharcVoxelData"))?;
        let voxel_data_prev =
            device.create_buffer(&GfxBufferDesc::structured_uav(entries, 16, "SharcVoxelDataPrev"))?;

        let set_desc = |current: GfxBufferHandle, prev: GfxBufferHandle| {
            GfxBindingSetDesc::new(vec![
                GfxBindingSetItem::structured_buffer_uav(0, Some(hash_entries)),
                GfxBindingSetItem::structured_buffer_uav(1, Some(copy_offset)),
                GfxBindingSetItem::structured_buffer_uav(2, Some(current)),
                GfxBindingSetItem::structured_buffer_uav(3, Some(prev)),
            ])
        };
        let binding_set = device.create_binding_set(&set_desc(voxel_data, voxel_data_prev), layout)?;
        let binding_set_swapped = device.create_binding_set(&set_desc(voxel_data_prev, voxel_data), layout)?;

        Ok(Self {
            entries_num,
            hash_entries,
            copy_offset,
            voxel_data,
            voxel_data_prev,
            binding_set,
            binding_set_swapped,
            camera_positions: None,
            needs_clear: true,
        })
    }
}
// getters
impl SharcCache {
    #[inline]
    pub fn binding_set(&self) -> GfxBindingSetHandle {
        self.binding_set
    }

    /// 当前与上一帧的 voxel buffer
    #[inline]
    pub fn voxel_buffers(&self) -> (GfxBufferHandle, GfxBufferHandle) {
        (self.voxel_data, self.voxel_data_prev)
    }

    #[inline]
    pub fn needs_clear(&self) -> bool {
        self.needs_clear
    }

    #[inline]
    pub fn buffers(&self) -> [GfxBufferHandle; 4] {
        [self.hash_entries, self.copy_offset, self.voxel_data, self.voxel_data_prev]
    }

    /// resolve 与 compaction 都按 hash entry 并行
    #[inline]
    pub fn dispatch_groups(&self) -> u32 {
        self.entries_num.div_ceil(SHARC_GROUP_SIZE)
    }
}
// update
impl SharcCache {
    /// 填写 SHARC 相关的光照常量；开启 update 时推进相机位置
    pub fn fill_constants(&mut self, constants: &mut LightingConstants, settings: &SharcSettings, view_origin: Vec3) {
        let (camera_position, camera_position_prev) = *self.camera_positions.get_or_insert((view_origin, view_origin));

        constants.sharc_entries_num = self.entries_num as i32;
        constants.sharc_downscale_factor = settings.downscale_factor as i32;
        constants.sharc_scene_scale = settings.scene_scale;
        constants.sharc_roughness_threshold = settings.roughness_threshold;
        constants.sharc_camera_position = camera_position.extend(0.0).to_array();
        constants.sharc_camera_position_prev = camera_position_prev.extend(0.0).to_array();
        constants.sharc_accumulation_frame_num = settings.accumulation_frame_num as i32;
        constants.sharc_stale_frame_num = settings.stale_frame_num as i32;
        constants.sharc_enable_antifirefly = settings.enable_antifirefly as i32;

        if settings.enable_update {
            self.camera_positions = Some((view_origin, camera_position));
        }
    }

    /// 清空全部 4 个 buffer
    pub fn clear(&mut self, cmd: &mut GfxCommandList, tracker: &mut RgHazardTracker) {
        tracker.prepare_dispatch(
            cmd,
            &RgDispatchAccess::new("sharc-clear").read_write_buffers(self.buffers(), RgStage::Transfer),
        );
        cmd.clear_buffer_uint(self.hash_entries, SHARC_INVALID_ENTRY);
        cmd.clear_buffer_uint(self.copy_offset, 0);
        cmd.clear_buffer_uint(self.voxel_data, 0);
        cmd.clear_buffer_uint(self.voxel_data_prev, 0);
        self.needs_clear = false;
    }

    /// 交换当前与上一帧的 voxel buffer 及其 binding set，然后清空新的当前 buffer
    pub fn swap(&mut self, cmd: &mut GfxCommandList, tracker: &mut RgHazardTracker) {
        std::mem::swap(&mut self.voxel_data, &mut self.voxel_data_prev);
        std::mem::swap(&mut self.binding_set, &mut self.binding_set_swapped);

        tracker.prepare_dispatch(
            cmd,
            &RgDispatchAccess::new("sharc-swap").write_buffer(self.voxel_data, RgStage::Transfer),
        );
        cmd.clear_buffer_uint(self.voxel_data, 0);
    }
}
// destroy
impl SharcCache {
    pub fn destroy(self, device: &mut dyn GfxDevice, tracker: &mut RgHazardTracker) {
        device.destroy_binding_set(self.binding_set);
        device.destroy_binding_set(self.binding_set_swapped);
        for buffer in self.buffers() {
            tracker.forget_buffer(buffer);
            device.destroy_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use radiant_gfx::commands::GfxCommand;
    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::HeadlessDevice;

    use super::*;
    use crate::pathtracer::pipelines::sharc_layout_desc;

    fn sharc(device: &mut HeadlessDevice) -> SharcCache {
        let layout = device.create_binding_layout(&sharc_layout_desc()).unwrap();
        SharcCache::new(device, layout, 1024).unwrap()
    }

    #[test]
    fn test_swap_exchanges_voxel_buffers_and_sets() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut cache = sharc(&mut device);
        let mut tracker = RgHazardTracker::new();
        let (current, prev) = cache.voxel_buffers();
        let set = cache.binding_set();

        let mut cmd = device.create_command_list("test");
        cmd.open();
        cache.swap(&mut cmd, &mut tracker);
        cmd.close();

        assert_eq!(cache.voxel_buffers(), (prev, current));
        assert_ne!(cache.binding_set(), set);
        assert!(cmd.commands().contains(&GfxCommand::ClearBufferUint { buffer: prev, value: 0 }));

        cmd.open();
        cache.swap(&mut cmd, &mut tracker);
        cmd.close();
        assert_eq!(cache.binding_set(), set);
    }

    #[test]
    fn test_clear_touches_all_buffers() {
        let mut device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let mut cache = sharc(&mut device);
        let mut tracker = RgHazardTracker::new();
        assert!(cache.needs_clear());

        let mut cmd = device.create_command_list("test");
        cmd.open();
        cache.clear(&mut cmd, &mut tracker);
        assert!(!cache.needs_clear());
        cmd.close();

        let cleared = cmd
            .commands()
            .iter()
            .filter_map(|c| match c {
                GfxCommand::ClearBufferUint { buffer, .. } => Some(*buffer),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(cleared, cache.buffers().to_vec());
        assert_eq!(cache.dispatch_groups(), 4);
        device.execute_command_list(&cmd).unwrap();
    }

    #[test]
    fn test_camera_positions_lag_by_one_update() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut cache = sharc(&mut device);
        let settings = SharcSettings::default();
        let mut constants = LightingConstants::default();

        cache.fill_constants(&mut constants, &settings, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(constants.sharc_camera_position, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(constants.sharc_camera_position_prev, [1.0, 0.0, 0.0, 0.0]);

        cache.fill_constants(&mut constants, &settings, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(constants.sharc_camera_position, [1.0, 0.0, 0.0, 0.0]);

        cache.fill_constants(&mut constants, &settings, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(constants.sharc_camera_position, [2.0, 0.0, 0.0, 0.0]);
        assert_eq!(constants.sharc_camera_position_prev, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(constants.sharc_entries_num, 1024);
    }
}
