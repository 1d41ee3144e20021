//! NRC buffer 的描述、创建与绑定

use radiant_gfx::binding::{
    GfxBindingLayoutDesc, GfxBindingSetDesc, GfxBindingSetItem, GfxBindingType, GfxShaderStages,
};
use radiant_gfx::device::GfxDevice;
use radiant_gfx::handles::GfxBufferHandle;
use radiant_gfx::resources::GfxBufferDesc;

use crate::sdk::{BufferIdx, BuffersAllocationInfo, NativeBuffers};

/// 6 个 NRC buffer 的句柄，未分配的为 `None`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NrcBufferHandles([Option<GfxBufferHandle>; BufferIdx::COUNT]);
// getters
impl NrcBufferHandles {
    #[inline]
    pub fn get(&self, idx: BufferIdx) -> Option<GfxBufferHandle> {
        self.0[idx.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (BufferIdx, GfxBufferHandle)> + '_ {
        BufferIdx::ALL.into_iter().filter_map(|idx| self.get(idx).map(|handle| (idx, handle)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}
// tools
impl NrcBufferHandles {
    /// pathtracer 的 NRC 绑定：6 个 structured buffer UAV，缺失的 buffer 绑定为空
    pub fn binding_set_desc(&self) -> GfxBindingSetDesc {
        GfxBindingSetDesc::new(
            BufferIdx::ALL
                .into_iter()
                .map(|idx| GfxBindingSetItem::structured_buffer_uav(idx.index() as u32, self.get(idx)))
                .collect(),
        )
    }

    pub fn binding_layout_desc(register_space: u32) -> GfxBindingLayoutDesc {
        BufferIdx::ALL.into_iter().fold(
            GfxBindingLayoutDesc::new(
                GfxShaderStages::RAY_TRACING | GfxShaderStages::COMPUTE,
                register_space,
                "NRC buffers",
            ),
            |desc, idx| desc.item(idx.index() as u32, GfxBindingType::StructuredBufferUav),
        )
    }

    /// 释放句柄，返回释放的数量
    pub fn release(&mut self, device: &mut dyn GfxDevice) -> usize {
        let mut released = 0;
        for slot in &mut self.0 {
            if let Some(handle) = slot.take() {
                device.destroy_buffer(handle);
                released += 1;
            }
        }
        released
    }
}

/// 根据 SDK 给出的需求生成 buffer 描述；元素数为 0 的 buffer 得到 `None`
pub fn fill_buffer_descs(allocation_info: &BuffersAllocationInfo) -> [Option<GfxBufferDesc>; BufferIdx::COUNT] {
    BufferIdx::ALL.map(|idx| {
        let info = &allocation_info[idx.index()];
        if info.element_count == 0 {
            return None;
        }
        Some(GfxBufferDesc {
            byte_size: info.element_count * info.element_size as u64,
            struct_stride: info.element_size,
            can_have_uavs: info.allow_uav,
            can_have_raw_views: idx == BufferIdx::Counter,
            debug_name: idx.debug_name().to_string(),
            ..Default::default()
        })
    })
}

/// 调用者分配模式：由设备创建 buffer
///
/// 中途失败时会释放已创建的部分。
pub fn create_resources(
    device: &mut dyn GfxDevice,
    descs: &[Option<GfxBufferDesc>; BufferIdx::COUNT],
) -> anyhow::Result<NrcBufferHandles> {
    let mut handles = NrcBufferHandles::default();
    for idx in BufferIdx::ALL {
        let Some(desc) = &descs[idx.index()] else { continue };
        match device.create_buffer(desc) {
            Ok(handle) => handles.0[idx.index()] = Some(handle),
            Err(err) => {
                handles.release(device);
                return Err(err.context(format!("failed to create {}", idx.debug_name())));
            }
        }
    }
    Ok(handles)
}

/// SDK 分配模式：把 SDK 返回的原生 buffer 包装成句柄，空的保持 `None`
pub fn import_native_buffers(
    device: &mut dyn GfxDevice,
    allocation_info: &BuffersAllocationInfo,
    native: &NativeBuffers,
) -> anyhow::Result<NrcBufferHandles> {
    let descs = fill_buffer_descs(allocation_info);
    let mut handles = NrcBufferHandles::default();
    for idx in BufferIdx::ALL {
        let info = native.get(idx);
        let (Some(resource), Some(desc)) = (info.resource, &descs[idx.index()]) else { continue };
        match device.import_native_buffer(resource, desc) {
            Ok(handle) => handles.0[idx.index()] = Some(handle),
            Err(err) => {
                handles.release(device);
                return Err(err.context(format!("failed to wrap {}", idx.debug_name())));
            }
        }
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::HeadlessDevice;

    use super::*;
    use crate::sdk::AllocationInfo;

    fn allocation_info() -> BuffersAllocationInfo {
        let mut info = [AllocationInfo::default(); BufferIdx::COUNT];
        for (i, entry) in info.iter_mut().enumerate().take(BufferIdx::Counter.index() + 1) {
            *entry = AllocationInfo {
                element_count: 16 * (i as u64 + 1),
                element_size: 8,
                allow_uav: true,
            };
        }
        info
    }

    #[test]
    fn test_fill_buffer_descs() {
        let descs = fill_buffer_descs(&allocation_info());

        let counter = descs[BufferIdx::Counter.index()].as_ref().unwrap();
        assert!(counter.can_have_raw_views);
        assert_eq!(counter.byte_size, 16 * 5 * 8);

        let query = descs[BufferIdx::QueryPathInfo.index()].as_ref().unwrap();
        assert!(!query.can_have_raw_views);
        assert!(query.can_have_uavs);
        assert_eq!(query.struct_stride, 8);
        assert_eq!(query.debug_name, "NRC QueryPathInfo");

        assert!(descs[BufferIdx::DebugTrainingPathInfo.index()].is_none());
    }

    #[test]
    fn test_create_and_release() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut handles = create_resources(&mut device, &fill_buffer_descs(&allocation_info())).unwrap();
        assert_eq!(handles.iter().count(), 5);
        assert_eq!(device.live_buffers(), 5);

        let set = handles.binding_set_desc();
        assert_eq!(set.items.len(), BufferIdx::COUNT);
        assert!(set.matches_layout(&NrcBufferHandles::binding_layout_desc(3)));

        assert_eq!(handles.release(&mut device), 5);
        assert!(handles.is_empty());
        assert_eq!(device.live_buffers(), 0);
    }
}
