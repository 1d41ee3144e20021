//! D3D12 后端

use radiant_gfx::device::{GfxDevice, GfxNativeHandle, GraphicsApi};
use radiant_gfx::handles::GfxBufferHandle;

use crate::error::NrcError;
use crate::integration::{NrcBackend, NrcContext};
use crate::sdk::NativeBufferInfo;

pub struct D3d12Backend;

pub type NrcD3d12Integration = NrcContext<D3d12Backend>;

impl NrcBackend for D3d12Backend {
    const API: GraphicsApi = GraphicsApi::D3d12;

    fn native_device(device: &dyn GfxDevice) -> Result<GfxNativeHandle, NrcError> {
        device.native_device().ok_or(NrcError::MissingNativeDevice)
    }

    fn native_buffer_info(device: &dyn GfxDevice, buffer: GfxBufferHandle) -> NativeBufferInfo {
        NativeBufferInfo {
            resource: device.native_buffer(buffer),
            allocated_size: device.buffer_desc(buffer).map_or(0, |desc| desc.byte_size),
            ..Default::default()
        }
    }
}
