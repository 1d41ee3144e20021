//! Vulkan 后端
//!
//! 调用者分配模式下，SDK 通过 device address 访问 buffer。

use radiant_gfx::device::{GfxDevice, GfxNativeHandle, GraphicsApi};
use radiant_gfx::handles::GfxBufferHandle;
use radiant_gfx::resources::GfxBufferDesc;

use crate::error::NrcError;
use crate::integration::{NrcBackend, NrcContext};
use crate::sdk::NativeBufferInfo;

/// NRC 的 shader 与训练 kernel 需要的设备扩展
pub const REQUIRED_VULKAN_EXTENSIONS: [&str; 2] = ["VK_KHR_buffer_device_address", "VK_KHR_shader_float16_int8"];

pub struct VulkanBackend;

pub type NrcVulkanIntegration = NrcContext<VulkanBackend>;

impl NrcBackend for VulkanBackend {
    const API: GraphicsApi = GraphicsApi::Vulkan;

    fn native_device(device: &dyn GfxDevice) -> Result<GfxNativeHandle, NrcError> {
        let native_device = device.native_device().ok_or(NrcError::MissingNativeDevice)?;
        if let Some(missing) = REQUIRED_VULKAN_EXTENSIONS.into_iter().find(|ext| !device.supports_extension(ext)) {
            return Err(NrcError::MissingExtension(missing));
        }
        Ok(native_device)
    }

    fn adjust_buffer_desc(desc: GfxBufferDesc) -> GfxBufferDesc {
        GfxBufferDesc {
            needs_device_address: true,
            ..desc
        }
    }

    fn native_buffer_info(device: &dyn GfxDevice, buffer: GfxBufferHandle) -> NativeBufferInfo {
        NativeBufferInfo {
            resource: device.native_buffer(buffer),
            allocated_size: device.buffer_desc(buffer).map_or(0, |desc| desc.byte_size),
            allocated_offset: 0,
            device_address: device.buffer_device_address(buffer).unwrap_or(0),
        }
    }
}
