use ash::vk;

/// 2D 纹理描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxTextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    /// 是否可以作为 UAV（storage image）绑定
    pub is_uav: bool,
    pub debug_name: String,
}
impl GfxTextureDesc {
    /// 可读写的 2D 纹理，帧编排中绝大部分纹理都是这种
    pub fn new_2d_uav(width: u32, height: u32, format: vk::Format, debug_name: impl Into<String>) -> Self {
        Self {
            width,
            height,
            format,
            is_uav: true,
            debug_name: debug_name.into(),
        }
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// 缓冲区描述
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxBufferDesc {
    pub byte_size: u64,
    /// structured buffer 的元素大小，0 表示非 structured buffer
    pub struct_stride: u32,
    pub can_have_uavs: bool,
    pub can_have_raw_views: bool,
    pub is_constant_buffer: bool,
    /// volatile constant buffer：每次写入都使用新的版本，不需要 barrier
    pub is_volatile: bool,
    /// 需要 shader device address（Vulkan 的 buffer_device_address）
    pub needs_device_address: bool,
    pub debug_name: String,
}
// new & init
impl GfxBufferDesc {
    pub fn constant(byte_size: u64, debug_name: impl Into<String>) -> Self {
        Self {
            byte_size,
            is_constant_buffer: true,
            debug_name: debug_name.into(),
            ..Default::default()
        }
    }

    pub fn volatile_constant(byte_size: u64, debug_name: impl Into<String>) -> Self {
        Self {
            is_volatile: true,
            ..Self::constant(byte_size, debug_name)
        }
    }

    pub fn structured_uav(element_count: u64, struct_stride: u32, debug_name: impl Into<String>) -> Self {
        Self {
            byte_size: element_count * struct_stride as u64,
            struct_stride,
            can_have_uavs: true,
            debug_name: debug_name.into(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_raw_views(mut self) -> Self {
        self.can_have_raw_views = true;
        self
    }

    #[inline]
    pub fn element_count(&self) -> u64 {
        if self.struct_stride == 0 { 0 } else { self.byte_size / self.struct_stride as u64 }
    }
}
