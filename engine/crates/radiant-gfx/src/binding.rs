//! Binding layout / binding set 描述
//!
//! layout 描述 shader 的资源槽位（schema），set 把槽位映射到具体资源。
//! 两者都按 `(slot, type)` 对齐，创建 set 时由设备校验是否与 layout 匹配。

use crate::handles::{GfxAccelStructHandle, GfxBufferHandle, GfxSamplerHandle, GfxTextureHandle};

bitflags::bitflags! {
    /// binding layout 对哪些 shader stage 可见
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct GfxShaderStages: u32 {
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
        const COMPUTE = 1 << 2;
        const RAY_TRACING = 1 << 3;
        const ALL = Self::VERTEX.bits() | Self::PIXEL.bits() | Self::COMPUTE.bits() | Self::RAY_TRACING.bits();
    }
}

/// 槽位类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxBindingType {
    VolatileConstantBuffer,
    ConstantBuffer,
    Sampler,
    TextureSrv,
    TextureUav,
    StructuredBufferSrv,
    StructuredBufferUav,
    RawBufferUav,
    AccelStruct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxBindingLayoutItem {
    pub slot: u32,
    pub ty: GfxBindingType,
}
impl GfxBindingLayoutItem {
    #[inline]
    pub const fn new(slot: u32, ty: GfxBindingType) -> Self {
        Self { slot, ty }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxBindingLayoutDesc {
    pub visibility: GfxShaderStages,
    /// HLSL 的 register space / Vulkan 的 descriptor set index
    pub register_space: u32,
    pub items: Vec<GfxBindingLayoutItem>,
    pub debug_name: String,
}
impl GfxBindingLayoutDesc {
    pub fn new(visibility: GfxShaderStages, register_space: u32, debug_name: impl Into<String>) -> Self {
        Self {
            visibility,
            register_space,
            items: Vec::new(),
            debug_name: debug_name.into(),
        }
    }

    #[inline]
    pub fn item(mut self, slot: u32, ty: GfxBindingType) -> Self {
        self.items.push(GfxBindingLayoutItem::new(slot, ty));
        self
    }
}

/// 绑定到槽位上的具体资源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxBindingResource {
    Texture(GfxTextureHandle),
    Buffer(GfxBufferHandle),
    Sampler(GfxSamplerHandle),
    AccelStruct(GfxAccelStructHandle),
    /// 空绑定（例如 SDK 没有分配的 debug buffer）
    Null,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxBindingSetItem {
    pub slot: u32,
    pub ty: GfxBindingType,
    pub resource: GfxBindingResource,
}
// 构造函数，命名与槽位类型一一对应
impl GfxBindingSetItem {
    #[inline]
    pub fn constant_buffer(slot: u32, buffer: GfxBufferHandle) -> Self {
        Self {
            slot,
            ty: GfxBindingType::ConstantBuffer,
            resource: GfxBindingResource::Buffer(buffer),
        }
    }
    #[inline]
    pub fn volatile_constant_buffer(slot: u32, buffer: GfxBufferHandle) -> Self {
        Self {
            slot,
            ty: GfxBindingType::VolatileConstantBuffer,
            resource: GfxBindingResource::Buffer(buffer),
        }
    }
    #[inline]
    pub fn sampler(slot: u32, sampler: GfxSamplerHandle) -> Self {
        Self {
            slot,
            ty: GfxBindingType::Sampler,
            resource: GfxBindingResource::Sampler(sampler),
        }
    }
    #[inline]
    pub fn texture_srv(slot: u32, texture: GfxTextureHandle) -> Self {
        Self {
            slot,
            ty: GfxBindingType::TextureSrv,
            resource: GfxBindingResource::Texture(texture),
        }
    }
    #[inline]
    pub fn texture_uav(slot: u32, texture: GfxTextureHandle) -> Self {
        Self {
            slot,
            ty: GfxBindingType::TextureUav,
            resource: GfxBindingResource::Texture(texture),
        }
    }
    #[inline]
    pub fn structured_buffer_srv(slot: u32, buffer: GfxBufferHandle) -> Self {
        Self {
            slot,
            ty: GfxBindingType::StructuredBufferSrv,
            resource: GfxBindingResource::Buffer(buffer),
        }
    }
    /// `buffer` 为 `None` 时绑定空资源
    #[inline]
    pub fn structured_buffer_uav(slot: u32, buffer: Option<GfxBufferHandle>) -> Self {
        Self {
            slot,
            ty: GfxBindingType::StructuredBufferUav,
            resource: buffer.map_or(GfxBindingResource::Null, GfxBindingResource::Buffer),
        }
    }
    #[inline]
    pub fn accel_struct(slot: u32, accel: GfxAccelStructHandle) -> Self {
        Self {
            slot,
            ty: GfxBindingType::AccelStruct,
            resource: GfxBindingResource::AccelStruct(accel),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GfxBindingSetDesc {
    pub items: Vec<GfxBindingSetItem>,
}
impl GfxBindingSetDesc {
    #[inline]
    pub fn new(items: Vec<GfxBindingSetItem>) -> Self {
        Self { items }
    }

    /// 检查 set 是否与 layout 的 `(slot, type)` 完全一致
    pub fn matches_layout(&self, layout: &GfxBindingLayoutDesc) -> bool {
        self.items.len() == layout.items.len()
            && self.items.iter().zip(&layout.items).all(|(set_item, layout_item)| {
                set_item.slot == layout_item.slot && set_item.ty == layout_item.ty
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_binding_set_matches_layout() {
        let mut textures: SlotMap<GfxTextureHandle, ()> = SlotMap::with_key();
        let texture = textures.insert(());

        let layout = GfxBindingLayoutDesc::new(GfxShaderStages::COMPUTE, 0, "layout")
            .item(0, GfxBindingType::TextureUav)
            .item(1, GfxBindingType::TextureUav);

        let good = GfxBindingSetDesc::new(vec![
            GfxBindingSetItem::texture_uav(0, texture),
            GfxBindingSetItem::texture_uav(1, texture),
        ]);
        assert!(good.matches_layout(&layout));

        let wrong_type = GfxBindingSetDesc::new(vec![
            GfxBindingSetItem::texture_uav(0, texture),
            GfxBindingSetItem::texture_srv(1, texture),
        ]);
        assert!(!wrong_type.matches_layout(&layout));

        let too_short = GfxBindingSetDesc::new(vec![GfxBindingSetItem::texture_uav(0, texture)]);
        assert!(!too_short.matches_layout(&layout));
    }
}
