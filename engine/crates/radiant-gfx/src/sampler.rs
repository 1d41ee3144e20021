use ash::vk;
use std::hash::Hash;

/// Sampler 描述
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub max_anisotropy: u32,
    pub mipmap_mode: vk::SamplerMipmapMode,
}
impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 0,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        }
    }
}
// 常用组合
impl GfxSamplerDesc {
    /// 所有方向 clamp-to-edge，min/mag 使用同一个 filter
    pub fn clamp(filter: vk::Filter) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            max_anisotropy: 0,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        }
    }

    /// 场景材质使用的各向异性 wrap sampler
    pub fn anisotropic_wrap() -> Self {
        Self {
            max_anisotropy: 16,
            ..Default::default()
        }
    }
}
