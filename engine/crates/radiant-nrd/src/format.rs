//! 引擎抽象纹理格式到 vk::Format 的转换表

use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Format {
    R8_UNORM,
    R8_SNORM,
    R8_UINT,
    R8_SINT,
    RG8_UNORM,
    RG8_SNORM,
    RG8_UINT,
    RG8_SINT,
    RGBA8_UNORM,
    RGBA8_SNORM,
    RGBA8_UINT,
    RGBA8_SINT,
    RGBA8_SRGB,
    R16_UNORM,
    R16_SNORM,
    R16_UINT,
    R16_SINT,
    R16_SFLOAT,
    RG16_UNORM,
    RG16_SNORM,
    RG16_UINT,
    RG16_SINT,
    RG16_SFLOAT,
    RGBA16_UNORM,
    RGBA16_SNORM,
    RGBA16_UINT,
    RGBA16_SINT,
    RGBA16_SFLOAT,
    R32_UINT,
    R32_SINT,
    R32_SFLOAT,
    RG32_UINT,
    RG32_SINT,
    RG32_SFLOAT,
    RGB32_UINT,
    RGB32_SINT,
    RGB32_SFLOAT,
    RGBA32_UINT,
    RGBA32_SINT,
    RGBA32_SFLOAT,
    R10_G10_B10_A2_UNORM,
    R10_G10_B10_A2_UINT,
    R11_G11_B10_UFLOAT,
    R9_G9_B9_E5_UFLOAT,
}

impl Format {
    pub const ALL: [Format; 44] = [
        Self::R8_UNORM,
        Self::R8_SNORM,
        Self::R8_UINT,
        Self::R8_SINT,
        Self::RG8_UNORM,
        Self::RG8_SNORM,
        Self::RG8_UINT,
        Self::RG8_SINT,
        Self::RGBA8_UNORM,
        Self::RGBA8_SNORM,
        Self::RGBA8_UINT,
        Self::RGBA8_SINT,
        Self::RGBA8_SRGB,
        Self::R16_UNORM,
        Self::R16_SNORM,
        Self::R16_UINT,
        Self::R16_SINT,
        Self::R16_SFLOAT,
        Self::RG16_UNORM,
        Self::RG16_SNORM,
        Self::RG16_UINT,
        Self::RG16_SINT,
        Self::RG16_SFLOAT,
        Self::RGBA16_UNORM,
        Self::RGBA16_SNORM,
        Self::RGBA16_UINT,
        Self::RGBA16_SINT,
        Self::RGBA16_SFLOAT,
        Self::R32_UINT,
        Self::R32_SINT,
        Self::R32_SFLOAT,
        Self::RG32_UINT,
        Self::RG32_SINT,
        Self::RG32_SFLOAT,
        Self::RGB32_UINT,
        Self::RGB32_SINT,
        Self::RGB32_SFLOAT,
        Self::RGBA32_UINT,
        Self::RGBA32_SINT,
        Self::RGBA32_SFLOAT,
        Self::R10_G10_B10_A2_UNORM,
        Self::R10_G10_B10_A2_UINT,
        Self::R11_G11_B10_UFLOAT,
        Self::R9_G9_B9_E5_UFLOAT,
    ];

    /// 不支持的格式返回 `vk::Format::UNDEFINED`
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::R8_UNORM => vk::Format::R8_UNORM,
            Self::R8_SNORM => vk::Format::R8_SNORM,
            Self::R8_UINT => vk::Format::R8_UINT,
            Self::R8_SINT => vk::Format::R8_SINT,
            Self::RG8_UNORM => vk::Format::R8G8_UNORM,
            Self::RG8_SNORM => vk::Format::R8G8_SNORM,
            Self::RG8_UINT => vk::Format::R8G8_UINT,
            Self::RG8_SINT => vk::Format::R8G8_SINT,
            Self::RGBA8_UNORM => vk::Format::R8G8B8A8_UNORM,
            Self::RGBA8_SNORM => vk::Format::R8G8B8A8_SNORM,
            Self::RGBA8_UINT => vk::Format::R8G8B8A8_UINT,
            Self::RGBA8_SINT => vk::Format::R8G8B8A8_SINT,
            Self::RGBA8_SRGB => vk::Format::R8G8B8A8_SRGB,
            Self::R16_UNORM => vk::Format::R16_UNORM,
            Self::R16_SNORM => vk::Format::R16_SNORM,
            Self::R16_UINT => vk::Format::R16_UINT,
            Self::R16_SINT => vk::Format::R16_SINT,
            Self::R16_SFLOAT => vk::Format::R16_SFLOAT,
            Self::RG16_UNORM => vk::Format::R16G16_UNORM,
            Self::RG16_SNORM => vk::Format::R16G16_SNORM,
            Self::RG16_UINT => vk::Format::R16G16_UINT,
            Self::RG16_SINT => vk::Format::R16G16_SINT,
            Self::RG16_SFLOAT => vk::Format::R16G16_SFLOAT,
            Self::RGBA16_UNORM => vk::Format::R16G16B16A16_UNORM,
            Self::RGBA16_SNORM => vk::Format::R16G16B16A16_SNORM,
            Self::RGBA16_UINT => vk::Format::R16G16B16A16_UINT,
            Self::RGBA16_SINT => vk::Format::R16G16B16A16_SINT,
            Self::RGBA16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
            Self::R32_UINT => vk::Format::R32_UINT,
            Self::R32_SINT => vk::Format::R32_SINT,
            Self::R32_SFLOAT => vk::Format::R32_SFLOAT,
            Self::RG32_UINT => vk::Format::R32G32_UINT,
            Self::RG32_SINT => vk::Format::R32G32_SINT,
            Self::RG32_SFLOAT => vk::Format::R32G32_SFLOAT,
            Self::RGB32_UINT => vk::Format::R32G32B32_UINT,
            Self::RGB32_SINT => vk::Format::R32G32B32_SINT,
            Self::RGB32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
            Self::RGBA32_UINT => vk::Format::R32G32B32A32_UINT,
            Self::RGBA32_SINT => vk::Format::R32G32B32A32_SINT,
            Self::RGBA32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
            Self::R10_G10_B10_A2_UNORM => vk::Format::A2B10G10R10_UNORM_PACK32,
            // 无法表示，也不会被用到
            Self::R10_G10_B10_A2_UINT => vk::Format::UNDEFINED,
            Self::R11_G11_B10_UFLOAT => vk::Format::B10G11R11_UFLOAT_PACK32,
            // 无法表示，也不会被用到
            Self::R9_G9_B9_E5_UFLOAT => vk::Format::UNDEFINED,
        }
    }

    #[inline]
    pub fn is_supported(self) -> bool {
        self.to_vk() != vk::Format::UNDEFINED
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_translation_is_total_and_injective() {
        let supported: Vec<_> = Format::ALL.iter().copied().filter(|f| f.is_supported()).collect();
        assert_eq!(supported.len(), Format::ALL.len() - 2);

        let distinct: HashSet<_> = supported.iter().map(|f| f.to_vk()).collect();
        assert_eq!(distinct.len(), supported.len());
    }

    #[test]
    fn test_unsupported_formats() {
        assert_eq!(Format::R10_G10_B10_A2_UINT.to_vk(), vk::Format::UNDEFINED);
        assert_eq!(Format::R9_G9_B9_E5_UFLOAT.to_vk(), vk::Format::UNDEFINED);
        assert_eq!(Format::RGBA16_SFLOAT.to_vk(), vk::Format::R16G16B16A16_SFLOAT);
    }
}
