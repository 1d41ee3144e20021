//! 降噪器的输入输出纹理

use anyhow::Context;
use ash::vk;
use radiant_gfx::binding::{GfxBindingLayoutDesc, GfxBindingSetDesc, GfxBindingSetItem, GfxBindingType, GfxShaderStages};
use radiant_gfx::device::GfxDevice;
use radiant_gfx::handles::GfxTextureHandle;
use radiant_gfx::resources::GfxTextureDesc;

/// 路径追踪写入、降噪器读写的一组纹理，尺寸与输出图像一致
pub struct RenderTargets {
    pub view_space_z: GfxTextureHandle,
    pub motion_vectors: GfxTextureHandle,
    pub normal_roughness: GfxTextureHandle,
    pub emissive: GfxTextureHandle,
    pub diffuse_albedo: GfxTextureHandle,
    pub specular_albedo: GfxTextureHandle,
    pub in_diff_radiance_hit_dist: GfxTextureHandle,
    pub in_spec_radiance_hit_dist: GfxTextureHandle,
    pub out_diff_radiance_hit_dist: GfxTextureHandle,
    pub out_spec_radiance_hit_dist: GfxTextureHandle,

    extent: vk::Extent2D,
}
// new & init
impl RenderTargets {
    pub fn new(device: &mut dyn GfxDevice, width: u32, height: u32) -> anyhow::Result<Self> {
        let mut create = |format: vk::Format, name: &str| {
            device
                .create_texture(&GfxTextureDesc::new_2d_uav(width, height, format, name))
                .with_context(|| format!("Failed to create denoiser render target '{name}'"))
        };

        Ok(Self {
            view_space_z: create(vk::Format::R32_SFLOAT, "denoiserViewspaceZ")?,
            motion_vectors: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserMotionVectors")?,
            normal_roughness: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserNormalRoughness")?,
            emissive: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserEmissive")?,
            diffuse_albedo: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserDiffuseAlbedo")?,
            specular_albedo: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserSpecularAlbedo")?,
            in_diff_radiance_hit_dist: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserInDiffRadianceHitDist")?,
            in_spec_radiance_hit_dist: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserInSpecRadianceHitDist")?,
            out_diff_radiance_hit_dist: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserOutDiffRadianceHitDist")?,
            out_spec_radiance_hit_dist: create(vk::Format::R16G16B16A16_SFLOAT, "denoiserOutSpecRadianceHitDist")?,
            extent: vk::Extent2D { width, height },
        })
    }

    /// Denoiser 槽位的 layout：8 个 UAV
    pub fn binding_layout_desc(register_space: u32) -> GfxBindingLayoutDesc {
        (0..8).fold(
            GfxBindingLayoutDesc::new(
                GfxShaderStages::RAY_TRACING | GfxShaderStages::COMPUTE,
                register_space,
                "DenoiserLayout",
            ),
            |desc, slot| desc.item(slot, GfxBindingType::TextureUav),
        )
    }
}
// destroy
impl RenderTargets {
    pub fn destroy(self, device: &mut dyn GfxDevice) {
        for texture in self.all() {
            device.destroy_texture(texture);
        }
    }
}
// getters
impl RenderTargets {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn all(&self) -> [GfxTextureHandle; 10] {
        [
            self.view_space_z,
            self.motion_vectors,
            self.normal_roughness,
            self.emissive,
            self.diffuse_albedo,
            self.specular_albedo,
            self.in_diff_radiance_hit_dist,
            self.in_spec_radiance_hit_dist,
            self.out_diff_radiance_hit_dist,
            self.out_spec_radiance_hit_dist,
        ]
    }

    /// 打包阶段写入降噪器输入，解析阶段读取降噪器输出；两者只有 radiance 纹理不同
    pub fn binding_set_desc(&self, denoised_output: bool) -> GfxBindingSetDesc {
        let (diff, spec) = if denoised_output {
            (self.out_diff_radiance_hit_dist, self.out_spec_radiance_hit_dist)
        } else {
            (self.in_diff_radiance_hit_dist, self.in_spec_radiance_hit_dist)
        };
        GfxBindingSetDesc::new(vec![
            GfxBindingSetItem::texture_uav(0, diff),
            GfxBindingSetItem::texture_uav(1, spec),
            GfxBindingSetItem::texture_uav(2, self.view_space_z),
            GfxBindingSetItem::texture_uav(3, self.normal_roughness),
            GfxBindingSetItem::texture_uav(4, self.motion_vectors),
            GfxBindingSetItem::texture_uav(5, self.emissive),
            GfxBindingSetItem::texture_uav(6, self.diffuse_albedo),
            GfxBindingSetItem::texture_uav(7, self.specular_albedo),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::HeadlessDevice;

    #[test]
    fn test_render_targets_formats() {
        let mut device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let targets = RenderTargets::new(&mut device, 32, 16).unwrap();

        assert_eq!(device.texture_desc(targets.view_space_z).unwrap().format, vk::Format::R32_SFLOAT);
        assert_eq!(
            device.texture_desc(targets.out_spec_radiance_hit_dist).unwrap().format,
            vk::Format::R16G16B16A16_SFLOAT
        );
        assert_eq!(device.live_textures(), 10);

        let input = targets.binding_set_desc(false);
        let output = targets.binding_set_desc(true);
        assert_ne!(input, output);
        assert!(input.matches_layout(&RenderTargets::binding_layout_desc(1)));

        targets.destroy(&mut device);
        assert_eq!(device.live_textures(), 0);
    }
}
