//! 累积与色调映射
//!
//! 全屏 triangle strip，把路径追踪输出累积进 AccumulationBuffer 后写入 framebuffer。

use std::collections::HashMap;

use ash::vk;

use radiant_gfx::binding::{GfxBindingLayoutDesc, GfxBindingSetDesc, GfxBindingSetItem, GfxBindingType, GfxShaderStages};
use radiant_gfx::commands::{GfxCommandList, GfxGraphicsState};
use radiant_gfx::device::{GfxDevice, GfxShaderCompiler};
use radiant_gfx::handles::{
    GfxBindingLayoutHandle, GfxBufferHandle, GfxFramebufferHandle, GfxGraphicsPipelineHandle, GfxShaderHandle,
    GfxTextureHandle,
};
use radiant_gfx::pipeline::{GfxGraphicsPipelineDesc, GfxShaderDesc, GfxShaderStage};
use radiant_gfx::resources::GfxTextureDesc;
use radiant_render_graph::{RgBindingCache, RgDispatchAccess, RgHazardTracker, RgStage};

pub const TONEMAP_SHADER: &str = "pathtracer/Tonemapping.hlsl";
const FULLSCREEN_SHADER: &str = "common/Fullscreen.hlsl";
/// 输出与累积纹理只在 resize 时变化
const BINDING_CACHE_CAPACITY: usize = 8;

pub struct TonemapPass {
    layout: GfxBindingLayoutHandle,
    accumulation: Option<GfxTextureHandle>,

    /// (vertex, pixel)，只编译一次
    shaders: Option<(GfxShaderHandle, GfxShaderHandle)>,
    /// swapchain 的每个 framebuffer 一个 pipeline，framebuffer 重建时一起释放
    pipelines: HashMap<GfxFramebufferHandle, GfxGraphicsPipelineHandle>,
    binding_cache: RgBindingCache,
}
// new & init
impl TonemapPass {
    pub fn new(device: &mut dyn GfxDevice) -> anyhow::Result<Self> {
        let layout = device.create_binding_layout(
            &GfxBindingLayoutDesc::new(GfxShaderStages::PIXEL, 0, "Tonemapping")
                .item(0, GfxBindingType::VolatileConstantBuffer)
                .item(0, GfxBindingType::TextureUav)
                .item(1, GfxBindingType::TextureUav),
        )?;
        Ok(Self {
            layout,
            accumulation: None,
            shaders: None,
            pipelines: HashMap::new(),
            binding_cache: RgBindingCache::new(BINDING_CACHE_CAPACITY),
        })
    }

    fn accumulation_texture(&mut self, device: &mut dyn GfxDevice, extent: vk::Extent2D) -> anyhow::Result<GfxTextureHandle> {
        if let Some(texture) = self.accumulation {
            return Ok(texture);
        }
        let texture = device.create_texture(&GfxTextureDesc::new_2d_uav(
            extent.width,
            extent.height,
            vk::Format::R32G32B32A32_SFLOAT,
            "AccumulationBuffer",
        ))?;
        self.accumulation = Some(texture);
        Ok(texture)
    }

    fn shaders(&mut self, compiler: &mut dyn GfxShaderCompiler) -> anyhow::Result<(GfxShaderHandle, GfxShaderHandle)> {
        if let Some(shaders) = self.shaders {
            return Ok(shaders);
        }
        let vertex_shader = compiler.compile_shader(&GfxShaderDesc {
            source: FULLSCREEN_SHADER.to_string(),
            entry_point: "main_vs".to_string(),
            stage: GfxShaderStage::Vertex,
            macros: Vec::new(),
        })?;
        let pixel_shader = compiler.compile_shader(&GfxShaderDesc::pixel(TONEMAP_SHADER, "main_ps"))?;
        self.shaders = Some((vertex_shader, pixel_shader));
        Ok((vertex_shader, pixel_shader))
    }

    fn pipeline(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        framebuffer: GfxFramebufferHandle,
    ) -> anyhow::Result<GfxGraphicsPipelineHandle> {
        if let Some(pipeline) = self.pipelines.get(&framebuffer) {
            return Ok(*pipeline);
        }

        let (vertex_shader, pixel_shader) = self.shaders(compiler)?;
        let pipeline = device.create_graphics_pipeline(
            &GfxGraphicsPipelineDesc {
                topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
                vertex_shader,
                pixel_shader,
                binding_layouts: vec![self.layout],
                cull_mode: vk::CullModeFlags::NONE,
                depth_test: false,
                stencil_test: false,
                debug_name: "Tonemapping".to_string(),
            },
            framebuffer,
        )?;
        self.pipelines.insert(framebuffer, pipeline);
        Ok(pipeline)
    }
}
// getters
impl TonemapPass {
    #[inline]
    pub fn accumulation(&self) -> Option<GfxTextureHandle> {
        self.accumulation
    }

    #[inline]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    pub fn binding_cache(&self) -> &RgBindingCache {
        &self.binding_cache
    }
}
// update
impl TonemapPass {
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        cmd: &mut GfxCommandList,
        tracker: &mut RgHazardTracker,
        global_constants: GfxBufferHandle,
        output: GfxTextureHandle,
        framebuffer: GfxFramebufferHandle,
        extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        let _span = tracy_client::span!("tonemap");
        let accumulation = self.accumulation_texture(device, extent)?;
        let pipeline = self.pipeline(device, compiler, framebuffer)?;
        let set = self.binding_cache.get_or_create(
            device,
            self.layout,
            &GfxBindingSetDesc::new(vec![
                GfxBindingSetItem::volatile_constant_buffer(0, global_constants),
                GfxBindingSetItem::texture_uav(0, output),
                GfxBindingSetItem::texture_uav(1, accumulation),
            ]),
        )?;

        cmd.begin_marker("Tonemapping");
        tracker.prepare_dispatch(
            cmd,
            &RgDispatchAccess::new("tonemap")
                .read_image(output, RgStage::Fragment)
                .read_write_image(accumulation, RgStage::Fragment),
        );
        cmd.draw(
            &GfxGraphicsState {
                pipeline,
                framebuffer,
                bindings: vec![set],
                viewport: extent,
            },
            4,
        );
        cmd.end_marker();
        Ok(())
    }
}
// destroy
impl TonemapPass {
    pub fn release_retired(&mut self, device: &mut dyn GfxDevice) {
        self.binding_cache.release_retired(device);
    }

    /// 释放尺寸相关的资源，下一次 draw 时按新尺寸重建
    ///
    /// framebuffer 随尺寸一起重建，旧 framebuffer 的 pipeline 也在这里释放。
    pub fn release_targets(&mut self, device: &mut dyn GfxDevice, tracker: &mut RgHazardTracker) {
        self.binding_cache.clear(device);
        if let Some(texture) = self.accumulation.take() {
            tracker.forget_image(texture);
            device.destroy_texture(texture);
        }
        for (_, pipeline) in self.pipelines.drain() {
            device.destroy_graphics_pipeline(pipeline);
        }
    }

    pub fn destroy(mut self, device: &mut dyn GfxDevice, tracker: &mut RgHazardTracker) {
        self.release_targets(device, tracker);
        device.destroy_binding_layout(self.layout);
    }
}

#[cfg(test)]
mod tests {
    use radiant_gfx::commands::GfxCommand;
    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::{HeadlessDevice, HeadlessShaderCompiler};
    use radiant_gfx::resources::GfxBufferDesc;

    use super::*;

    #[test]
    fn test_draw_reuses_binding_set_and_pipeline() {
        tracy_client::Client::start();
        let mut device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let mut compiler = HeadlessShaderCompiler::new();
        let mut tonemap = TonemapPass::new(&mut device).unwrap();
        let constants = device.create_buffer(&GfxBufferDesc::volatile_constant(256, "GlobalConstants")).unwrap();
        let extent = vk::Extent2D { width: 32, height: 16 };
        let output = device
            .create_texture(&GfxTextureDesc::new_2d_uav(32, 16, vk::Format::R32G32B32A32_SFLOAT, "PathTracerOutput"))
            .unwrap();
        let framebuffer = GfxFramebufferHandle::default();
        let mut tracker = RgHazardTracker::new();

        let mut cmd = device.create_command_list("tonemap");
        cmd.open();
        for _ in 0..2 {
            tonemap
                .draw(&mut device, &mut compiler, &mut cmd, &mut tracker, constants, output, framebuffer, extent)
                .unwrap();
        }
        cmd.close();

        assert_eq!(tonemap.binding_cache().misses(), 1);
        assert_eq!(tonemap.binding_cache().hits(), 1);
        assert_eq!(compiler.compiled_shader_count(), 2);
        let draws = cmd
            .commands()
            .iter()
            .filter(|c| matches!(c, GfxCommand::Draw { vertex_count: 4, .. }))
            .count();
        assert_eq!(draws, 2);
        device.execute_command_list(&cmd).unwrap();

        let accumulation = tonemap.accumulation();
        tonemap.release_targets(&mut device, &mut tracker);
        assert!(tonemap.accumulation().is_none());
        assert!(accumulation.is_some());
    }

    #[test]
    fn test_rotating_framebuffers_compile_once() {
        tracy_client::Client::start();
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut compiler = HeadlessShaderCompiler::new();
        let layouts_before = device.live_binding_layouts();
        let mut tonemap = TonemapPass::new(&mut device).unwrap();
        let constants = device.create_buffer(&GfxBufferDesc::volatile_constant(256, "GlobalConstants")).unwrap();
        let extent = vk::Extent2D { width: 16, height: 16 };
        let output = device
            .create_texture(&GfxTextureDesc::new_2d_uav(16, 16, vk::Format::R32G32B32A32_SFLOAT, "PathTracerOutput"))
            .unwrap();
        let mut tracker = RgHazardTracker::new();

        // swapchain 的 3 个 image 各自一个 framebuffer
        let mut framebuffers = slotmap::SlotMap::<GfxFramebufferHandle, ()>::with_key();
        let framebuffers = (0..3).map(|_| framebuffers.insert(())).collect::<Vec<_>>();

        for frame in 0..9 {
            let mut cmd = device.create_command_list("tonemap");
            cmd.open();
            tonemap
                .draw(
                    &mut device,
                    &mut compiler,
                    &mut cmd,
                    &mut tracker,
                    constants,
                    output,
                    framebuffers[frame % framebuffers.len()],
                    extent,
                )
                .unwrap();
            cmd.close();
            device.execute_command_list(&cmd).unwrap();
            assert_eq!(compiler.compiled_shader_count(), 2);
        }
        assert_eq!(tonemap.pipeline_count(), 3);
        assert_eq!(device.live_graphics_pipelines(), 3);

        tonemap.destroy(&mut device, &mut tracker);
        assert_eq!(device.live_graphics_pipelines(), 0);
        assert_eq!(device.live_binding_layouts(), layouts_before);
    }
}
