//! Headless 后端
//!
//! 不连接任何图形 API：资源只保存描述符，命令列表在提交时被校验后保存下来，
//! 供测试和离屏演示程序检查。原生句柄用递增的假地址模拟。

use std::collections::HashSet;

use anyhow::{Context, bail};
use ash::vk;
use slotmap::SlotMap;

use crate::accel::{GfxBlasDesc, GfxTlasDesc};
use crate::binding::{GfxBindingLayoutDesc, GfxBindingSetDesc};
use crate::commands::{GfxCommand, GfxCommandList};
use crate::device::{GfxDevice, GfxNativeHandle, GfxQueue, GfxShaderCompiler, GraphicsApi};
use crate::handles::*;
use crate::pipeline::{
    GfxComputePipelineDesc, GfxGraphicsPipelineDesc, GfxRtPipelineDesc, GfxShaderDesc, GfxShaderLibraryDesc,
};
use crate::resources::{GfxBufferDesc, GfxTextureDesc};
use crate::sampler::GfxSamplerDesc;

struct HeadlessTexture {
    desc: GfxTextureDesc,
    native: GfxNativeHandle,
}

struct HeadlessBuffer {
    desc: GfxBufferDesc,
    native: GfxNativeHandle,
    device_address: Option<u64>,
}

struct HeadlessBindingSet {
    layout: GfxBindingLayoutHandle,
}

/// 记录型设备
pub struct HeadlessDevice {
    api: GraphicsApi,
    with_native_handles: bool,
    extensions: HashSet<String>,
    /// 创建这些 format 的纹理会失败，用于模拟设备不支持
    unsupported_formats: HashSet<vk::Format>,

    textures: SlotMap<GfxTextureHandle, HeadlessTexture>,
    buffers: SlotMap<GfxBufferHandle, HeadlessBuffer>,
    samplers: SlotMap<GfxSamplerHandle, GfxSamplerDesc>,
    accel_structs: SlotMap<GfxAccelStructHandle, String>,
    binding_layouts: SlotMap<GfxBindingLayoutHandle, GfxBindingLayoutDesc>,
    binding_sets: SlotMap<GfxBindingSetHandle, HeadlessBindingSet>,
    compute_pipelines: SlotMap<GfxComputePipelineHandle, GfxComputePipelineDesc>,
    rt_pipelines: SlotMap<GfxRtPipelineHandle, GfxRtPipelineDesc>,
    graphics_pipelines: SlotMap<GfxGraphicsPipelineHandle, GfxGraphicsPipelineDesc>,

    next_native: u64,
    binding_sets_created: usize,
    wait_idle_count: usize,
    submitted: Vec<Vec<GfxCommand>>,
}
// new & init
impl HeadlessDevice {
    pub fn new(api: GraphicsApi) -> Self {
        Self {
            api,
            with_native_handles: true,
            extensions: HashSet::new(),
            unsupported_formats: HashSet::new(),

            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            accel_structs: SlotMap::with_key(),
            binding_layouts: SlotMap::with_key(),
            binding_sets: SlotMap::with_key(),
            compute_pipelines: SlotMap::with_key(),
            rt_pipelines: SlotMap::with_key(),
            graphics_pipelines: SlotMap::with_key(),

            next_native: 0x1000,
            binding_sets_created: 0,
            wait_idle_count: 0,
            submitted: Vec::new(),
        }
    }

    /// 不提供任何原生句柄（device / queue / command list 均为空）
    pub fn without_native_handles(mut self) -> Self {
        self.with_native_handles = false;
        self
    }

    pub fn with_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a str>) -> Self {
        self.extensions.extend(extensions.into_iter().map(str::to_string));
        self
    }

    pub fn with_unsupported_format(mut self, format: vk::Format) -> Self {
        self.unsupported_formats.insert(format);
        self
    }

    fn alloc_native(&mut self) -> GfxNativeHandle {
        self.next_native += 0x10;
        GfxNativeHandle(self.next_native)
    }
}
// getters
impl HeadlessDevice {
    /// 已经提交的命令列表，按提交顺序
    #[inline]
    pub fn submitted(&self) -> &[Vec<GfxCommand>] {
        &self.submitted
    }
    #[inline]
    pub fn last_submission(&self) -> Option<&[GfxCommand]> {
        self.submitted.last().map(Vec::as_slice)
    }
    #[inline]
    pub fn wait_idle_count(&self) -> usize {
        self.wait_idle_count
    }
    #[inline]
    pub fn binding_sets_created(&self) -> usize {
        self.binding_sets_created
    }
    #[inline]
    pub fn live_binding_sets(&self) -> usize {
        self.binding_sets.len()
    }
    #[inline]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }
    #[inline]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
    #[inline]
    pub fn live_binding_layouts(&self) -> usize {
        self.binding_layouts.len()
    }
    #[inline]
    pub fn live_graphics_pipelines(&self) -> usize {
        self.graphics_pipelines.len()
    }
    #[inline]
    pub fn is_binding_set_alive(&self, set: GfxBindingSetHandle) -> bool {
        self.binding_sets.contains_key(set)
    }
    pub fn binding_set_layout(&self, set: GfxBindingSetHandle) -> Option<GfxBindingLayoutHandle> {
        self.binding_sets.get(set).map(|s| s.layout)
    }
    pub fn binding_layout_desc(&self, layout: GfxBindingLayoutHandle) -> Option<&GfxBindingLayoutDesc> {
        self.binding_layouts.get(layout)
    }
    pub fn rt_pipeline_desc(&self, pipeline: GfxRtPipelineHandle) -> Option<&GfxRtPipelineDesc> {
        self.rt_pipelines.get(pipeline)
    }
    pub fn compute_pipeline_desc(&self, pipeline: GfxComputePipelineHandle) -> Option<&GfxComputePipelineDesc> {
        self.compute_pipelines.get(pipeline)
    }
}
// 提交校验
impl HeadlessDevice {
    fn validate_bindings(&self, bindings: &[GfxBindingSetHandle]) -> anyhow::Result<()> {
        for (index, set) in bindings.iter().enumerate() {
            if !self.binding_sets.contains_key(*set) {
                bail!("binding set at slot {index} was destroyed before submission");
            }
        }
        Ok(())
    }

    fn validate_command(&self, command: &GfxCommand) -> anyhow::Result<()> {
        match command {
            GfxCommand::DispatchRays { state, width, height } => {
                let pipeline = self.rt_pipelines.get(state.pipeline).context("unknown ray tracing pipeline")?;
                if pipeline.global_binding_layouts.len() != state.bindings.len() {
                    bail!(
                        "ray tracing state has {} binding sets, pipeline '{}' expects {}",
                        state.bindings.len(),
                        pipeline.debug_name,
                        pipeline.global_binding_layouts.len()
                    );
                }
                if *width == 0 || *height == 0 {
                    bail!("empty ray dispatch {width}x{height}");
                }
                self.validate_bindings(&state.bindings)
            }
            GfxCommand::Dispatch { state, .. } => {
                self.compute_pipelines.get(state.pipeline).context("unknown compute pipeline")?;
                self.validate_bindings(&state.bindings)
            }
            GfxCommand::Draw { state, .. } => {
                self.graphics_pipelines.get(state.pipeline).context("unknown graphics pipeline")?;
                self.validate_bindings(&state.bindings)
            }
            GfxCommand::WriteBuffer { buffer, data } => {
                let desc = &self.buffers.get(*buffer).context("write to unknown buffer")?.desc;
                if data.len() as u64 > desc.byte_size {
                    bail!("write of {} bytes overflows buffer '{}' ({} bytes)", data.len(), desc.debug_name, desc.byte_size);
                }
                Ok(())
            }
            GfxCommand::ClearBufferUint { buffer, .. } => {
                self.buffers.get(*buffer).context("clear of unknown buffer")?;
                Ok(())
            }
            GfxCommand::ClearTextureFloat { texture, .. } => {
                self.textures.get(*texture).context("clear of unknown texture")?;
                Ok(())
            }
            GfxCommand::BuildBlas { blas } | GfxCommand::BuildTlas { tlas: blas, .. } => {
                self.accel_structs.get(*blas).context("build of unknown acceleration structure")?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
impl GfxDevice for HeadlessDevice {
    fn graphics_api(&self) -> GraphicsApi {
        self.api
    }

    fn create_texture(&mut self, desc: &GfxTextureDesc) -> anyhow::Result<GfxTextureHandle> {
        if desc.format == vk::Format::UNDEFINED || self.unsupported_formats.contains(&desc.format) {
            bail!("texture '{}': format {:?} is not supported", desc.debug_name, desc.format);
        }
        if desc.width == 0 || desc.height == 0 {
            bail!("texture '{}': empty extent {}x{}", desc.debug_name, desc.width, desc.height);
        }
        let native = self.alloc_native();
        Ok(self.textures.insert(HeadlessTexture {
            desc: desc.clone(),
            native,
        }))
    }

    fn create_buffer(&mut self, desc: &GfxBufferDesc) -> anyhow::Result<GfxBufferHandle> {
        if desc.byte_size == 0 {
            bail!("buffer '{}': zero sized", desc.debug_name);
        }
        let native = self.alloc_native();
        let device_address = (self.api == GraphicsApi::Vulkan).then_some(native.0 << 8);
        Ok(self.buffers.insert(HeadlessBuffer {
            desc: desc.clone(),
            native,
            device_address,
        }))
    }

    fn import_native_buffer(
        &mut self,
        native: GfxNativeHandle,
        desc: &GfxBufferDesc,
    ) -> anyhow::Result<GfxBufferHandle> {
        Ok(self.buffers.insert(HeadlessBuffer {
            desc: desc.clone(),
            native,
            device_address: None,
        }))
    }

    fn create_sampler(&mut self, desc: &GfxSamplerDesc) -> anyhow::Result<GfxSamplerHandle> {
        Ok(self.samplers.insert(*desc))
    }

    fn create_blas(&mut self, desc: &GfxBlasDesc) -> anyhow::Result<GfxAccelStructHandle> {
        if desc.geometries.is_empty() {
            bail!("BLAS '{}' has no geometry", desc.debug_name);
        }
        Ok(self.accel_structs.insert(desc.debug_name.clone()))
    }

    fn create_tlas(&mut self, desc: &GfxTlasDesc) -> anyhow::Result<GfxAccelStructHandle> {
        Ok(self.accel_structs.insert(desc.debug_name.clone()))
    }

    fn destroy_texture(&mut self, texture: GfxTextureHandle) {
        self.textures.remove(texture);
    }

    fn destroy_buffer(&mut self, buffer: GfxBufferHandle) {
        self.buffers.remove(buffer);
    }

    fn destroy_sampler(&mut self, sampler: GfxSamplerHandle) {
        self.samplers.remove(sampler);
    }

    fn destroy_accel_struct(&mut self, accel: GfxAccelStructHandle) {
        self.accel_structs.remove(accel);
    }

    fn texture_desc(&self, texture: GfxTextureHandle) -> Option<&GfxTextureDesc> {
        self.textures.get(texture).map(|t| &t.desc)
    }

    fn buffer_desc(&self, buffer: GfxBufferHandle) -> Option<&GfxBufferDesc> {
        self.buffers.get(buffer).map(|b| &b.desc)
    }

    fn create_binding_layout(&mut self, desc: &GfxBindingLayoutDesc) -> anyhow::Result<GfxBindingLayoutHandle> {
        Ok(self.binding_layouts.insert(desc.clone()))
    }

    fn create_binding_set(
        &mut self,
        desc: &GfxBindingSetDesc,
        layout: GfxBindingLayoutHandle,
    ) -> anyhow::Result<GfxBindingSetHandle> {
        let layout_desc = self.binding_layouts.get(layout).context("binding set created with unknown layout")?;
        if !desc.matches_layout(layout_desc) {
            bail!("binding set does not match layout '{}'", layout_desc.debug_name);
        }
        self.binding_sets_created += 1;
        Ok(self.binding_sets.insert(HeadlessBindingSet { layout }))
    }

    fn destroy_binding_set(&mut self, set: GfxBindingSetHandle) {
        self.binding_sets.remove(set);
    }

    fn destroy_binding_layout(&mut self, layout: GfxBindingLayoutHandle) {
        if self.binding_sets.values().any(|set| set.layout == layout) {
            log::warn!("binding layout destroyed while binding sets still use it");
        }
        self.binding_layouts.remove(layout);
    }

    fn create_compute_pipeline(&mut self, desc: &GfxComputePipelineDesc) -> anyhow::Result<GfxComputePipelineHandle> {
        if let Some(missing) = desc.binding_layouts.iter().position(|l| !self.binding_layouts.contains_key(*l)) {
            bail!("compute pipeline '{}': unknown binding layout at index {missing}", desc.debug_name);
        }
        Ok(self.compute_pipelines.insert(desc.clone()))
    }

    fn create_rt_pipeline(&mut self, desc: &GfxRtPipelineDesc) -> anyhow::Result<GfxRtPipelineHandle> {
        if let Some(missing) = desc.global_binding_layouts.iter().position(|l| !self.binding_layouts.contains_key(*l)) {
            bail!("ray tracing pipeline '{}': unknown binding layout at slot {missing}", desc.debug_name);
        }
        Ok(self.rt_pipelines.insert(desc.clone()))
    }

    fn create_graphics_pipeline(
        &mut self,
        desc: &GfxGraphicsPipelineDesc,
        _framebuffer: GfxFramebufferHandle,
    ) -> anyhow::Result<GfxGraphicsPipelineHandle> {
        Ok(self.graphics_pipelines.insert(desc.clone()))
    }

    fn destroy_compute_pipeline(&mut self, pipeline: GfxComputePipelineHandle) {
        self.compute_pipelines.remove(pipeline);
    }

    fn destroy_rt_pipeline(&mut self, pipeline: GfxRtPipelineHandle) {
        self.rt_pipelines.remove(pipeline);
    }

    fn destroy_graphics_pipeline(&mut self, pipeline: GfxGraphicsPipelineHandle) {
        self.graphics_pipelines.remove(pipeline);
    }

    fn native_device(&self) -> Option<GfxNativeHandle> {
        self.with_native_handles.then_some(GfxNativeHandle(0xDE71CE))
    }

    fn native_queue(&self, queue: GfxQueue) -> Option<GfxNativeHandle> {
        let id = match queue {
            GfxQueue::Graphics => 0x0A,
            GfxQueue::Compute => 0x0B,
            GfxQueue::Copy => 0x0C,
        };
        self.with_native_handles.then_some(GfxNativeHandle(id))
    }

    fn native_texture(&self, texture: GfxTextureHandle) -> Option<GfxNativeHandle> {
        self.textures.get(texture).map(|t| t.native)
    }

    fn native_buffer(&self, buffer: GfxBufferHandle) -> Option<GfxNativeHandle> {
        self.buffers.get(buffer).map(|b| b.native)
    }

    fn buffer_device_address(&self, buffer: GfxBufferHandle) -> Option<u64> {
        self.buffers.get(buffer).and_then(|b| b.device_address)
    }

    fn supports_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn create_command_list(&mut self, name: &str) -> GfxCommandList {
        let native = if self.with_native_handles { Some(self.alloc_native()) } else { None };
        GfxCommandList::new(name, native)
    }

    fn execute_command_list(&mut self, cmd: &GfxCommandList) -> anyhow::Result<()> {
        if cmd.is_open() {
            bail!("command list '{}' submitted while still open", cmd.name());
        }
        for (index, command) in cmd.commands().iter().enumerate() {
            self.validate_command(command)
                .with_context(|| format!("command #{index} in '{}' is invalid", cmd.name()))?;
        }
        log::debug!("submit '{}': {} commands", cmd.name(), cmd.commands().len());
        self.submitted.push(cmd.commands().to_vec());
        Ok(())
    }

    fn wait_idle(&mut self) {
        self.wait_idle_count += 1;
    }
}

/// 记录型 shader 编译器
#[derive(Default)]
pub struct HeadlessShaderCompiler {
    shaders: SlotMap<GfxShaderHandle, GfxShaderDesc>,
    libraries: SlotMap<GfxShaderLibraryHandle, GfxShaderLibraryDesc>,
    /// 这些入口点（或源文件）编译会失败
    failing: HashSet<String>,
}
impl HeadlessShaderCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, entry_or_source: impl Into<String>) -> Self {
        self.failing.insert(entry_or_source.into());
        self
    }

    pub fn shader_desc(&self, shader: GfxShaderHandle) -> Option<&GfxShaderDesc> {
        self.shaders.get(shader)
    }

    pub fn library_desc(&self, library: GfxShaderLibraryHandle) -> Option<&GfxShaderLibraryDesc> {
        self.libraries.get(library)
    }

    #[inline]
    pub fn compiled_shader_count(&self) -> usize {
        self.shaders.len()
    }
    #[inline]
    pub fn compiled_library_count(&self) -> usize {
        self.libraries.len()
    }
}
impl GfxShaderCompiler for HeadlessShaderCompiler {
    fn compile_shader(&mut self, desc: &GfxShaderDesc) -> anyhow::Result<GfxShaderHandle> {
        if self.failing.contains(&desc.entry_point) || self.failing.contains(&desc.source) {
            bail!("failed to compile '{}' from '{}'", desc.entry_point, desc.source);
        }
        Ok(self.shaders.insert(desc.clone()))
    }

    fn compile_library(&mut self, desc: &GfxShaderLibraryDesc) -> anyhow::Result<GfxShaderLibraryHandle> {
        if self.failing.contains(&desc.source) {
            bail!("failed to compile shader library '{}'", desc.source);
        }
        Ok(self.libraries.insert(desc.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{GfxBindingSetItem, GfxBindingType, GfxShaderStages};
    use crate::commands::GfxComputeState;
    use crate::pipeline::GfxShaderMacro;

    #[test]
    fn test_submission_rejects_destroyed_binding_set() {
        let mut device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let mut compiler = HeadlessShaderCompiler::new();

        let texture = device
            .create_texture(&GfxTextureDesc::new_2d_uav(4, 4, vk::Format::R32G32B32A32_SFLOAT, "tex"))
            .unwrap();
        let layout = device
            .create_binding_layout(
                &GfxBindingLayoutDesc::new(GfxShaderStages::COMPUTE, 0, "layout").item(0, GfxBindingType::TextureUav),
            )
            .unwrap();
        let set = device
            .create_binding_set(&GfxBindingSetDesc::new(vec![GfxBindingSetItem::texture_uav(0, texture)]), layout)
            .unwrap();
        let shader = compiler
            .compile_shader(&GfxShaderDesc::compute("test.hlsl", "main", vec![GfxShaderMacro::flag("X", true)]))
            .unwrap();
        let pipeline = device
            .create_compute_pipeline(&GfxComputePipelineDesc {
                shader,
                binding_layouts: vec![layout],
                debug_name: "cs".to_string(),
            })
            .unwrap();

        let state = GfxComputeState {
            pipeline,
            bindings: vec![set],
        };
        let mut cmd = device.create_command_list("main");
        cmd.open();
        cmd.dispatch(&state, 1, 1);
        cmd.close();
        assert!(device.execute_command_list(&cmd).is_ok());

        device.destroy_binding_set(set);
        assert!(device.execute_command_list(&cmd).is_err());
        assert_eq!(device.submitted().len(), 1);
    }

    #[test]
    fn test_unsupported_format_fails() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12).with_unsupported_format(vk::Format::R8_SNORM);
        assert!(device.create_texture(&GfxTextureDesc::new_2d_uav(1, 1, vk::Format::R8_SNORM, "t")).is_err());
        assert!(device.create_texture(&GfxTextureDesc::new_2d_uav(1, 1, vk::Format::UNDEFINED, "t")).is_err());
        assert!(device.create_texture(&GfxTextureDesc::new_2d_uav(1, 1, vk::Format::R8_UNORM, "t")).is_ok());
    }

    #[test]
    fn test_without_native_handles() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12).without_native_handles();
        assert!(device.native_device().is_none());
        assert!(device.native_queue(GfxQueue::Graphics).is_none());
        assert!(device.create_command_list("cmd").native_handle().is_none());
    }

    #[test]
    fn test_compiler_failure_injection() {
        let mut compiler = HeadlessShaderCompiler::new().fail_on("broken");
        assert!(compiler.compile_shader(&GfxShaderDesc::compute("a.hlsl", "broken", vec![])).is_err());
        assert!(compiler.compile_shader(&GfxShaderDesc::compute("a.hlsl", "fine", vec![])).is_ok());
        assert_eq!(compiler.compiled_shader_count(), 1);
    }
}
