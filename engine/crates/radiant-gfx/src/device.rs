//! GPU 设备与 shader 编译器的边界 trait

use crate::accel::{GfxBlasDesc, GfxTlasDesc};
use crate::binding::{GfxBindingLayoutDesc, GfxBindingSetDesc};
use crate::commands::GfxCommandList;
use crate::handles::*;
use crate::pipeline::{
    GfxComputePipelineDesc, GfxGraphicsPipelineDesc, GfxRtPipelineDesc, GfxShaderDesc, GfxShaderLibraryDesc,
};
use crate::resources::{GfxBufferDesc, GfxTextureDesc};
use crate::sampler::GfxSamplerDesc;

/// 底层图形 API，启动时确定，之后不再变化
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsApi {
    D3d12,
    Vulkan,
}

/// 原生对象（device、queue、command list、resource）的不透明指针
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxNativeHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxQueue {
    Graphics,
    Compute,
    Copy,
}

/// GPU 设备
///
/// 资源创建失败返回 `Err`，由调用者决定是禁用功能还是向上传播。
pub trait GfxDevice {
    fn graphics_api(&self) -> GraphicsApi;

    // Resource API
    fn create_texture(&mut self, desc: &GfxTextureDesc) -> anyhow::Result<GfxTextureHandle>;
    fn create_buffer(&mut self, desc: &GfxBufferDesc) -> anyhow::Result<GfxBufferHandle>;
    /// 把外部（例如 SDK）分配的原生 buffer 包装成句柄，设备不拥有其内存
    fn import_native_buffer(
        &mut self,
        native: GfxNativeHandle,
        desc: &GfxBufferDesc,
    ) -> anyhow::Result<GfxBufferHandle>;
    fn create_sampler(&mut self, desc: &GfxSamplerDesc) -> anyhow::Result<GfxSamplerHandle>;
    fn create_blas(&mut self, desc: &GfxBlasDesc) -> anyhow::Result<GfxAccelStructHandle>;
    fn create_tlas(&mut self, desc: &GfxTlasDesc) -> anyhow::Result<GfxAccelStructHandle>;

    fn destroy_texture(&mut self, texture: GfxTextureHandle);
    fn destroy_buffer(&mut self, buffer: GfxBufferHandle);
    fn destroy_sampler(&mut self, sampler: GfxSamplerHandle);
    fn destroy_accel_struct(&mut self, accel: GfxAccelStructHandle);

    fn texture_desc(&self, texture: GfxTextureHandle) -> Option<&GfxTextureDesc>;
    fn buffer_desc(&self, buffer: GfxBufferHandle) -> Option<&GfxBufferDesc>;

    // Binding API
    fn create_binding_layout(&mut self, desc: &GfxBindingLayoutDesc) -> anyhow::Result<GfxBindingLayoutHandle>;
    fn create_binding_set(
        &mut self,
        desc: &GfxBindingSetDesc,
        layout: GfxBindingLayoutHandle,
    ) -> anyhow::Result<GfxBindingSetHandle>;
    fn destroy_binding_set(&mut self, set: GfxBindingSetHandle);
    /// 调用者保证已经没有 pipeline 或 binding set 引用这个 layout
    fn destroy_binding_layout(&mut self, layout: GfxBindingLayoutHandle);

    // Pipeline API
    fn create_compute_pipeline(&mut self, desc: &GfxComputePipelineDesc) -> anyhow::Result<GfxComputePipelineHandle>;
    fn create_rt_pipeline(&mut self, desc: &GfxRtPipelineDesc) -> anyhow::Result<GfxRtPipelineHandle>;
    fn create_graphics_pipeline(
        &mut self,
        desc: &GfxGraphicsPipelineDesc,
        framebuffer: GfxFramebufferHandle,
    ) -> anyhow::Result<GfxGraphicsPipelineHandle>;
    fn destroy_compute_pipeline(&mut self, pipeline: GfxComputePipelineHandle);
    fn destroy_rt_pipeline(&mut self, pipeline: GfxRtPipelineHandle);
    fn destroy_graphics_pipeline(&mut self, pipeline: GfxGraphicsPipelineHandle);

    // Native interop
    fn native_device(&self) -> Option<GfxNativeHandle>;
    fn native_queue(&self, queue: GfxQueue) -> Option<GfxNativeHandle>;
    fn native_texture(&self, texture: GfxTextureHandle) -> Option<GfxNativeHandle>;
    fn native_buffer(&self, buffer: GfxBufferHandle) -> Option<GfxNativeHandle>;
    fn buffer_device_address(&self, buffer: GfxBufferHandle) -> Option<u64>;
    fn supports_extension(&self, name: &str) -> bool;

    // Submission
    fn create_command_list(&mut self, name: &str) -> GfxCommandList;
    fn execute_command_list(&mut self, cmd: &GfxCommandList) -> anyhow::Result<()>;
    fn wait_idle(&mut self);
}

/// Shader 编译器
pub trait GfxShaderCompiler {
    fn compile_shader(&mut self, desc: &GfxShaderDesc) -> anyhow::Result<GfxShaderHandle>;
    fn compile_library(&mut self, desc: &GfxShaderLibraryDesc) -> anyhow::Result<GfxShaderLibraryHandle>;
}
