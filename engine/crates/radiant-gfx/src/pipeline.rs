use ash::vk;

use crate::handles::{GfxBindingLayoutHandle, GfxShaderHandle, GfxShaderLibraryHandle};

/// 编译期宏定义，例如 `ENABLE_DENOISER=1`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GfxShaderMacro {
    pub name: String,
    pub value: String,
}
impl GfxShaderMacro {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// `name=1` 或 `name=0`
    pub fn flag(name: impl Into<String>, enabled: bool) -> Self {
        Self::new(name, if enabled { "1" } else { "0" })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxShaderStage {
    Vertex,
    Pixel,
    Compute,
}

/// 单个 shader 入口的编译请求
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxShaderDesc {
    pub source: String,
    pub entry_point: String,
    pub stage: GfxShaderStage,
    pub macros: Vec<GfxShaderMacro>,
}
impl GfxShaderDesc {
    pub fn compute(source: impl Into<String>, entry_point: impl Into<String>, macros: Vec<GfxShaderMacro>) -> Self {
        Self {
            source: source.into(),
            entry_point: entry_point.into(),
            stage: GfxShaderStage::Compute,
            macros,
        }
    }

    pub fn pixel(source: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entry_point: entry_point.into(),
            stage: GfxShaderStage::Pixel,
            macros: Vec::new(),
        }
    }
}

/// 光追 shader library：一个源文件编译出多个入口（raygen / miss / hit）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxShaderLibraryDesc {
    pub source: String,
    pub macros: Vec<GfxShaderMacro>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxComputePipelineDesc {
    pub shader: GfxShaderHandle,
    pub binding_layouts: Vec<GfxBindingLayoutHandle>,
    pub debug_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxRtHitGroup {
    pub name: String,
    pub closest_hit: String,
    pub any_hit: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxRtPipelineDesc {
    pub library: GfxShaderLibraryHandle,
    pub ray_gen: String,
    pub miss_shaders: Vec<String>,
    pub hit_groups: Vec<GfxRtHitGroup>,
    /// 按槽位顺序排列的全局 binding layout，长度在创建后固定
    pub global_binding_layouts: Vec<GfxBindingLayoutHandle>,
    pub max_payload_size: u32,
    pub debug_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxGraphicsPipelineDesc {
    pub topology: vk::PrimitiveTopology,
    pub vertex_shader: GfxShaderHandle,
    pub pixel_shader: GfxShaderHandle,
    pub binding_layouts: Vec<GfxBindingLayoutHandle>,
    pub cull_mode: vk::CullModeFlags,
    pub depth_test: bool,
    pub stencil_test: bool,
    pub debug_name: String,
}
