//! GPU 资源句柄
//!
//! 所有句柄都是 slotmap 的 key，由具体的 [`crate::device::GfxDevice`] 分配。

use slotmap::new_key_type;

new_key_type! { pub struct GfxTextureHandle; }
new_key_type! { pub struct GfxBufferHandle; }
new_key_type! { pub struct GfxSamplerHandle; }
new_key_type! { pub struct GfxShaderHandle; }
new_key_type! { pub struct GfxShaderLibraryHandle; }
new_key_type! { pub struct GfxBindingLayoutHandle; }
new_key_type! { pub struct GfxBindingSetHandle; }
new_key_type! { pub struct GfxComputePipelineHandle; }
new_key_type! { pub struct GfxRtPipelineHandle; }
new_key_type! { pub struct GfxGraphicsPipelineHandle; }
new_key_type! { pub struct GfxAccelStructHandle; }
new_key_type! { pub struct GfxFramebufferHandle; }
