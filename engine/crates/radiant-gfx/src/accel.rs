use ash::vk;

use crate::handles::GfxAccelStructHandle;

/// BLAS 中的一段三角形几何
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBlasGeometry {
    pub index_count: u32,
    pub vertex_count: u32,
    /// 不透明几何不会调用 any-hit
    pub opaque: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxBlasDesc {
    pub geometries: Vec<GfxBlasGeometry>,
    pub build_flags: vk::BuildAccelerationStructureFlagsKHR,
    pub debug_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxTlasDesc {
    pub max_instances: usize,
    pub debug_name: String,
}

/// TLAS 中的一个实例
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxTlasInstance {
    pub blas: GfxAccelStructHandle,
    pub instance_id: u32,
    pub mask: u8,
    pub transform: glam::Affine3A,
}
