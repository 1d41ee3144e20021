//! 场景接口
//!
//! 帧编排只读取场景：网格、实例、光源、包围盒与相机。场景的加载和拓扑修改不在这里。

use radiant_gfx::handles::{GfxBindingLayoutHandle, GfxBindingSetHandle, GfxBufferHandle};

use crate::constants::LightConstants;

#[derive(Clone, Debug)]
pub struct SceneGeometry {
    pub index_count: u32,
    pub vertex_count: u32,
    /// 不透明几何体跳过 any-hit
    pub opaque: bool,
}

#[derive(Clone, Debug)]
pub struct SceneMesh {
    pub name: String,
    /// 带骨骼的网格每帧都需要重建 BLAS
    pub skinned: bool,
    pub geometries: Vec<SceneGeometry>,
}

#[derive(Clone, Debug)]
pub struct SceneInstance {
    pub mesh_index: usize,
    pub transform: glam::Affine3A,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum LightKind {
    Directional = 1,
    Spot = 2,
    Point = 3,
}

#[derive(Clone, Debug)]
pub struct SceneLight {
    pub name: String,
    pub kind: LightKind,
    pub color: glam::Vec3,
    /// 方向光为 irradiance，其它为 intensity
    pub intensity: f32,
    pub direction: glam::Vec3,
    pub position: glam::Vec3,
    /// 方向光的角直径（度）
    pub angular_size: f32,
    pub radius: f32,
    pub range: f32,
}
impl SceneLight {
    pub fn directional(name: impl Into<String>, direction: glam::Vec3, irradiance: f32, angular_size: f32) -> Self {
        Self {
            name: name.into(),
            kind: LightKind::Directional,
            color: glam::Vec3::ONE,
            intensity: irradiance,
            direction: direction.normalize_or_zero(),
            position: glam::Vec3::ZERO,
            angular_size,
            radius: 0.0,
            range: 0.0,
        }
    }

    pub fn point(name: impl Into<String>, position: glam::Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            name: name.into(),
            kind: LightKind::Point,
            color: glam::Vec3::ONE,
            intensity,
            direction: glam::Vec3::NEG_Y,
            position,
            angular_size: 0.0,
            radius,
            range: 0.0,
        }
    }

    pub fn fill_constants(&self) -> LightConstants {
        LightConstants {
            direction: self.direction.to_array(),
            light_type: self.kind as u32,
            color: self.color.to_array(),
            intensity: self.intensity,
            position: self.position.to_array(),
            radius: self.radius,
            angular_size: self.angular_size.to_radians(),
            range: self.range,
            inner_angle: 0.0,
            outer_angle: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneBounds {
    pub min: glam::Vec3,
    pub max: glam::Vec3,
}

/// 场景对 GPU 暴露的资源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneGpuBuffers {
    pub instances: GfxBufferHandle,
    pub geometries: GfxBufferHandle,
    pub materials: GfxBufferHandle,
    pub bindless_layout: GfxBindingLayoutHandle,
    pub bindless_set: GfxBindingSetHandle,
}

pub trait SceneGraph {
    fn meshes(&self) -> &[SceneMesh];
    fn instances(&self) -> &[SceneInstance];
    fn lights(&self) -> &[SceneLight];
    fn bounds(&self) -> SceneBounds;
    /// 当前相机的 world-to-view 矩阵
    fn camera_view(&self) -> glam::Mat4;
    fn gpu_buffers(&self) -> SceneGpuBuffers;

    /// 推进动画与变换
    fn refresh(&mut self, frame_index: u64);
}
