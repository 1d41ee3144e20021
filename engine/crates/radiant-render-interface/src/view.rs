//! 平面视图：viewport + 相机矩阵 + 像素抖动

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// 与 shader 中 `PlanarViewConstants` 布局一致
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct PlanarViewConstants {
    pub mat_world_to_view: [f32; 16],
    pub mat_view_to_clip: [f32; 16],
    pub mat_world_to_clip: [f32; 16],
    pub mat_clip_to_world: [f32; 16],

    pub viewport_origin: [f32; 2],
    pub viewport_size: [f32; 2],
    pub viewport_size_inv: [f32; 2],
    pub pixel_offset: [f32; 2],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanarView {
    viewport: Vec2,
    world_to_view: Mat4,
    view_to_clip: Mat4,
    pixel_offset: Vec2,
}
impl Default for PlanarView {
    fn default() -> Self {
        Self {
            viewport: Vec2::ONE,
            world_to_view: Mat4::IDENTITY,
            view_to_clip: Mat4::IDENTITY,
            pixel_offset: Vec2::ZERO,
        }
    }
}
// new & init
impl PlanarView {
    /// 垂直视角 45°，无限远平面的 reverse-z 透视投影
    pub const FOV_Y: f32 = std::f32::consts::FRAC_PI_4;
    pub const Z_NEAR: f32 = 0.1;

    pub fn new(width: u32, height: u32, world_to_view: Mat4) -> Self {
        let mut view = Self::default();
        view.set_viewport(width, height);
        view.set_matrices(world_to_view, Self::perspective(width, height));
        view
    }

    pub fn perspective(width: u32, height: u32) -> Mat4 {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        Mat4::perspective_infinite_reverse_rh(Self::FOV_Y, aspect, Self::Z_NEAR)
    }
}
// update
impl PlanarView {
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Vec2::new(width.max(1) as f32, height.max(1) as f32);
    }

    pub fn set_matrices(&mut self, world_to_view: Mat4, view_to_clip: Mat4) {
        self.world_to_view = world_to_view;
        self.view_to_clip = view_to_clip;
    }

    pub fn set_pixel_offset(&mut self, offset: Vec2) {
        self.pixel_offset = offset;
    }
}
// getters
impl PlanarView {
    #[inline]
    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }
    #[inline]
    pub fn view_matrix(&self) -> Mat4 {
        self.world_to_view
    }
    #[inline]
    pub fn projection_matrix(&self) -> Mat4 {
        self.view_to_clip
    }
    #[inline]
    pub fn pixel_offset(&self) -> Vec2 {
        self.pixel_offset
    }
    #[inline]
    pub fn view_origin(&self) -> Vec3 {
        self.world_to_view.inverse().w_axis.truncate()
    }

    pub fn fill_constants(&self) -> PlanarViewConstants {
        let world_to_clip = self.view_to_clip * self.world_to_view;
        PlanarViewConstants {
            mat_world_to_view: self.world_to_view.to_cols_array(),
            mat_view_to_clip: self.view_to_clip.to_cols_array(),
            mat_world_to_clip: world_to_clip.to_cols_array(),
            mat_clip_to_world: world_to_clip.inverse().to_cols_array(),
            viewport_origin: [0.0, 0.0],
            viewport_size: self.viewport.to_array(),
            viewport_size_inv: self.viewport.recip().to_array(),
            pixel_offset: self.pixel_offset.to_array(),
        }
    }
}

/// Halton(2, 3) 序列生成的像素抖动，范围 [-0.5, 0.5)
pub fn halton_jitter(frame_index: u32) -> Vec2 {
    fn halton(mut index: u32, base: u32) -> f32 {
        let mut result = 0.0;
        let mut f = 1.0;
        while index > 0 {
            f /= base as f32;
            result += f * (index % base) as f32;
            index /= base;
        }
        result
    }
    let i = (frame_index % 16) + 1;
    Vec2::new(halton(i, 2) - 0.5, halton(i, 3) - 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_origin() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let view = PlanarView::new(64, 32, Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y));
        assert!(view.view_origin().abs_diff_eq(eye, 1e-4));

        let constants = view.fill_constants();
        assert_eq!(constants.viewport_size, [64.0, 32.0]);
        assert_eq!(constants.viewport_size_inv, [1.0 / 64.0, 1.0 / 32.0]);
    }

    #[test]
    fn test_jitter_range() {
        for frame in 0..32 {
            let j = halton_jitter(frame);
            assert!(j.x >= -0.5 && j.x < 0.5 && j.y >= -0.5 && j.y < 0.5);
        }
    }
}
