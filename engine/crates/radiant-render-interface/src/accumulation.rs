//! 逐帧累积的计数

/// 用于逐帧累积的数据
///
/// 相机移动、开启动画或者外部请求时，累积计数回到 1。
#[derive(Clone, Debug)]
pub struct AccumulationState {
    prev_view_matrix: Option<glam::Mat4>,
    accumulated_frames: u32,
    reset_requested: bool,
}
impl Default for AccumulationState {
    fn default() -> Self {
        Self {
            prev_view_matrix: None,
            accumulated_frames: 1,
            reset_requested: true,
        }
    }
}
// update
impl AccumulationState {
    /// call phase: BeforeRender-AdvanceView
    ///
    /// 返回本帧的累积帧数
    pub fn advance(&mut self, view_matrix: glam::Mat4, animations_enabled: bool, enabled: bool) -> u32 {
        self.accumulated_frames = self.accumulated_frames.saturating_add(1);

        if self.prev_view_matrix != Some(view_matrix) {
            self.reset_requested = true;
            self.prev_view_matrix = Some(view_matrix);
        }
        if animations_enabled {
            self.reset_requested = true;
        }
        if self.reset_requested || !enabled {
            self.accumulated_frames = 1;
        }
        self.accumulated_frames
    }

    #[inline]
    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    /// call phase: AfterSubmit
    #[inline]
    pub fn end_frame(&mut self) {
        self.reset_requested = false;
    }
}
// getters
impl AccumulationState {
    #[inline]
    pub fn accumulated_frames(&self) -> u32 {
        self.accumulated_frames
    }
    #[inline]
    pub fn reset_pending(&self) -> bool {
        self.reset_requested
    }
    /// shader 中累积权重
    #[inline]
    pub fn recip_accumulated_frames(&self, enabled: bool) -> f32 {
        if enabled { 1.0 / self.accumulated_frames as f32 } else { 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments_while_static() {
        let mut accum = AccumulationState::default();
        let view = glam::Mat4::IDENTITY;

        assert_eq!(accum.advance(view, false, true), 1);
        accum.end_frame();
        assert_eq!(accum.advance(view, false, true), 2);
        accum.end_frame();
        assert_eq!(accum.advance(view, false, true), 3);
        assert!((accum.recip_accumulated_frames(true) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_camera_move_resets() {
        let mut accum = AccumulationState::default();
        accum.advance(glam::Mat4::IDENTITY, false, true);
        accum.end_frame();
        accum.advance(glam::Mat4::IDENTITY, false, true);
        accum.end_frame();

        let moved = glam::Mat4::from_translation(glam::vec3(0.0, 0.0, 1.0));
        assert_eq!(accum.advance(moved, false, true), 1);
        assert!(accum.reset_pending());
    }

    #[test]
    fn test_disabled_or_animated_stays_at_one() {
        let mut accum = AccumulationState::default();
        for _ in 0..4 {
            assert_eq!(accum.advance(glam::Mat4::IDENTITY, false, false), 1);
            accum.end_frame();
        }
        for _ in 0..4 {
            assert_eq!(accum.advance(glam::Mat4::IDENTITY, true, true), 1);
            accum.end_frame();
        }
    }

    #[test]
    fn test_requested_reset() {
        let mut accum = AccumulationState::default();
        accum.advance(glam::Mat4::IDENTITY, false, true);
        accum.end_frame();
        assert_eq!(accum.advance(glam::Mat4::IDENTITY, false, true), 2);
        accum.end_frame();

        accum.request_reset();
        assert_eq!(accum.advance(glam::Mat4::IDENTITY, false, true), 1);
    }
}
