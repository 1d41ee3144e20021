pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64) -> Self {
        Self { frame_id: init_frame_id }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    /// shader 常量里的帧序号只有 32 位
    #[inline]
    pub fn shader_frame_index(&self) -> u32 {
        self.frame_id as u32
    }
    #[inline]
    pub fn is_first_frame(&self) -> bool {
        self.frame_id == 0
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}]", self.frame_id)
    }
}
