//! 光追 pipeline 的逻辑 binding 槽位
//!
//! 槽位的数量和顺序在创建 pipeline 时固定；每次 dispatch 只改变槽位上绑定的内容。
//! 未激活的子系统对应的槽位留空，解析时由空 binding 填充，
//! 这样所有技术组合共享同一个 pipeline 接口形状。

use std::fmt::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingSlot {
    Globals,
    Denoiser,
    NeuralCache,
    SpatialCache,
    Bindless,
}
impl BindingSlot {
    pub const COUNT: usize = 5;
    pub const ALL: [BindingSlot; Self::COUNT] =
        [Self::Globals, Self::Denoiser, Self::NeuralCache, Self::SpatialCache, Self::Bindless];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 对应的 register space
    #[inline]
    pub const fn register_space(self) -> u32 {
        self as u32
    }
}
impl Display for BindingSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Globals => "Globals",
            Self::Denoiser => "Denoiser",
            Self::NeuralCache => "NeuralCache",
            Self::SpatialCache => "SpatialCache",
            Self::Bindless => "Bindless",
        };
        write!(f, "{name}")
    }
}

/// 逻辑槽位到 binding（layout 或 set）的稀疏映射
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingSlots<T> {
    slots: [Option<T>; BindingSlot::COUNT],
}
impl<T> Default for BindingSlots<T> {
    fn default() -> Self {
        Self {
            slots: [None, None, None, None, None],
        }
    }
}
impl<T: Copy> BindingSlots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with(mut self, slot: BindingSlot, value: T) -> Self {
        self.set(slot, value);
        self
    }

    #[inline]
    pub fn set(&mut self, slot: BindingSlot, value: T) {
        self.slots[slot.index()] = Some(value);
    }

    #[inline]
    pub fn set_or_clear(&mut self, slot: BindingSlot, value: Option<T>) {
        self.slots[slot.index()] = value;
    }

    #[inline]
    pub fn clear(&mut self, slot: BindingSlot) {
        self.slots[slot.index()] = None;
    }

    #[inline]
    pub fn get(&self, slot: BindingSlot) -> Option<T> {
        self.slots[slot.index()]
    }

    #[inline]
    pub fn is_active(&self, slot: BindingSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    /// 按槽位顺序展开，空槽位由 `empty` 对应位置的值填充
    pub fn resolve(&self, empty: &[T; BindingSlot::COUNT]) -> Vec<T> {
        BindingSlot::ALL.iter().map(|slot| self.get(*slot).unwrap_or(empty[slot.index()])).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_slots_fall_back_to_empty() {
        let empty = [100, 101, 102, 103, 104];
        let slots = BindingSlots::new().with(BindingSlot::Globals, 0).with(BindingSlot::SpatialCache, 3);

        assert_eq!(slots.resolve(&empty), vec![0, 101, 102, 3, 104]);
        assert!(slots.is_active(BindingSlot::SpatialCache));
        assert!(!slots.is_active(BindingSlot::NeuralCache));
    }

    #[test]
    fn test_clear_slot() {
        let mut slots = BindingSlots::new().with(BindingSlot::Denoiser, 7u32);
        slots.clear(BindingSlot::Denoiser);
        assert_eq!(slots.get(BindingSlot::Denoiser), None);
    }
}
