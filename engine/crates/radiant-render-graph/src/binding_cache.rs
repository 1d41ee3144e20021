//! Binding set 缓存
//!
//! 以 (layout, 资源组合) 为键，复用已经创建的 binding set。
//! 容量有限，超出时按最近最少使用淘汰。被淘汰的 set 可能还被未提交的命令引用，
//! 要等提交之后调用 [`RgBindingCache::release_retired`] 才真正销毁。

use indexmap::IndexMap;

use radiant_gfx::binding::GfxBindingSetDesc;
use radiant_gfx::device::GfxDevice;
use radiant_gfx::handles::{GfxBindingLayoutHandle, GfxBindingSetHandle};

type CacheKey = (GfxBindingLayoutHandle, GfxBindingSetDesc);

pub struct RgBindingCache {
    capacity: usize,
    /// 越靠后越新
    entries: IndexMap<CacheKey, GfxBindingSetHandle>,
    /// 已淘汰、等待提交后销毁
    retired: Vec<GfxBindingSetHandle>,

    hits: u64,
    misses: u64,
}

impl RgBindingCache {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: IndexMap::new(),
            retired: Vec::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// 查找或创建 binding set
    pub fn get_or_create(
        &mut self,
        device: &mut dyn GfxDevice,
        layout: GfxBindingLayoutHandle,
        desc: &GfxBindingSetDesc,
    ) -> anyhow::Result<GfxBindingSetHandle> {
        let key = (layout, desc.clone());
        if let Some(set) = self.entries.shift_remove(&key) {
            self.hits += 1;
            self.entries.insert(key, set);
            return Ok(set);
        }

        self.misses += 1;
        let set = device.create_binding_set(desc, layout)?;
        if self.entries.len() >= self.capacity {
            if let Some((_, evicted)) = self.entries.shift_remove_index(0) {
                log::debug!("binding cache full ({}), evicting least recently used set", self.capacity);
                self.retired.push(evicted);
            }
        }
        self.entries.insert(key, set);
        Ok(set)
    }

    /// 提交之后调用，销毁本帧淘汰的 binding set
    pub fn release_retired(&mut self, device: &mut dyn GfxDevice) {
        for set in self.retired.drain(..) {
            device.destroy_binding_set(set);
        }
    }

    /// 销毁所有缓存的 binding set；调用者保证 GPU 已经空闲
    pub fn clear(&mut self, device: &mut dyn GfxDevice) {
        self.release_retired(device);
        for (_, set) in self.entries.drain(..) {
            device.destroy_binding_set(set);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl Default for RgBindingCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
