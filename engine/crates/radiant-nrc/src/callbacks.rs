//! 交给 SDK 的回调
//!
//! SDK 会在内部线程调用这些回调，输出前先拿到各自的锁，保证日志行不交错。

use std::alloc::Layout;
use std::sync::Mutex;

use crate::sdk::{LogLevel, MemoryEventType};

static LOG_LOCK: Mutex<()> = Mutex::new(());
static MEMORY_LOCK: Mutex<()> = Mutex::new(());

const LOG_TARGET: &str = "sdk::nrc";
const MIN_LOG_LEVEL: LogLevel = LogLevel::Info;
const ALLOCATION_ALIGN: usize = 16;

pub fn logger_callback(message: &str, level: LogLevel) {
    if level < MIN_LOG_LEVEL && level != LogLevel::Error {
        return;
    }
    // 锁中毒只说明另一个线程在打印时 panic 了，继续输出即可
    let _guard = LOG_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match level {
        LogLevel::Debug => log::debug!(target: LOG_TARGET, "{message}"),
        LogLevel::Info => log::info!(target: LOG_TARGET, "{message}"),
        LogLevel::Warning => log::warn!(target: LOG_TARGET, "{message}"),
        LogLevel::Error => log::error!(target: LOG_TARGET, "{message}"),
    }
}

pub fn memory_events_callback(event: MemoryEventType, size: usize, buffer_name: &str) {
    let _guard = MEMORY_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match event {
        MemoryEventType::Allocation => {
            log::info!(target: LOG_TARGET, "NRC SDK Memory Stats: {size} bytes allocated ({buffer_name})")
        }
        MemoryEventType::Deallocation => {
            log::info!(target: LOG_TARGET, "NRC SDK Memory Stats: {size} bytes deallocated ({buffer_name})")
        }
        MemoryEventType::MemoryStats => {
            log::info!(target: LOG_TARGET, "NRC SDK Memory Stats: {size} bytes currently allocated in total")
        }
    }
}

/// 可选的 CPU 分配器，失败时返回空指针
pub fn custom_allocate(bytes: usize) -> *mut u8 {
    match Layout::from_size_align(bytes.max(1), ALLOCATION_ALIGN) {
        // SAFETY: layout 的大小不为 0
        Ok(layout) => unsafe { std::alloc::alloc(layout) },
        Err(_) => std::ptr::null_mut(),
    }
}

/// # Safety
/// `ptr` 必须由 [`custom_allocate`] 以相同的 `bytes` 分配
pub unsafe fn custom_deallocate(ptr: *mut u8, bytes: usize) {
    if ptr.is_null() {
        return;
    }
    if let Ok(layout) = Layout::from_size_align(bytes.max(1), ALLOCATION_ALIGN) {
        unsafe { std::alloc::dealloc(ptr, layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callbacks_from_many_threads() {
        let handles = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    for _ in 0..16 {
                        logger_callback(&format!("worker {i}"), LogLevel::Info);
                        memory_events_callback(MemoryEventType::Allocation, 64, "test");
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_custom_allocator() {
        let ptr = custom_allocate(256);
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % ALLOCATION_ALIGN, 0);
        unsafe {
            ptr.write_bytes(0xAB, 256);
            custom_deallocate(ptr, 256);
            custom_deallocate(std::ptr::null_mut(), 0);
        }
    }
}
