//! 资源依赖与同步
//!
//! 帧编排是一条顺序执行的命令流，这里不做 pass 重排，只负责两件事：
//!
//! 1. **Hazard 跟踪**：每次 dispatch 之前声明它对资源的访问意图
//!    （[`access::RgDispatchAccess`]），[`hazard_tracker::RgHazardTracker`]
//!    据此与资源的上一个状态比较，自动插入 barrier。访问意图可以声明
//!    "与某个兄弟 dispatch 之间不需要顺序"，此时两者之间的 barrier 会被省略。
//! 2. **Binding set 缓存**：[`binding_cache::RgBindingCache`] 以
//!    `(layout, 有序资源列表)` 为 key 复用 binding set，容量有上限，按 LRU 淘汰。
//!
//! # 使用示例
//!
//! ```ignore
//! let access = RgDispatchAccess::new("nrc-update")
//!     .read_write_buffer(query_path_info, RgStage::RayTracing)
//!     .unordered_with("nrc-query");
//! tracker.prepare_dispatch(&mut cmd, &access);
//! cmd.dispatch_rays(&state, width, height);
//! ```

pub mod access;
pub mod barrier;
pub mod binding_cache;
pub mod hazard_tracker;
pub mod resource_state;

pub use access::{RgAccess, RgDispatchAccess, RgStage};
pub use barrier::{BarrierCalculator, BufferBarrierDesc, ImageBarrierDesc, PassBarriers};
pub use binding_cache::RgBindingCache;
pub use hazard_tracker::RgHazardTracker;
pub use resource_state::{RgBufferState, RgImageState};
