//! 神经辐射缓存（NRC）集成
//!
//! NRC SDK 通过 [`sdk::NrcSdk`] 接入，对帧编排暴露统一的 [`integration::NrcIntegration`]：
//!
//! ```text
//! Uninitialized -> Initialized -> Configured -> (BegunFrame -> Resolved -> EndedFrame) -> ...
//! ```
//!
//! 具体后端（[`d3d12::NrcD3d12Integration`] / [`vulkan::NrcVulkanIntegration`]）在启动时由
//! [`integration::create_nrc_integration`] 根据图形 API 选定，之后不再变化。

pub mod buffers;
pub mod callbacks;
pub mod d3d12;
pub mod error;
pub mod headless;
pub mod integration;
pub mod sdk;
pub mod settings;
pub mod vulkan;

pub use error::NrcError;
pub use integration::{NrcIntegration, NrcState, create_nrc_integration};
