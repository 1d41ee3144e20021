//! Radiant GFX 层
//!
//! 对 GPU 设备做一层抽象：资源句柄（slotmap key）、资源描述符、
//! 以命令流形式记录的 [`commands::GfxCommandList`]，以及 [`device::GfxDevice`] /
//! [`device::GfxShaderCompiler`] 两个边界 trait。
//!
//! 上层（render graph、SDK 适配器、帧编排）只依赖这里的描述符与 trait，
//! 不关心具体的图形 API。[`headless`] 提供一个记录型的实现，用于测试与离屏运行。

pub mod accel;
pub mod binding;
pub mod commands;
pub mod device;
pub mod handles;
pub mod headless;
pub mod pipeline;
pub mod resources;
pub mod sampler;
