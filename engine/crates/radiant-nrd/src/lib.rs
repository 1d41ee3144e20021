//! 小波降噪（NRD）集成
//!
//! 降噪引擎对调用者是不透明的：它在创建时声明自己需要的 sampler、compute pipeline
//! 与纹理池（[`engine::InstanceDesc`]），每帧再给出一组 dispatch（[`engine::DispatchDesc`]）。
//! [`integration::NrdIntegration`] 负责把这些声明翻译为具体的 GPU 对象，并按引擎给出的顺序执行。

pub mod engine;
pub mod error;
pub mod format;
pub mod headless;
pub mod integration;
pub mod render_targets;
