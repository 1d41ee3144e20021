//! 路径追踪示例程序
//!
//! [`pathtracer::Pathtracer`] 负责每帧的编排：选择主技术（参考路径追踪 / NRC / SHARC）、
//! 维护加速结构与 binding、驱动降噪与 tonemap。场景与 UI 设置通过
//! [`radiant_render_interface`] 中的接口传入。

pub mod app_config;
pub mod demo_scene;
pub mod pathtracer;
