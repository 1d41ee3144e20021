//! Radiant 工具集
//!
//! 提供日志初始化、工作区路径管理以及 TOML 配置加载等通用工具。
//!
//! # RadiantPath
//! 基于工作区根目录的统一路径管理，避免硬编码相对路径。
//!
//! # 配置
//! 所有运行时配置（窗口尺寸、渲染设置等）均以 TOML 形式保存，见 [`config`]。

pub mod config;
pub mod init_log;
pub mod path;
