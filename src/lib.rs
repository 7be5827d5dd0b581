//! 分布式图像分片处理系统的进程入口
//!
//! 根据运行模式组装 API 服务器、Worker 或两者，并负责日志初始化与优雅关闭。

pub mod app;
pub mod common;
pub mod shutdown;

pub use app::{AppMode, Application};
pub use shutdown::ShutdownManager;
