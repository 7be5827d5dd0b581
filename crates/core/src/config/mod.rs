//! 配置管理
//!
//! 配置按以下顺序叠加：内置默认值、TOML 配置文件、`SLICER_` 前缀的环境变量。
//! 各配置段在加载后统一校验，校验失败时返回带上下文的错误。

pub mod models;

pub use models::*;
