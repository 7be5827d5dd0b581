//! # 数据模型
//!
//! 定义图像分片流水线的核心数据结构。
//!
//! ## 核心模型
//!
//! ### StripLayout - 分片布局
//! 描述图像按行切分为水平条带的方式，保证条带高度之和等于图像高度。
//!
//! ### Job - 处理任务
//! 一次上传请求对应一个任务，拥有专用的完成队列和状态机。
//!
//! ### TaskMessage / CompletionEvent - 队列消息
//! 任务队列与完成队列上的 JSON 消息格式。
//!
//! ### Operation - 图像操作
//! 封闭的变换操作集合。
//!
//! ## 状态管理
//!
//! ```text
//! Pending → Dispatched → Collecting → Merging → Complete
//!               ↓            ↓           ↓
//!             Failed       Failed      Failed
//! ```

pub mod job;
pub mod layout;
pub mod message;
pub mod operation;

pub use job::*;
pub use layout::*;
pub use message::*;
pub use operation::*;
