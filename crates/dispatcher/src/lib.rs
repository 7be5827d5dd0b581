//! 分片流水线的协调端
//!
//! 分发分片任务、跟踪完成事件、合并结果，并维护任务状态注册表。

pub mod coordinator;
pub mod dispatcher;
pub mod merger;
pub mod registry;
pub mod tracker;

pub use coordinator::{CoordinatorConfig, PipelineCoordinator, SubmitRequest};
pub use dispatcher::JobDispatcher;
pub use merger::Merger;
pub use registry::JobRegistry;
pub use tracker::{CompletionListener, CompletionTracker, TrackerProgress};
