//! 分片处理 Worker
//!
//! 从共享任务队列竞争消费分片任务，执行图像变换，把结果上传到对象存储，
//! 再向任务专用的完成队列回报完成事件。

pub mod processor;
pub mod retry;
pub mod service;

pub use processor::StripProcessor;
pub use retry::RetryPolicy;
pub use service::{DeliveryOutcome, WorkerService, WorkerServiceBuilder};
