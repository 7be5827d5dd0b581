pub mod api_observability;
pub mod app_config;
pub mod message_queue;
pub mod pipeline;
pub mod storage;
pub mod worker;

// Re-export main types for easier imports
pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use message_queue::{MessageQueueConfig, MessageQueueType};
pub use pipeline::{OutputFormat, PipelineConfig};
pub use storage::{StorageConfig, StorageType};
pub use worker::WorkerConfig;
