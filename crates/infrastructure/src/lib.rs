//! 基础设施实现：消息队列与对象存储

pub mod blob_store;
pub mod factory;
pub mod in_memory_queue;
pub mod message_queue;

pub use blob_store::*;
pub use factory::*;
pub use in_memory_queue::InMemoryMessageQueue;
pub use message_queue::RabbitMQMessageQueue;
