use std::sync::Arc;
use tracing::{debug, info};

use slicer_core::{
    config::{MessageQueueConfig, MessageQueueType, StorageConfig, StorageType},
    traits::{BlobStore, MessageQueue},
    Result, SlicerError,
};

use crate::{InMemoryBlobStore, InMemoryMessageQueue, RabbitMQMessageQueue, S3BlobStore};

pub struct MessageQueueFactory;

impl MessageQueueFactory {
    pub async fn create(config: &MessageQueueConfig) -> Result<Arc<dyn MessageQueue>> {
        debug!("Creating message queue with type: {:?}", config.r#type);
        Self::validate_config(config)?;

        match config.r#type {
            MessageQueueType::Rabbitmq => {
                info!("Initializing RabbitMQ message queue");
                let rabbitmq = RabbitMQMessageQueue::new(config.clone()).await?;
                Ok(Arc::new(rabbitmq))
            }
            MessageQueueType::InMemory => {
                info!("Initializing in-memory message queue");
                let queue = InMemoryMessageQueue::new();
                queue.declare_queue(&config.task_queue).await?;
                Ok(Arc::new(queue))
            }
        }
    }

    pub fn validate_config(config: &MessageQueueConfig) -> Result<()> {
        if config.task_queue.is_empty() {
            return Err(SlicerError::Configuration("任务队列名称不能为空".to_string()));
        }

        if config.r#type == MessageQueueType::Rabbitmq
            && !config.url.starts_with("amqp://")
            && !config.url.starts_with("amqps://")
        {
            return Err(SlicerError::Configuration(
                "RabbitMQ URL必须以amqp://或amqps://开头".to_string(),
            ));
        }

        Ok(())
    }

    pub fn get_type_string(queue_type: &MessageQueueType) -> &'static str {
        match queue_type {
            MessageQueueType::Rabbitmq => "rabbitmq",
            MessageQueueType::InMemory => "in_memory",
        }
    }

    pub fn parse_type_string(type_str: &str) -> Result<MessageQueueType> {
        match type_str.to_lowercase().as_str() {
            "rabbitmq" => Ok(MessageQueueType::Rabbitmq),
            "in_memory" => Ok(MessageQueueType::InMemory),
            _ => Err(SlicerError::Configuration(format!(
                "不支持的消息队列类型: {type_str}，支持的类型: rabbitmq, in_memory"
            ))),
        }
    }
}

pub struct BlobStoreFactory;

impl BlobStoreFactory {
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
        match config.r#type {
            StorageType::S3 => {
                info!("Initializing S3 blob store");
                Ok(Arc::new(S3BlobStore::new(config).await?))
            }
            StorageType::Memory => {
                info!("Initializing in-memory blob store");
                Ok(Arc::new(InMemoryBlobStore::new()))
            }
        }
    }
}
