use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
};
use slicer_core::{
    config::MessageQueueConfig,
    traits::{Delivery, DeliveryStream, MessageQueue},
    Result, SlicerError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// RabbitMQ消息队列实现
///
/// 整个组件生命周期内共享一条连接和一个通道，
/// 通道只在每次队列操作期间加锁。
pub struct RabbitMQMessageQueue {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    config: MessageQueueConfig,
}

impl RabbitMQMessageQueue {
    /// 创建新的RabbitMQ消息队列实例
    pub async fn new(config: MessageQueueConfig) -> Result<Self> {
        let connect = Connection::connect(&config.url, ConnectionProperties::default());
        let connection =
            tokio::time::timeout(Duration::from_secs(config.connection_timeout_seconds), connect)
                .await
                .map_err(|_| SlicerError::MessageQueue(format!("连接RabbitMQ超时: {}", config.url)))?
                .map_err(|e| SlicerError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SlicerError::MessageQueue(format!("创建通道失败: {e}")))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| SlicerError::MessageQueue(format!("设置预取数量失败: {e}")))?;

        info!("成功连接到RabbitMQ: {}", config.url);

        let queue = Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            config,
        };

        // 共享任务队列在启动时声明
        queue.declare_queue(&queue.config.task_queue).await?;

        Ok(queue)
    }

    /// 获取连接状态
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}

#[async_trait]
impl MessageQueue for RabbitMQMessageQueue {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SlicerError::MessageQueue(format!("声明队列 {queue} 失败: {e}")))?;

        debug!("队列 {} 声明成功", queue);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // 2 = persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| SlicerError::MessageQueue(format!("发布消息到队列 {queue} 失败: {e}")))?;

        debug!("消息已发布到队列: {}", queue);
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = {
            let channel = self.channel.lock().await;
            channel
                .basic_consume(
                    queue,
                    consumer_tag,
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| SlicerError::MessageQueue(format!("创建消费者失败: {e}")))?
        };

        debug!("为队列 {} 创建消费者: {}", queue, consumer_tag);

        let queue = queue.to_string();
        let stream = consumer.map(move |result| {
            result
                .map(|delivery| Delivery {
                    delivery_tag: delivery.delivery_tag,
                    queue: queue.clone(),
                    data: delivery.data,
                    redelivered: delivery.redelivered,
                })
                .map_err(|e| SlicerError::MessageQueue(format!("接收消息失败: {e}")))
        });

        Ok(stream.boxed())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| SlicerError::MessageQueue(format!("确认消息失败: {e}")))
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .basic_nack(
                delivery.delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SlicerError::MessageQueue(format!("拒绝消息失败: {e}")))
    }

    async fn delete_queue(&self, queue: &str) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await
            .map_err(|e| SlicerError::MessageQueue(format!("删除队列 {queue} 失败: {e}")))?;

        debug!("队列 {} 已删除", queue);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.is_connected() {
            debug!("RabbitMQ连接已断开，无需关闭");
            return Ok(());
        }

        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| SlicerError::MessageQueue(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}
