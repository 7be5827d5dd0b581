use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;

/// 从队列取出的一条待确认消息
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 投递标签，用于确认或拒绝
    pub delivery_tag: u64,
    /// 来源队列
    pub queue: String,
    pub data: Vec<u8>,
    /// 是否为重新投递
    pub redelivered: bool,
}

/// 消费者消息流
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// 消息队列抽象接口
///
/// 实现持有长连接，每次调用只在操作期间占用通道。
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 声明队列（幂等，已存在时不做任何事）
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// 发布消息到指定队列，不等待投递确认
    ///
    /// 队列不存在时消息被丢弃。
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()>;

    /// 以手动确认模式消费指定队列
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// 确认消息处理完成
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// 拒绝消息，`requeue` 为真时重新入队
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;

    /// 删除队列
    async fn delete_queue(&self, queue: &str) -> Result<()>;

    /// 关闭底层连接
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
