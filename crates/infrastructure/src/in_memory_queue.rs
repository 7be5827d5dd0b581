use async_trait::async_trait;
use futures::StreamExt;
use slicer_core::{
    traits::{Delivery, DeliveryStream, MessageQueue},
    Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// 内存消息队列实现
///
/// 使用 Tokio channels 实现，适用于单进程部署和测试。
/// 队列需先声明，发布到不存在的队列时消息被丢弃，与 RabbitMQ 默认交换机一致。
/// 多个消费者竞争同一队列；已投递但未确认的消息在 `nack(requeue=true)`
/// 时以 `redelivered = true` 重新入队。
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageQueue {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// 队列存储：队列名 -> 通道
    queues: RwLock<HashMap<String, QueueChannels>>,
    /// 已投递未确认的消息：投递标签 -> 消息
    unacked: Mutex<HashMap<u64, Delivery>>,
    next_tag: AtomicU64,
}

#[derive(Debug, Clone)]
struct QueueChannels {
    sender: mpsc::UnboundedSender<Envelope>,
    /// 使用 Arc 包装接收端，支持多个消费者
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Envelope>>>,
    /// 待投递消息数
    size: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct Envelope {
    data: Vec<u8>,
    redelivered: bool,
}

impl QueueChannels {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            size: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn send(&self, envelope: Envelope) -> bool {
        if self.sender.send(envelope).is_ok() {
            self.size.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

impl InMemoryMessageQueue {
    /// 创建新的内存消息队列实例
    pub fn new() -> Self {
        info!("创建内存消息队列");
        Self::default()
    }

    /// 获取队列通道，不存在时创建
    async fn channels(&self, queue: &str) -> QueueChannels {
        if let Some(channels) = self.inner.queues.read().await.get(queue) {
            return channels.clone();
        }

        let mut queues = self.inner.queues.write().await;
        queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                debug!("创建内存队列: {}", queue);
                QueueChannels::new()
            })
            .clone()
    }

    /// 队列中待投递的消息数
    pub async fn pending_count(&self, queue: &str) -> usize {
        self.inner
            .queues
            .read()
            .await
            .get(queue)
            .map(|channels| channels.size.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 已投递但尚未确认的消息数
    pub async fn unacked_count(&self) -> usize {
        self.inner.unacked.lock().await.len()
    }

    pub async fn queue_exists(&self, queue: &str) -> bool {
        self.inner.queues.read().await.contains_key(queue)
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.channels(queue).await;
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let queues = self.inner.queues.read().await;
        match queues.get(queue) {
            Some(channels) => {
                channels.send(Envelope {
                    data: payload.to_vec(),
                    redelivered: false,
                });
                debug!("消息已发布到内存队列: {}", queue);
            }
            None => debug!("内存队列 {} 不存在，丢弃消息", queue),
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream> {
        // 流只持有接收端，队列删除后发送端释放，recv 返回 None，流结束
        let QueueChannels { receiver, size, .. } = self.channels(queue).await;
        let inner = self.inner.clone();
        let queue = queue.to_string();

        let stream = futures::stream::unfold(
            (receiver, size, inner, queue),
            |(receiver, size, inner, queue)| async move {
                let envelope = receiver.lock().await.recv().await?;
                size.fetch_sub(1, Ordering::SeqCst);

                let delivery = Delivery {
                    delivery_tag: inner.next_tag.fetch_add(1, Ordering::SeqCst) + 1,
                    queue: queue.clone(),
                    data: envelope.data,
                    redelivered: envelope.redelivered,
                };
                inner
                    .unacked
                    .lock()
                    .await
                    .insert(delivery.delivery_tag, delivery.clone());

                Some((Ok(delivery), (receiver, size, inner, queue)))
            },
        );

        Ok(stream.boxed())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        if self
            .inner
            .unacked
            .lock()
            .await
            .remove(&delivery.delivery_tag)
            .is_none()
        {
            warn!("确认未知的投递标签: {}", delivery.delivery_tag);
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let Some(pending) = self.inner.unacked.lock().await.remove(&delivery.delivery_tag) else {
            warn!("拒绝未知的投递标签: {}", delivery.delivery_tag);
            return Ok(());
        };

        if requeue {
            let queues = self.inner.queues.read().await;
            match queues.get(&pending.queue) {
                Some(channels) => {
                    channels.send(Envelope {
                        data: pending.data,
                        redelivered: true,
                    });
                    debug!("消息已重新入队: {}", pending.queue);
                }
                None => warn!("队列 {} 已删除，丢弃重新入队的消息", pending.queue),
            }
        }
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<()> {
        if self.inner.queues.write().await.remove(queue).is_some() {
            debug!("内存队列 {} 已删除", queue);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut queues = self.inner.queues.write().await;
        let closed = queues.len();
        queues.clear();
        self.inner.unacked.lock().await.clear();
        info!("内存消息队列已关闭，释放 {} 个队列", closed);
        Ok(())
    }
}
