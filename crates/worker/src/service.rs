use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use slicer_core::{
    config::WorkerConfig,
    traits::{Delivery, MessageQueue},
    CompletionEvent, Result, SlicerError, TaskMessage,
};

use crate::processor::StripProcessor;
use crate::retry::RetryPolicy;

/// 单条投递的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 分片处理成功并已回报
    Succeeded,
    /// 分片永久失败，已回报失败事件
    Failed,
    /// 消息无法解析，已丢弃
    Dropped,
    /// 暂时性错误或完成事件发布失败，已重新入队
    Requeued,
}

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    worker_id: String,
    message_queue: Arc<dyn MessageQueue>,
    processor: Arc<StripProcessor>,
    task_queue: String,
    max_concurrent_tasks: usize,
    publish_retry: RetryPolicy,
    shutdown_grace: Duration,
}

impl WorkerServiceBuilder {
    pub fn new(
        worker_id: impl Into<String>,
        message_queue: Arc<dyn MessageQueue>,
        processor: Arc<StripProcessor>,
        task_queue: impl Into<String>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            message_queue,
            processor,
            task_queue: task_queue.into(),
            max_concurrent_tasks: 4,
            publish_retry: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(30),
        }
    }

    /// 设置最大并发任务数
    pub fn max_concurrent_tasks(mut self, max_concurrent_tasks: usize) -> Self {
        self.max_concurrent_tasks = max_concurrent_tasks.max(1);
        self
    }

    /// 设置完成事件发布的重试策略
    pub fn publish_retry(mut self, publish_retry: RetryPolicy) -> Self {
        self.publish_retry = publish_retry;
        self
    }

    /// 设置停机时等待在途任务的最长时间
    pub fn shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    /// 按配置设置并发、重试与停机参数
    pub fn with_config(self, config: &WorkerConfig) -> Self {
        self.max_concurrent_tasks(config.max_concurrent_tasks)
            .publish_retry(RetryPolicy::new(
                config.publish_max_retries + 1,
                Duration::from_millis(config.upload_retry_base_ms),
            ))
            .shutdown_grace(Duration::from_secs(config.shutdown_grace_seconds))
    }

    pub fn build(self) -> WorkerService {
        WorkerService {
            worker_id: self.worker_id,
            message_queue: self.message_queue,
            processor: self.processor,
            task_queue: self.task_queue,
            semaphore: Arc::new(Semaphore::new(self.max_concurrent_tasks)),
            max_concurrent_tasks: self.max_concurrent_tasks,
            publish_retry: self.publish_retry,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

/// Worker服务：共享任务队列上的竞争消费者
///
/// 每条投递在得到终态结果（成功或永久失败）并回报之后才确认。
/// 暂时性错误重新入队一次，重新投递后仍失败则按永久失败回报。
#[derive(Clone)]
pub struct WorkerService {
    worker_id: String,
    message_queue: Arc<dyn MessageQueue>,
    processor: Arc<StripProcessor>,
    task_queue: String,
    semaphore: Arc<Semaphore>,
    max_concurrent_tasks: usize,
    publish_retry: RetryPolicy,
    shutdown_grace: Duration,
}

impl WorkerService {
    pub fn builder(
        worker_id: impl Into<String>,
        message_queue: Arc<dyn MessageQueue>,
        processor: Arc<StripProcessor>,
        task_queue: impl Into<String>,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(worker_id, message_queue, processor, task_queue)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 当前在途任务数
    pub fn running_tasks(&self) -> usize {
        self.max_concurrent_tasks - self.semaphore.available_permits()
    }

    /// 消费任务队列直到收到停止信号，然后在限定时间内等待在途任务完成
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "启动Worker服务: {}, 任务队列: {}, 最大并发: {}",
            self.worker_id, self.task_queue, self.max_concurrent_tasks
        );

        self.message_queue.declare_queue(&self.task_queue).await?;
        let mut stream = self
            .message_queue
            .consume(&self.task_queue, &self.worker_id)
            .await?;
        let mut in_flight = JoinSet::new();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("分片任务异常退出: {}", e);
                }
            }

            let permit = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Worker {} 收到停止信号", self.worker_id);
                    break;
                }
                permit = self.semaphore.clone().acquire_owned() => permit
                    .map_err(|e| SlicerError::Internal(format!("并发信号量已关闭: {e}")))?,
            };

            let delivery = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Worker {} 收到停止信号", self.worker_id);
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        error!("消费任务队列失败: {}", e);
                        return Err(e);
                    }
                    None => {
                        warn!("任务队列 {} 的消费流已结束", self.task_queue);
                        break;
                    }
                },
            };

            let service = self.clone();
            in_flight.spawn(async move {
                service.handle_delivery(delivery).await;
                drop(permit);
            });
        }

        self.drain(in_flight).await;
        info!("Worker服务已停止: {}", self.worker_id);
        Ok(())
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        info!("等待 {} 个在途任务完成...", in_flight.len());
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "等待超时，放弃 {} 个在途任务（未确认的消息将由队列重新投递）",
                in_flight.len()
            );
            in_flight.abort_all();
        }
    }

    /// 处理一条投递：执行分片任务、回报完成事件、确认消息
    pub async fn handle_delivery(&self, delivery: Delivery) -> DeliveryOutcome {
        let task = match TaskMessage::from_bytes(&delivery.data) {
            Ok(task) => task,
            Err(e) => {
                warn!("丢弃无法解析的任务消息 (tag={}): {}", delivery.delivery_tag, e);
                self.ack(&delivery).await;
                return DeliveryOutcome::Dropped;
            }
        };

        if delivery.redelivered {
            debug!(
                "任务 {} 分片 {} 为重新投递",
                task.job_id, task.part_num
            );
        }

        let (event, outcome) = match self.processor.process(&task).await {
            Err(e) if should_requeue(&e, delivery.redelivered) => {
                warn!(
                    "任务 {} 分片 {} 遇到暂时性错误，重新入队: {}",
                    task.job_id, task.part_num, e
                );
                metrics::counter!("slicer_parts_requeued_total", "code" => e.code()).increment(1);
                if let Err(e) = self.message_queue.nack(&delivery, true).await {
                    error!("拒绝消息失败: {}", e);
                }
                return DeliveryOutcome::Requeued;
            }
            Ok(key) => {
                debug!("任务 {} 分片 {} 已上传: {}", task.job_id, task.part_num, key);
                metrics::counter!("slicer_parts_processed_total").increment(1);
                (
                    CompletionEvent::success(task.job_id, task.part_num),
                    DeliveryOutcome::Succeeded,
                )
            }
            Err(e) => {
                warn!(
                    "任务 {} 分片 {} 处理失败: {}",
                    task.job_id, task.part_num, e
                );
                metrics::counter!("slicer_parts_failed_total", "code" => e.code()).increment(1);
                (
                    CompletionEvent::failure(task.job_id, task.part_num, e.to_string()),
                    DeliveryOutcome::Failed,
                )
            }
        };

        if let Err(e) = self.report(&task.callback_queue, &event).await {
            error!(
                "任务 {} 分片 {} 的完成事件发布失败，重新入队: {}",
                task.job_id, task.part_num, e
            );
            if let Err(e) = self.message_queue.nack(&delivery, true).await {
                error!("拒绝消息失败: {}", e);
            }
            return DeliveryOutcome::Requeued;
        }

        self.ack(&delivery).await;
        outcome
    }

    async fn report(&self, callback_queue: &str, event: &CompletionEvent) -> Result<()> {
        let payload = event.to_bytes()?;
        self.publish_retry
            .run("发布完成事件", || {
                self.message_queue.publish(callback_queue, &payload)
            })
            .await
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = self.message_queue.ack(delivery).await {
            error!("确认消息失败 (tag={}): {}", delivery.delivery_tag, e);
        }
    }
}

/// 暂时性错误在首次投递时重新入队
fn should_requeue(error: &SlicerError, redelivered: bool) -> bool {
    !error.is_permanent() && !redelivered
}
