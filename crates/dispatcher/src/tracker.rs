//! 完成跟踪
//!
//! [`CompletionTracker`] 是单个任务的纯状态机：记录已成功的分片索引集合，
//! 判断任务何时完成或失败。[`CompletionListener`] 在任务专用的完成队列上
//! 驱动它，并且是唯一可以把任务标记为 `Complete` 的组件。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use slicer_core::{
    traits::MessageQueue, CompletionEvent, Job, JobSnapshot, JobState, Result, SlicerError,
};

use crate::merger::Merger;
use crate::registry::JobRegistry;

/// 记录一条完成事件后的结果
#[derive(Debug)]
pub enum TrackerProgress {
    /// 新分片已记录，仍在等待其余分片
    Accepted,
    /// 重复投递，已忽略
    Duplicate,
    /// 不属于本任务或索引越界，已忽略
    Ignored,
    /// 全部分片已到齐
    Complete,
    /// 有分片永久失败
    Failed(SlicerError),
}

/// 单个任务的完成状态
#[derive(Debug)]
pub struct CompletionTracker {
    job_id: Uuid,
    expected: u32,
    received: BTreeSet<u32>,
    finished: bool,
}

impl CompletionTracker {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id,
            expected: job.num_parts(),
            received: BTreeSet::new(),
            finished: false,
        }
    }

    pub fn record(&mut self, event: &CompletionEvent) -> TrackerProgress {
        if self.finished {
            return TrackerProgress::Ignored;
        }

        if event.job_id != self.job_id {
            warn!(
                "任务 {} 的完成队列收到其他任务 {} 的事件",
                self.job_id, event.job_id
            );
            return TrackerProgress::Ignored;
        }

        if event.part_num >= self.expected {
            warn!(
                "任务 {} 收到越界的分片索引 {} (共 {} 个)",
                self.job_id, event.part_num, self.expected
            );
            return TrackerProgress::Ignored;
        }

        if !event.is_success() {
            self.finished = true;
            return TrackerProgress::Failed(SlicerError::PartFailed {
                part_num: event.part_num,
                reason: event
                    .error
                    .clone()
                    .unwrap_or_else(|| "未知错误".to_string()),
            });
        }

        if !self.received.insert(event.part_num) {
            return TrackerProgress::Duplicate;
        }

        if self.is_complete() {
            self.finished = true;
            TrackerProgress::Complete
        } else {
            TrackerProgress::Accepted
        }
    }

    pub fn received(&self) -> usize {
        self.received.len()
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() == self.expected as usize
    }

    /// 尚未收到的分片索引
    pub fn missing(&self) -> Vec<u32> {
        (0..self.expected)
            .filter(|index| !self.received.contains(index))
            .collect()
    }

    fn timeout_error(&self) -> SlicerError {
        SlicerError::TrackerTimeout {
            job_id: self.job_id.to_string(),
            received: self.received(),
            expected: self.expected,
        }
    }
}

/// 完成队列监听器
pub struct CompletionListener {
    message_queue: Arc<dyn MessageQueue>,
    registry: Arc<JobRegistry>,
    merger: Arc<Merger>,
    timeout: Duration,
}

impl CompletionListener {
    pub fn new(
        message_queue: Arc<dyn MessageQueue>,
        registry: Arc<JobRegistry>,
        merger: Arc<Merger>,
        timeout: Duration,
    ) -> Self {
        Self {
            message_queue,
            registry,
            merger,
            timeout,
        }
    }

    /// 跟踪任务直到终态，返回最终快照
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn run(&self, job: Job) -> Result<JobSnapshot> {
        self.registry.transition(job.id, JobState::Collecting).await?;

        let outcome = self.collect(&job).await;

        let completion_queue = job.completion_queue();
        if let Err(e) = self.message_queue.delete_queue(&completion_queue).await {
            warn!("删除完成队列 {} 失败: {}", completion_queue, e);
        }

        let snapshot = match outcome {
            Ok(()) => self.merge(&job).await?,
            Err(e) => {
                warn!("任务 {} 失败: {}", job.id, e);
                metrics::counter!("slicer_jobs_failed_total", "code" => e.code()).increment(1);
                self.registry.fail(job.id, &e).await?
            }
        };

        Ok(snapshot)
    }

    /// 消费完成事件直到全部分片到齐、出现失败或超时
    async fn collect(&self, job: &Job) -> Result<()> {
        let completion_queue = job.completion_queue();
        let consumer_tag = format!("tracker-{}", job.id);
        let mut stream = self
            .message_queue
            .consume(&completion_queue, &consumer_tag)
            .await?;

        let mut tracker = CompletionTracker::new(job);
        let deadline = Instant::now() + self.timeout;

        loop {
            let delivery = match tokio::time::timeout_at(deadline, stream.next()).await {
                Err(_) => {
                    warn!(
                        "任务 {} 等待超时，缺失分片: {:?}",
                        job.id,
                        tracker.missing()
                    );
                    return Err(tracker.timeout_error());
                }
                Ok(None) => {
                    return Err(SlicerError::MessageQueue(format!(
                        "完成队列 {completion_queue} 已关闭"
                    )));
                }
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(delivery))) => delivery,
            };

            let event = CompletionEvent::from_bytes(&delivery.data);
            if let Err(e) = self.message_queue.ack(&delivery).await {
                error!("确认完成事件失败: {}", e);
            }

            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("忽略无法解析的完成事件: {}", e);
                    continue;
                }
            };

            match tracker.record(&event) {
                TrackerProgress::Accepted => debug!(
                    "任务 {} 分片 {} 已完成 ({}/{})",
                    job.id,
                    event.part_num,
                    tracker.received(),
                    tracker.expected()
                ),
                TrackerProgress::Duplicate => {
                    debug!("任务 {} 分片 {} 重复完成，忽略", job.id, event.part_num)
                }
                TrackerProgress::Ignored => {}
                TrackerProgress::Complete => {
                    info!("任务 {} 全部 {} 个分片已完成", job.id, tracker.expected());
                    return Ok(());
                }
                TrackerProgress::Failed(e) => return Err(e),
            }
        }
    }

    async fn merge(&self, job: &Job) -> Result<JobSnapshot> {
        self.registry.transition(job.id, JobState::Merging).await?;

        match self.merger.merge(job).await {
            Ok(processed_file) => {
                info!("任务 {} 处理完成: {}", job.id, processed_file);
                metrics::counter!("slicer_jobs_completed_total").increment(1);
                self.registry.complete(job.id, processed_file).await
            }
            Err(e) => {
                error!("任务 {} 合并失败: {}", job.id, e);
                metrics::counter!("slicer_jobs_failed_total", "code" => e.code()).increment(1);
                self.registry.fail(job.id, &e).await
            }
        }
    }
}
