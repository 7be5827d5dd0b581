use std::sync::Arc;

use tracing::{debug, info, instrument};

use slicer_core::{
    traits::MessageQueue, Job, JobState, Result, TaskMessage,
};
use slicer_domain::Partition;

use crate::registry::JobRegistry;

/// 分片任务分发器
///
/// 先声明共享任务队列和任务专用的完成队列，再发布分片任务，
/// 保证任务和完成事件都有队列承接。发布不等待投递确认。
pub struct JobDispatcher {
    message_queue: Arc<dyn MessageQueue>,
    registry: Arc<JobRegistry>,
    task_queue: String,
}

impl JobDispatcher {
    pub fn new(
        message_queue: Arc<dyn MessageQueue>,
        registry: Arc<JobRegistry>,
        task_queue: impl Into<String>,
    ) -> Self {
        Self {
            message_queue,
            registry,
            task_queue: task_queue.into(),
        }
    }

    /// 分发任务的全部分片，返回发布的任务数
    ///
    /// 任务进入 `Dispatched` 之后的任何失败都会把任务标记为 `Failed`。
    #[instrument(skip_all, fields(job_id = %job.id, num_parts = job.num_parts()))]
    pub async fn dispatch(&self, job: &Job, partition: &Partition) -> Result<usize> {
        self.registry.transition(job.id, JobState::Dispatched).await?;

        match self.publish_all(job, partition).await {
            Ok(published) => {
                metrics::counter!("slicer_parts_dispatched_total").increment(published as u64);
                info!("任务 {} 已分发 {} 个分片", job.id, published);
                Ok(published)
            }
            Err(e) => {
                self.registry.fail(job.id, &e).await?;
                Err(e)
            }
        }
    }

    async fn publish_all(&self, job: &Job, partition: &Partition) -> Result<usize> {
        self.message_queue.declare_queue(&self.task_queue).await?;
        let completion_queue = job.completion_queue();
        self.message_queue.declare_queue(&completion_queue).await?;
        debug!("完成队列 {} 已就绪", completion_queue);

        for (index, strip) in partition.strips.iter().enumerate() {
            let task = TaskMessage::for_part(job, index as u32, strip);
            self.message_queue
                .publish(&self.task_queue, &task.to_bytes()?)
                .await?;
        }

        Ok(partition.strips.len())
    }
}
