use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use slicer_core::{
    config::{AppConfig, PipelineConfig},
    traits::{BlobObject, BlobStore, MessageQueue},
    Job, JobSnapshot, Operation, Result, SlicerError,
};
use slicer_domain::{Partition, Partitioner};

use crate::dispatcher::JobDispatcher;
use crate::merger::Merger;
use crate::registry::JobRegistry;
use crate::tracker::CompletionListener;

/// 一次上传请求
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub filename: String,
    pub image: Vec<u8>,
    /// 为空时使用默认操作
    pub operation: Option<String>,
    /// 为空时使用默认分片数
    pub num_parts: Option<i64>,
}

/// 协调器配置
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub pipeline: PipelineConfig,
    pub task_queue: String,
    pub original_bucket: String,
    pub processed_bucket: String,
}

impl CoordinatorConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            pipeline: config.pipeline.clone(),
            task_queue: config.message_queue.task_queue.clone(),
            original_bucket: config.storage.original_bucket.clone(),
            processed_bucket: config.storage.processed_bucket.clone(),
        }
    }
}

/// 流水线协调器
///
/// 接收上传：校验、保存原图、切分、分发，然后在后台跟踪完成情况并合并。
/// 调用方拿到任务快照后通过 [`JobRegistry`] 查询或等待结果。
pub struct PipelineCoordinator {
    config: CoordinatorConfig,
    registry: Arc<JobRegistry>,
    launcher: Arc<JobLauncher>,
}

impl PipelineCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        message_queue: Arc<dyn MessageQueue>,
        blob_store: Arc<dyn BlobStore>,
        registry: Arc<JobRegistry>,
    ) -> Self {
        let merger = Arc::new(Merger::new(
            blob_store.clone(),
            config.processed_bucket.clone(),
            config.pipeline.output_format,
        ));
        let listener = Arc::new(CompletionListener::new(
            message_queue.clone(),
            registry.clone(),
            merger,
            Duration::from_secs(config.pipeline.tracker_timeout_seconds),
        ));
        let dispatcher = JobDispatcher::new(message_queue, registry.clone(), config.task_queue.clone());
        let launcher = Arc::new(JobLauncher {
            original_bucket: config.original_bucket.clone(),
            blob_store,
            registry: registry.clone(),
            dispatcher,
            listener,
        });

        Self {
            config,
            registry,
            launcher,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.config.pipeline
    }

    /// 提交上传，分发完成后立即返回任务快照
    ///
    /// 登记之后的步骤在独立任务中执行，调用方被取消时任务仍会走到终态。
    #[instrument(skip_all, fields(filename = %request.filename))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobSnapshot> {
        let (operation, num_parts) = self.validate(&request)?;

        let image = request.image;
        let (partition, image) = tokio::task::spawn_blocking(move || {
            let partition = Partitioner::new().split(&image, num_parts)?;
            Ok::<_, SlicerError>((partition, image))
        })
        .await
        .map_err(|e| SlicerError::Internal(format!("切分任务异常退出: {e}")))??;

        let job = Job::new(request.filename, operation, partition.layout);
        tokio::spawn(self.launcher.clone().launch(job, image, partition))
            .await
            .map_err(|e| SlicerError::Internal(format!("提交任务异常退出: {e}")))?
    }

    /// 提交并等待终态
    pub async fn submit_and_wait(&self, request: SubmitRequest) -> Result<JobSnapshot> {
        let snapshot = self.submit(request).await?;
        self.registry.wait_for_terminal(snapshot.id).await
    }

    pub async fn job(&self, id: Uuid) -> Result<JobSnapshot> {
        self.registry.get(id).await
    }

    fn validate(&self, request: &SubmitRequest) -> Result<(String, i64)> {
        let pipeline = &self.config.pipeline;

        if request.filename.is_empty() {
            return Err(SlicerError::InvalidInput("缺少文件名".to_string()));
        }
        if request.filename.contains('/') || request.filename.contains('\\') {
            return Err(SlicerError::InvalidInput(format!(
                "文件名不能包含路径分隔符: {}",
                request.filename
            )));
        }
        if !pipeline.is_allowed_file(&request.filename) {
            return Err(SlicerError::InvalidInput(format!(
                "不支持的文件类型: {} (允许: {})",
                request.filename,
                pipeline.allowed_extensions.join(", ")
            )));
        }
        if request.image.is_empty() {
            return Err(SlicerError::InvalidInput("图像内容为空".to_string()));
        }

        let num_parts = request.num_parts.unwrap_or(pipeline.default_num_parts);
        if num_parts <= 0 || num_parts > pipeline.max_num_parts {
            return Err(SlicerError::InvalidInput(format!(
                "num_parts 必须在 1..={} 之间，实际为 {}",
                pipeline.max_num_parts, num_parts
            )));
        }

        let operation = request
            .operation
            .clone()
            .filter(|op| !op.is_empty())
            .unwrap_or_else(|| pipeline.default_operation.clone());
        if pipeline.reject_unknown_operations {
            operation
                .parse::<Operation>()
                .map_err(|e| SlicerError::InvalidInput(e.to_string()))?;
        }

        Ok((operation, num_parts))
    }
}

/// 任务启动：登记、保存原图、分发并启动完成监听
struct JobLauncher {
    original_bucket: String,
    blob_store: Arc<dyn BlobStore>,
    registry: Arc<JobRegistry>,
    dispatcher: JobDispatcher,
    listener: Arc<CompletionListener>,
}

impl JobLauncher {
    async fn launch(
        self: Arc<Self>,
        job: Job,
        image: Vec<u8>,
        partition: Partition,
    ) -> Result<JobSnapshot> {
        self.registry.register(job.clone()).await?;

        if let Err(e) = self.store_original(&job, image).await {
            // 尚未分发，直接撤销
            self.registry.discard(job.id).await?;
            return Err(e);
        }

        self.dispatcher.dispatch(&job, &partition).await?;
        metrics::counter!("slicer_jobs_submitted_total").increment(1);

        let snapshot = self.registry.get(job.id).await?;
        self.spawn_listener(job);
        Ok(snapshot)
    }

    async fn store_original(&self, job: &Job, image: Vec<u8>) -> Result<()> {
        let content_type = content_type_for(&job.filename);
        self.blob_store
            .put(
                &self.original_bucket,
                &job.filename,
                BlobObject::new(image, content_type).with_checksum(),
            )
            .await
            .map_err(|e| SlicerError::UploadFailure {
                key: job.filename.clone(),
                message: e.to_string(),
            })
    }

    fn spawn_listener(&self, job: Job) {
        let listener = self.listener.clone();
        tokio::spawn(async move {
            let job_id = job.id;
            match listener.run(job).await {
                Ok(snapshot) => info!("任务 {} 结束，状态: {}", job_id, snapshot.state),
                Err(e) => error!("跟踪任务 {} 时出错: {}", job_id, e),
            }
        });
    }
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        _ => {
            warn!("无法推断文件 {} 的内容类型", filename);
            "application/octet-stream"
        }
    }
}
