use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use slicer_core::{Job, JobSnapshot, JobState, Result, SlicerError};

struct JobEntry {
    job: Job,
    processed_file: Option<String>,
    error: Option<(String, String)>,
    snapshot: watch::Sender<JobSnapshot>,
    finished_at: Option<Instant>,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        let (snapshot, _) = watch::channel(JobSnapshot::from(&job));
        Self {
            job,
            processed_file: None,
            error: None,
            snapshot,
            finished_at: None,
        }
    }

    fn current(&self) -> JobSnapshot {
        let mut snapshot = JobSnapshot::from(&self.job);
        snapshot.processed_file = self.processed_file.clone();
        if let Some((code, message)) = &self.error {
            snapshot.error_code = Some(code.clone());
            snapshot.error = Some(message.clone());
        }
        snapshot
    }

    fn ensure_transition(&self, next: JobState) -> Result<()> {
        if self.job.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(SlicerError::InvalidStateTransition {
                from: self.job.state.to_string(),
                to: next.to_string(),
            })
        }
    }

    fn transition(&mut self, next: JobState) -> Result<JobSnapshot> {
        self.job.transition(next)?;
        if next.is_terminal() {
            self.finished_at = Some(Instant::now());
        }
        let snapshot = self.current();
        self.snapshot.send_replace(snapshot.clone());
        Ok(snapshot)
    }
}

/// 任务注册表
///
/// 保存每个任务的状态快照，并通过 watch 通道向等待方推送状态变化。
/// 终态任务在保留期过后由后台清理。
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
    retention: Duration,
}

impl JobRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// 登记新任务
    ///
    /// 同名文件已有未结束的任务时返回 `JobConflict`，
    /// 因为对象存储的键由文件名派生。
    pub async fn register(&self, job: Job) -> Result<JobSnapshot> {
        let mut jobs = self.jobs.write().await;

        if let Some(existing) = jobs
            .values()
            .find(|entry| entry.job.filename == job.filename && !entry.job.state.is_terminal())
        {
            return Err(SlicerError::JobConflict(format!(
                "文件 {} 正在由任务 {} 处理",
                job.filename, existing.job.id
            )));
        }

        let entry = JobEntry::new(job);
        let snapshot = entry.current();
        debug!("登记任务 {} ({})", snapshot.id, snapshot.filename);
        jobs.insert(snapshot.id, entry);
        Ok(snapshot)
    }

    /// 移除尚未开始分发的任务
    pub async fn discard(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(&id) {
            Some(entry) if entry.job.state == JobState::Pending => {
                jobs.remove(&id);
                Ok(())
            }
            Some(entry) => Err(SlicerError::InvalidStateTransition {
                from: entry.job.state.to_string(),
                to: "discarded".to_string(),
            }),
            None => Err(SlicerError::JobNotFound { id: id.to_string() }),
        }
    }

    pub async fn transition(&self, id: Uuid, next: JobState) -> Result<JobSnapshot> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&id)
            .ok_or_else(|| SlicerError::JobNotFound { id: id.to_string() })?;
        entry.transition(next)
    }

    /// 标记任务完成并记录产物引用
    pub async fn complete(&self, id: Uuid, processed_file: String) -> Result<JobSnapshot> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&id)
            .ok_or_else(|| SlicerError::JobNotFound { id: id.to_string() })?;
        entry.ensure_transition(JobState::Complete)?;
        entry.processed_file = Some(processed_file);
        entry.transition(JobState::Complete)
    }

    /// 标记任务失败并记录原因
    pub async fn fail(&self, id: Uuid, error: &SlicerError) -> Result<JobSnapshot> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&id)
            .ok_or_else(|| SlicerError::JobNotFound { id: id.to_string() })?;
        entry.ensure_transition(JobState::Failed)?;
        entry.error = Some((error.code().to_string(), error.to_string()));
        entry.transition(JobState::Failed)
    }

    pub async fn get(&self, id: Uuid) -> Result<JobSnapshot> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(JobEntry::current)
            .ok_or_else(|| SlicerError::JobNotFound { id: id.to_string() })
    }

    pub async fn subscribe(&self, id: Uuid) -> Result<watch::Receiver<JobSnapshot>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.snapshot.subscribe())
            .ok_or_else(|| SlicerError::JobNotFound { id: id.to_string() })
    }

    /// 等待任务进入终态
    pub async fn wait_for_terminal(&self, id: Uuid) -> Result<JobSnapshot> {
        let mut receiver = self.subscribe(id).await?;
        let snapshot = receiver
            .wait_for(|snapshot| snapshot.state.is_terminal())
            .await
            .map_err(|_| SlicerError::JobNotFound { id: id.to_string() })?;
        Ok(snapshot.clone())
    }

    /// 清理超过保留期的终态任务，返回清理数量
    pub async fn prune_expired(&self) -> usize {
        let retention = self.retention;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.finished_at {
            Some(finished_at) => finished_at.elapsed() < retention,
            None => true,
        });
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// 启动后台清理任务
    pub fn spawn_retention_sweep(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let pruned = self.prune_expired().await;
                        if pruned > 0 {
                            info!("清理了 {} 个过期任务", pruned);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("任务清理协程退出");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicer_core::StripLayout;

    fn job(filename: &str) -> Job {
        Job::new(filename, "blur", StripLayout::new(10, 10, 2).unwrap())
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let job = job("cat.png");
        let snapshot = registry.register(job.clone()).await.unwrap();

        assert_eq!(snapshot.state, JobState::Pending);
        assert_eq!(registry.get(job.id).await.unwrap().filename, "cat.png");
        assert!(matches!(
            registry.get(Uuid::new_v4()).await,
            Err(SlicerError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_same_filename_in_flight_conflicts() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let first = job("cat.png");
        registry.register(first.clone()).await.unwrap();

        let err = registry.register(job("cat.png")).await.unwrap_err();
        assert!(matches!(err, SlicerError::JobConflict(_)));

        registry.transition(first.id, JobState::Dispatched).await.unwrap();
        registry
            .fail(first.id, &SlicerError::MessageQueue("down".into()))
            .await
            .unwrap();
        registry.register(job("cat.png")).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_state_skipping() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let job = job("cat.png");
        registry.register(job.clone()).await.unwrap();

        let err = registry
            .complete(job.id, "url".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SlicerError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let job = job("cat.png");
        registry.register(job.clone()).await.unwrap();
        registry.transition(job.id, JobState::Dispatched).await.unwrap();
        registry.transition(job.id, JobState::Collecting).await.unwrap();

        let snapshot = registry
            .fail(
                job.id,
                &SlicerError::TrackerTimeout {
                    job_id: job.id.to_string(),
                    received: 1,
                    expected: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.error_code.as_deref(), Some("TRACKER_TIMEOUT"));
        assert!(snapshot.processed_file.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_terminal() {
        let registry = Arc::new(JobRegistry::new(Duration::from_secs(60)));
        let job = job("cat.png");
        registry.register(job.clone()).await.unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for_terminal(job.id).await })
        };

        for state in [JobState::Dispatched, JobState::Collecting, JobState::Merging] {
            registry.transition(job.id, state).await.unwrap();
        }
        registry
            .complete(job.id, "memory://processed/processed_cat.png".to_string())
            .await
            .unwrap();

        let snapshot = waiter.await.unwrap().unwrap();
        assert_eq!(snapshot.state, JobState::Complete);
        assert_eq!(
            snapshot.processed_file.as_deref(),
            Some("memory://processed/processed_cat.png")
        );
    }

    #[tokio::test]
    async fn test_prune_only_terminal_jobs() {
        let registry = JobRegistry::new(Duration::ZERO);
        let running = job("a.png");
        let failed = job("b.png");
        registry.register(running.clone()).await.unwrap();
        registry.register(failed.clone()).await.unwrap();
        registry.transition(failed.id, JobState::Dispatched).await.unwrap();
        registry
            .fail(failed.id, &SlicerError::Internal("x".into()))
            .await
            .unwrap();

        assert_eq!(registry.prune_expired().await, 1);
        assert!(registry.get(running.id).await.is_ok());
        assert!(registry.get(failed.id).await.is_err());
    }

    #[tokio::test]
    async fn test_discard_only_pending() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let job = job("cat.png");
        registry.register(job.clone()).await.unwrap();
        registry.discard(job.id).await.unwrap();
        assert!(registry.is_empty().await);
    }
}
