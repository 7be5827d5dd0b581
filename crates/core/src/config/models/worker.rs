use serde::{Deserialize, Serialize};

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 为空时使用主机名
    pub worker_id: String,
    pub max_concurrent_tasks: usize,
    /// 分片上传的最大尝试次数
    pub upload_max_attempts: u32,
    pub upload_retry_base_ms: u64,
    /// 完成事件发布的最大重试次数
    pub publish_max_retries: u32,
    /// 停机时等待在途任务的最长时间
    pub shutdown_grace_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: String::new(),
            max_concurrent_tasks: 4,
            upload_max_attempts: 3,
            upload_retry_base_ms: 100,
            publish_max_retries: 3,
            shutdown_grace_seconds: 30,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(anyhow::anyhow!("最大并发任务数必须大于0"));
        }

        if self.upload_max_attempts == 0 {
            return Err(anyhow::anyhow!("上传尝试次数必须大于0"));
        }

        if self.upload_retry_base_ms == 0 {
            return Err(anyhow::anyhow!("上传重试间隔必须大于0"));
        }

        Ok(())
    }

    /// 实际使用的 Worker ID，未配置时回退到主机名
    pub fn resolved_worker_id(&self) -> String {
        if !self.worker_id.is_empty() {
            return self.worker_id.clone();
        }
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "slicer-worker".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_worker_id_wins() {
        let config = WorkerConfig {
            worker_id: "worker-7".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolved_worker_id(), "worker-7");
    }

    #[test]
    fn test_fallback_worker_id_not_empty() {
        assert!(!WorkerConfig::default().resolved_worker_id().is_empty());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = WorkerConfig {
            upload_max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
