use serde::{Deserialize, Serialize};

/// Blob store type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    #[default]
    Memory,
    S3,
}

/// Blob store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub r#type: StorageType,
    /// 原始上传图像所在的桶
    pub original_bucket: String,
    /// 分片结果与合并结果所在的桶
    pub processed_bucket: String,
    pub region: Option<String>,
    /// S3 兼容服务的自定义端点
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            r#type: StorageType::Memory,
            original_bucket: "original-images".to_string(),
            processed_bucket: "processed-images".to_string(),
            region: None,
            endpoint_url: None,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.original_bucket.is_empty() {
            return Err(anyhow::anyhow!("原始图像桶名称不能为空"));
        }

        if self.processed_bucket.is_empty() {
            return Err(anyhow::anyhow!("处理结果桶名称不能为空"));
        }

        if let Some(endpoint) = &self.endpoint_url {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(anyhow::anyhow!("对象存储端点格式无效: {endpoint}"));
            }
        }

        Ok(())
    }
}
