use serde::{Deserialize, Serialize};

/// 合并结果的编码格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

/// 分片流水线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub default_num_parts: i64,
    pub max_num_parts: i64,
    pub default_operation: String,
    pub allowed_extensions: Vec<String>,
    /// 等待全部分片完成的超时时间
    pub tracker_timeout_seconds: u64,
    pub output_format: OutputFormat,
    /// 为真时上传阶段直接拒绝未知操作
    pub reject_unknown_operations: bool,
    /// 终态任务快照的保留时间
    pub job_retention_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_num_parts: 8,
            max_num_parts: 64,
            default_operation: "edge_detection".to_string(),
            allowed_extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
            tracker_timeout_seconds: 120,
            output_format: OutputFormat::Jpeg,
            reject_unknown_operations: false,
            job_retention_seconds: 3600,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_num_parts <= 0 {
            return Err(anyhow::anyhow!("最大分片数量必须大于0"));
        }

        if self.default_num_parts <= 0 || self.default_num_parts > self.max_num_parts {
            return Err(anyhow::anyhow!(
                "默认分片数量 {} 必须在 1..={} 之间",
                self.default_num_parts,
                self.max_num_parts
            ));
        }

        if self.default_operation.is_empty() {
            return Err(anyhow::anyhow!("默认操作不能为空"));
        }

        if self.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("允许的文件扩展名不能为空"));
        }

        if self.tracker_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("完成等待超时时间必须大于0"));
        }

        Ok(())
    }

    /// 文件扩展名是否允许（大小写不敏感）
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_file() {
        let config = PipelineConfig::default();
        assert!(config.is_allowed_file("cat.png"));
        assert!(config.is_allowed_file("CAT.JPEG"));
        assert!(config.is_allowed_file("a.b.jpg"));
        assert!(!config.is_allowed_file("cat.gif"));
        assert!(!config.is_allowed_file("png"));
        assert!(!config.is_allowed_file(".png"));
    }

    #[test]
    fn test_default_num_parts_must_fit_max() {
        let config = PipelineConfig {
            default_num_parts: 100,
            max_num_parts: 64,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
