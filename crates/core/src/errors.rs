use thiserror::Error;

/// 图像分片流水线错误类型定义
#[derive(Debug, Error)]
pub enum SlicerError {
    #[error("无效的输入: {0}")]
    InvalidInput(String),

    #[error("无效的图像: {0}")]
    InvalidImage(String),

    #[error("无效的分片数量: num_parts={num_parts}, height={height}")]
    InvalidPartCount { num_parts: i64, height: u32 },

    #[error("图像解码失败: {0}")]
    DecodeFailure(String),

    #[error("未知的图像操作: {0}")]
    UnknownOperation(String),

    #[error("上传对象 {key} 失败: {message}")]
    UploadFailure { key: String, message: String },

    #[error("分片 {index} 缺失或损坏: {reason}")]
    PartMissing { index: u32, reason: String },

    #[error("分片 {part_num} 处理失败: {reason}")]
    PartFailed { part_num: u32, reason: String },

    #[error("等待任务 {job_id} 完成超时: 已收到 {received}/{expected} 个分片")]
    TrackerTimeout {
        job_id: String,
        received: usize,
        expected: u32,
    },

    #[error("无效的任务状态转换: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("任务未找到: {id}")]
    JobNotFound { id: String },

    #[error("任务冲突: {0}")]
    JobConflict(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("对象存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SlicerError {
    /// 判断分片任务级别的错误是否为永久性错误（重试也不会成功）
    ///
    /// `UploadFailure` 只在有限次上传重试耗尽后返回，因此视为永久性错误。
    /// 消息队列、对象存储和内部错误是暂时性的，任务可重新投递。
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            SlicerError::MessageQueue(_) | SlicerError::Storage(_) | SlicerError::Internal(_)
        )
    }

    /// 错误码，用于HTTP响应和任务快照
    pub fn code(&self) -> &'static str {
        match self {
            SlicerError::InvalidInput(_) => "INVALID_INPUT",
            SlicerError::InvalidImage(_) => "INVALID_IMAGE",
            SlicerError::InvalidPartCount { .. } => "INVALID_PART_COUNT",
            SlicerError::DecodeFailure(_) => "DECODE_FAILURE",
            SlicerError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            SlicerError::UploadFailure { .. } => "UPLOAD_FAILURE",
            SlicerError::PartMissing { .. } => "PART_MISSING",
            SlicerError::PartFailed { .. } => "PART_FAILED",
            SlicerError::TrackerTimeout { .. } => "TRACKER_TIMEOUT",
            SlicerError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            SlicerError::JobNotFound { .. } => "JOB_NOT_FOUND",
            SlicerError::JobConflict(_) => "JOB_CONFLICT",
            SlicerError::MessageQueue(_) => "MESSAGE_QUEUE_ERROR",
            SlicerError::Storage(_) => "STORAGE_ERROR",
            SlicerError::Serialization(_) => "SERIALIZATION_ERROR",
            SlicerError::Configuration(_) => "CONFIGURATION_ERROR",
            SlicerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for SlicerError {
    fn from(e: serde_json::Error) -> Self {
        SlicerError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SlicerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        assert!(SlicerError::UnknownOperation("warp".into()).is_permanent());
        assert!(SlicerError::DecodeFailure("bad png".into()).is_permanent());
        assert!(SlicerError::UploadFailure {
            key: "a_part_0".into(),
            message: "timeout".into()
        }
        .is_permanent());
        assert!(!SlicerError::MessageQueue("closed".into()).is_permanent());
        assert!(!SlicerError::Internal("join error".into()).is_permanent());
        assert!(!SlicerError::Storage("reset".into()).is_permanent());
    }

    #[test]
    fn test_error_codes() {
        let err = SlicerError::TrackerTimeout {
            job_id: "j".into(),
            received: 3,
            expected: 4,
        };
        assert_eq!(err.code(), "TRACKER_TIMEOUT");
        assert!(err.to_string().contains("3/4"));
    }
}
