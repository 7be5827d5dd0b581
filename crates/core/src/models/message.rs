use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Job;
use crate::{Result, SlicerError};

/// 分片处理任务消息，发布到共享任务队列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub job_id: Uuid,
    /// base64 编码的 PNG 条带
    pub part_data: String,
    pub filename: String,
    pub part_num: u32,
    pub operation: String,
    pub callback_queue: String,
}

impl TaskMessage {
    pub fn for_part(job: &Job, part_num: u32, strip: &[u8]) -> Self {
        Self {
            job_id: job.id,
            part_data: general_purpose::STANDARD.encode(strip),
            filename: job.filename.clone(),
            part_num,
            operation: job.operation.clone(),
            callback_queue: job.completion_queue(),
        }
    }

    pub fn decode_part_data(&self) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(&self.part_data)
            .map_err(|e| SlicerError::DecodeFailure(format!("分片数据base64解码失败: {e}")))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Success,
    Failure,
}

/// 分片完成事件，发布到任务专用的完成队列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub job_id: Uuid,
    pub part_num: u32,
    pub status: CompletionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionEvent {
    pub fn success(job_id: Uuid, part_num: u32) -> Self {
        Self {
            job_id,
            part_num,
            status: CompletionStatus::Success,
            error: None,
        }
    }

    pub fn failure(job_id: Uuid, part_num: u32, error: impl Into<String>) -> Self {
        Self {
            job_id,
            part_num,
            status: CompletionStatus::Failure,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CompletionStatus::Success
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
