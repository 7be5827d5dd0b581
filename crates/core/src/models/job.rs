use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Operation, StripLayout};
use crate::{Result, SlicerError};

/// 任务状态
///
/// ```text
/// Pending → Dispatched → Collecting → Merging → Complete
///               ↓            ↓           ↓
///             Failed       Failed      Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Dispatched,
    Collecting,
    Merging,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, next),
            (Pending, Dispatched)
                | (Dispatched, Collecting)
                | (Collecting, Merging)
                | (Merging, Complete)
                | (Dispatched, Failed)
                | (Collecting, Failed)
                | (Merging, Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Dispatched => "dispatched",
            JobState::Collecting => "collecting",
            JobState::Merging => "merging",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 一次上传请求对应的处理任务
///
/// `operation` 保留原始字符串：未知操作也会被分发，由 Worker 回报失败事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub filename: String,
    pub operation: String,
    pub layout: StripLayout,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(filename: impl Into<String>, operation: impl Into<String>, layout: StripLayout) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            operation: operation.into(),
            layout,
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn num_parts(&self) -> u32 {
        self.layout.num_parts
    }

    /// 本任务专用的完成通知队列
    pub fn completion_queue(&self) -> String {
        format!("{}_callback", self.id)
    }

    /// 分片处理结果在对象存储中的键
    pub fn part_key(&self, index: u32) -> String {
        part_key(&self.filename, index)
    }

    /// 合并结果在对象存储中的键
    pub fn artifact_key(&self) -> String {
        format!("processed_{}", self.filename)
    }

    /// 状态迁移，不允许跳过中间状态
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SlicerError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn parsed_operation(&self) -> Result<Operation> {
        self.operation.parse()
    }
}

pub fn part_key(filename: &str, index: u32) -> String {
    format!("{filename}_part_{index}")
}

/// 对外暴露的任务状态快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub filename: String,
    pub operation: String,
    pub num_parts: u32,
    pub width: u32,
    pub height: u32,
    pub state: JobState,
    pub processed_file: Option<String>,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            filename: job.filename.clone(),
            operation: job.operation.clone(),
            num_parts: job.layout.num_parts,
            width: job.layout.width,
            height: job.layout.height,
            state: job.state,
            processed_file: None,
            error_code: None,
            error: None,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
