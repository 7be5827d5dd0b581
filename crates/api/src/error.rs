use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use slicer_core::SlicerError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Slicer(#[from] SlicerError),

    /// 任务已进入失败终态
    #[error("任务 {job_id} 处理失败: {message}")]
    JobFailed {
        job_id: Uuid,
        code: String,
        message: String,
    },

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 错误码，与 [`SlicerError::code`] 保持一致
    pub fn code(&self) -> &str {
        match self {
            ApiError::Slicer(e) => e.code(),
            ApiError::JobFailed { code, .. } => code,
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for_code(self.code())
    }
}

/// 错误码到HTTP状态码的映射
pub fn status_for_code(code: &str) -> StatusCode {
    match code {
        "INVALID_INPUT" | "INVALID_IMAGE" | "INVALID_PART_COUNT" | "DECODE_FAILURE"
        | "UNKNOWN_OPERATION" | "BAD_REQUEST" => StatusCode::BAD_REQUEST,
        "JOB_NOT_FOUND" | "NOT_FOUND" => StatusCode::NOT_FOUND,
        "JOB_CONFLICT" => StatusCode::CONFLICT,
        "PART_FAILED" => StatusCode::UNPROCESSABLE_ENTITY,
        "TRACKER_TIMEOUT" => StatusCode::GATEWAY_TIMEOUT,
        "UPLOAD_FAILURE" => StatusCode::BAD_GATEWAY,
        "MESSAGE_QUEUE_ERROR" | "STORAGE_ERROR" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn suggestions(code: &str) -> Vec<&'static str> {
    match code {
        "INVALID_INPUT" => vec![
            "请使用 multipart/form-data 上传，图像字段名为 image",
            "num_parts 必须为正整数且不超过图像高度",
        ],
        "INVALID_IMAGE" => vec!["请确认上传的文件是有效的 PNG 或 JPEG 图像"],
        "JOB_NOT_FOUND" => vec!["请检查任务ID是否正确，已结束的任务在保留期过后会被清理"],
        "JOB_CONFLICT" => vec!["同名文件的任务仍在处理中，请等待其结束或更换文件名"],
        "TRACKER_TIMEOUT" => vec!["部分分片未在限定时间内完成，请检查 Worker 是否在运行"],
        _ => Vec::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();
        let mut error = json!({
            "message": self.to_string(),
            "type": code,
            "code": status.as_u16(),
            "suggestions": suggestions(&code),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let ApiError::JobFailed { job_id, .. } = &self {
            error["job_id"] = json!(job_id);
        }

        if status.is_server_error() {
            tracing::error!("请求处理失败: {}", self);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
