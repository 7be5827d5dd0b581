use axum::{
    extract::{multipart::Field, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use slicer_core::{JobSnapshot, JobState, SlicerError};
use slicer_dispatcher::SubmitRequest;

use crate::{
    error::{ApiError, ApiResult},
    response::accepted,
    routes::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    /// 为真时等待任务结束再响应
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadAccepted {
    pub job_id: Uuid,
    pub state: JobState,
    pub status_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadCompleted {
    pub job_id: Uuid,
    pub processed_file: String,
}

/// multipart 表单内容
#[derive(Debug, Default)]
struct UploadForm {
    filename: Option<String>,
    image: Option<Vec<u8>>,
    operation: Option<String>,
    num_parts: Option<String>,
}

impl UploadForm {
    async fn read(multipart: &mut Multipart) -> ApiResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    form.filename = Some(field.file_name().unwrap_or_default().to_string());
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                    form.image = Some(bytes.to_vec());
                }
                "operation" => form.operation = Some(text(field).await?),
                "num_parts" => form.num_parts = Some(text(field).await?),
                other => debug!("忽略未知的表单字段: {}", other),
            }
        }

        Ok(form)
    }

    fn into_request(self) -> ApiResult<SubmitRequest> {
        let image = self
            .image
            .ok_or_else(|| SlicerError::InvalidInput("缺少 image 字段".to_string()))?;

        let num_parts = match self.num_parts.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                SlicerError::InvalidInput(format!("num_parts 必须是整数，实际为 {raw}"))
            })?),
        };

        Ok(SubmitRequest {
            filename: self.filename.unwrap_or_default(),
            image,
            operation: self.operation.map(|op| op.trim().to_string()),
            num_parts,
        })
    }
}

async fn text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// 上传图像并提交处理
///
/// 默认立即返回 202 和任务ID；`?wait=true` 时等待任务结束，
/// 成功返回 200 和合并结果的引用，失败返回对应的错误。
pub async fn upload_image(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let request = UploadForm::read(&mut multipart).await?.into_request()?;
    info!(
        "收到上传: filename={}, size={} bytes, operation={:?}, num_parts={:?}",
        request.filename,
        request.image.len(),
        request.operation,
        request.num_parts
    );

    if query.wait {
        let snapshot = state.coordinator.submit_and_wait(request).await?;
        return finished(snapshot);
    }

    let snapshot = state.coordinator.submit(request).await?;
    Ok(accepted(UploadAccepted {
        job_id: snapshot.id,
        state: snapshot.state,
        status_url: format!("/jobs/{}", snapshot.id),
    })
    .into_response())
}

fn finished(snapshot: JobSnapshot) -> ApiResult<Response> {
    match (snapshot.state, snapshot.processed_file) {
        (JobState::Complete, Some(processed_file)) => Ok((
            StatusCode::OK,
            Json(UploadCompleted {
                job_id: snapshot.id,
                processed_file,
            }),
        )
            .into_response()),
        (state, _) => Err(ApiError::JobFailed {
            job_id: snapshot.id,
            code: snapshot
                .error_code
                .unwrap_or_else(|| "INTERNAL_ERROR".to_string()),
            message: snapshot
                .error
                .unwrap_or_else(|| format!("任务结束于非预期状态: {state}")),
        }),
    }
}
