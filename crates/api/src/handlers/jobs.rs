use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use slicer_core::SlicerError;
use uuid::Uuid;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 查询任务状态
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // 非法ID与未知ID同样按不存在处理
    let job_id = Uuid::parse_str(&id).map_err(|_| SlicerError::JobNotFound { id: id.clone() })?;
    let snapshot = state.coordinator.job(job_id).await?;
    Ok(success(snapshot))
}
