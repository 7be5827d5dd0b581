use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use slicer_dispatcher::PipelineCoordinator;

use crate::handlers::{
    health::health_check, jobs::get_job, metrics::render_metrics, upload::upload_image,
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PipelineCoordinator>,
    /// 未安装指标记录器时为空
    pub metrics: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(upload_image))
        .route("/jobs/{id}", get(get_job))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}
