//! # Slicer API
//!
//! 图像分片处理系统的HTTP接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `POST /upload` - 上传图像（multipart 字段 `image`、`operation`、`num_parts`），
//!   默认返回 202 和任务ID，`?wait=true` 时等待处理结束并返回 `processed_file`
//! - `GET /jobs/{id}` - 查询任务状态
//! - `GET /health` - 健康检查
//! - `GET /metrics` - Prometheus 指标
//!
//! ## 错误响应
//!
//! ```json
//! {
//!   "error": {
//!     "message": "无效的输入: num_parts 必须在 1..=64 之间，实际为 0",
//!     "type": "INVALID_INPUT",
//!     "code": 400,
//!     "suggestions": ["..."],
//!     "timestamp": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::{extract::DefaultBodyLimit, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;

use middleware::{body_limit_layer, cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};
use slicer_core::config::ApiConfig;
use slicer_dispatcher::PipelineCoordinator;

/// 创建完整的API应用
pub fn create_app(
    coordinator: Arc<PipelineCoordinator>,
    metrics: Option<PrometheusHandle>,
    api_config: &ApiConfig,
) -> Router {
    let state = AppState {
        coordinator,
        metrics,
    };

    let app = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging))
            .layer(DefaultBodyLimit::disable())
            .layer(body_limit_layer(api_config.max_request_size_bytes())),
    );

    if api_config.cors_enabled {
        app.layer(cors_layer())
    } else {
        app
    }
}
