use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::Value;
use tokio::sync::broadcast;
use tower::ServiceExt;

use slicer_api::create_app;
use slicer_core::{config::OutputFormat, traits::BlobStore, AppConfig};
use slicer_dispatcher::{CoordinatorConfig, JobRegistry, PipelineCoordinator};
use slicer_infrastructure::{InMemoryBlobStore, InMemoryMessageQueue};
use slicer_worker::{RetryPolicy, StripProcessor, WorkerService};

const BOUNDARY: &str = "slicer-test-boundary";

struct TestApp {
    app: Router,
    store: InMemoryBlobStore,
    _shutdown: broadcast::Sender<()>,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.output_format = OutputFormat::Png;
    config.pipeline.tracker_timeout_seconds = 10;
    config.api.max_request_size_mb = 1;
    config
}

async fn spawn_app(with_worker: bool) -> TestApp {
    let config = test_config();
    let queue = InMemoryMessageQueue::new();
    let store = InMemoryBlobStore::new();
    let (shutdown_tx, _) = broadcast::channel(1);

    let coordinator = Arc::new(PipelineCoordinator::new(
        CoordinatorConfig::from_app_config(&config),
        Arc::new(queue.clone()),
        Arc::new(store.clone()),
        Arc::new(JobRegistry::new(Duration::from_secs(60))),
    ));

    if with_worker {
        let processor = Arc::new(StripProcessor::new(
            Arc::new(store.clone()),
            config.storage.processed_bucket.clone(),
            RetryPolicy::new(2, Duration::from_millis(1)),
        ));
        let worker = WorkerService::builder(
            "api-test-worker",
            Arc::new(queue.clone()),
            processor,
            config.message_queue.task_queue.clone(),
        )
        .with_config(&config.worker)
        .build();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { worker.run(shutdown_rx).await });
    }

    TestApp {
        app: create_app(coordinator, None, &config.api),
        store,
        _shutdown: shutdown_tx,
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let body = multipart_body(parts);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app(false).await;
    let (status, body) = get(&app.app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "slicer");
}

#[tokio::test]
async fn test_missing_image_field_rejected() {
    let app = spawn_app(false).await;
    let (status, body) = send(
        &app.app,
        upload_request("/upload", &[Part::Text("operation", "blur")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_invalid_uploads_rejected() {
    let app = spawn_app(false).await;
    let image = png(20, 16);

    let cases: Vec<Vec<Part<'_>>> = vec![
        vec![Part::File("cat.gif", &image)],
        vec![Part::File("cat.png", &image), Part::Text("num_parts", "0")],
        vec![Part::File("cat.png", &image), Part::Text("num_parts", "-2")],
        vec![Part::File("cat.png", &image), Part::Text("num_parts", "abc")],
        vec![Part::File("cat.png", b"definitely not an image")],
    ];

    for parts in cases {
        let (status, body) = send(&app.app, upload_request("/upload", &parts)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(body["error"]["message"].is_string());
    }
}

#[tokio::test]
async fn test_more_parts_than_rows_rejected() {
    let app = spawn_app(false).await;
    let image = png(20, 16);

    let (status, body) = send(
        &app.app,
        upload_request(
            "/upload",
            &[Part::File("tall.png", &image), Part::Text("num_parts", "17")],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "INVALID_PART_COUNT");
}

#[tokio::test]
async fn test_upload_accepted_and_status_lookup() {
    let app = spawn_app(false).await;
    let image = png(20, 16);

    let (status, body) = send(
        &app.app,
        upload_request(
            "/upload",
            &[
                Part::File("cat.png", &image),
                Part::Text("operation", "grayscale"),
                Part::Text("num_parts", "4"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status_url"], format!("/jobs/{job_id}"));

    let (status, body) = get(&app.app, &format!("/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["filename"], "cat.png");
    assert_eq!(body["data"]["operation"], "grayscale");
    assert_eq!(body["data"]["num_parts"], 4);
    assert!(app
        .store
        .contains("original-images", "cat.png")
        .await);
}

#[tokio::test]
async fn test_same_filename_in_flight_conflicts() {
    let app = spawn_app(false).await;
    let image = png(20, 16);
    let parts = [Part::File("dup.png", &image), Part::Text("num_parts", "2")];

    let (status, _) = send(&app.app, upload_request("/upload", &parts)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app.app, upload_request("/upload", &parts)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "JOB_CONFLICT");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = spawn_app(false).await;

    let (status, body) = get(&app.app, &format!("/jobs/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "JOB_NOT_FOUND");

    let (status, _) = get(&app.app, "/jobs/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wait_returns_processed_file() {
    let app = spawn_app(true).await;
    let image = png(20, 16);

    let (status, body) = send(
        &app.app,
        upload_request(
            "/upload?wait=true",
            &[
                Part::File("cat.png", &image),
                Part::Text("operation", "color_inversion"),
                Part::Text("num_parts", "3"),
            ],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body["processed_file"],
        "memory://processed-images/processed_cat.png"
    );

    let merged = app
        .store
        .get("processed-images", "processed_cat.png")
        .await
        .unwrap();
    let merged = image::load_from_memory(&merged).unwrap().to_rgb8();
    assert_eq!(merged.dimensions(), (20, 16));
    assert!(merged.pixels().all(|p| *p == Rgb([245, 235, 225])));
}

#[tokio::test]
async fn test_wait_reports_failed_part() {
    let app = spawn_app(true).await;
    let image = png(20, 16);

    let (status, body) = send(
        &app.app,
        upload_request(
            "/upload?wait=true",
            &[
                Part::File("sepia.png", &image),
                Part::Text("operation", "sepia"),
                Part::Text("num_parts", "2"),
            ],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["type"], "PART_FAILED");
    assert!(body["error"]["job_id"].is_string());
    assert!(!app
        .store
        .contains("processed-images", "processed_sepia.png")
        .await);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = spawn_app(false).await;
    let huge = vec![0u8; 2 * 1024 * 1024];

    let response = app
        .app
        .clone()
        .oneshot(upload_request("/upload", &[Part::File("big.png", &huge)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_metrics_unavailable_without_recorder() {
    let app = spawn_app(false).await;
    let (status, _) = get(&app.app, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
