#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use api::{AppConfig, Services, init_services, router};
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use backend::{BackendFuture, FnBackend, GeneratedImage, GenerationRequest, ImageBackend};
use bytes::Bytes;
use db::DbConfig;
use http_body_util::BodyExt;
use imagegen_core::{JobId, QueueConfig};
use serde_json::Value;
use storage::StorageConfig;
use tower::ServiceExt;

pub const API_KEY: &str = "test-key";
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 9, 8, 7, 6];

pub struct TestApp {
    pub app: Router,
    pub services: Services,
}

/// In-memory registry and store, fast polling, short generation timeout.
pub fn test_config() -> AppConfig {
    let mut db = DbConfig::memory();
    db.database = format!("test_{}", JobId::new().0.simple());

    let mut config = AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        api_keys: vec![API_KEY.to_string()],
        queue: QueueConfig {
            concurrency: 2,
            poll_interval_ms: 10,
            tick_interval_ms: 50,
            ..QueueConfig::default()
        },
        db,
        storage: StorageConfig::memory(),
        ..AppConfig::default()
    };
    config.backend.timeout = Duration::from_millis(300);
    config
}

pub async fn spawn_app(backend: Arc<dyn ImageBackend>) -> TestApp {
    spawn_app_with(test_config(), backend).await
}

pub async fn spawn_app_with(config: AppConfig, backend: Arc<dyn ImageBackend>) -> TestApp {
    let services = init_services(&config, backend).await.unwrap();
    TestApp {
        app: router(services.state.clone()),
        services,
    }
}

fn png_after(delay: Duration) -> BackendFuture<'static> {
    Box::pin(async move {
        tokio::time::sleep(delay).await;
        Ok(GeneratedImage {
            bytes: Bytes::from_static(PNG),
            extension: "png",
        })
    })
}

/// Backend that draws [`PNG`] after `delay`.
pub fn png_backend(delay: Duration) -> Arc<dyn ImageBackend> {
    Arc::new(FnBackend::new(move |_request: GenerationRequest| png_after(delay)))
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    Response {
        status,
        headers,
        body,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_generate(app: &Router, key: Option<&str>, body: &str) -> Response {
    let mut request = Request::post("/generate").header("content-type", "application/json");
    if let Some(key) = key {
        request = request.header("X-API-KEY", key);
    }
    send(app, request.body(Body::from(body.to_string())).unwrap()).await
}

/// Submit a prompt and return its task id.
pub async fn submit(app: &Router, prompt: &str) -> String {
    let body = serde_json::json!({ "prompt": prompt, "model": "stable-diffusion" });
    let response = post_generate(app, Some(API_KEY), &body.to_string()).await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    response.json()["taskId"].as_str().unwrap().to_string()
}

/// Poll the status route until the job is terminal.
pub async fn wait_for_terminal(app: &Router, task_id: &str, within: Duration) -> Value {
    let deadline = Instant::now() + within;
    loop {
        let response = get(app, &format!("/tasks/{task_id}/status")).await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json();
        match body["status"].as_str() {
            Some("SUCCEEDED") | Some("FAILED") => return body,
            Some("PENDING") | Some("RUNNING") => {}
            other => panic!("unexpected status {other:?}"),
        }
        assert!(Instant::now() < deadline, "task {task_id} not finished: {body}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
