//! Shared helpers for API integration tests.
//!
//! Provides a test double for the engine collaborator, a sandboxed
//! filesystem layout (checkpoints, input/output, traces), and request
//! helpers for driving the router through `tower::ServiceExt`.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use photon_api::build_router;
use photon_api::config::ServerConfig;
use photon_api::state::AppState;
use photon_comfyui::api::{EngineApiError, EngineClient, SubmitResponse};
use photon_comfyui::gpu::GpuInfo;

/// Checkpoint file seeded into every test checkpoint directory.
pub const TEST_CHECKPOINT: &str = "dreamshaper_v8.safetensors";

/// Engine double: accepts any submission and reports the configured
/// history entry for it.
pub struct MockEngine {
    pub entry: serde_json::Value,
}

#[async_trait]
impl EngineClient for MockEngine {
    async fn submit(
        &self,
        _workflow: &serde_json::Value,
        _client_id: &str,
    ) -> Result<SubmitResponse, EngineApiError> {
        Ok(SubmitResponse {
            prompt_id: "test-prompt".to_string(),
            number: 0,
        })
    }

    async fn history(&self, prompt_id: &str) -> Result<serde_json::Value, EngineApiError> {
        Ok(serde_json::json!({ prompt_id: self.entry }))
    }

    async fn interrupt(&self) -> Result<(), EngineApiError> {
        Ok(())
    }
}

/// History entry for a successful run producing the given files.
pub fn success_entry(filenames: &[&str]) -> serde_json::Value {
    let images: Vec<serde_json::Value> = filenames
        .iter()
        .map(|f| serde_json::json!({ "filename": f, "subfolder": "", "type": "output" }))
        .collect();
    serde_json::json!({
        "status": { "status_str": "success", "completed": true },
        "outputs": { "7": { "images": images } }
    })
}

/// History entry for a run the engine failed with `message`.
pub fn error_entry(message: &str) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "status_str": "error",
            "completed": false,
            "messages": [["execution_error", { "exception_message": message }]]
        }
    })
}

/// A fully wired test application plus the sandbox directories its
/// state points at.
pub struct TestContext {
    pub app: Router,
    pub checkpoints_dir: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub served_dir: PathBuf,
    pub controlnet_dir: PathBuf,
    pub traces_dir: PathBuf,
    // Held so the sandbox outlives the test body.
    _tmp: tempfile::TempDir,
}

impl TestContext {
    pub fn trace_path(&self, mode: &str) -> PathBuf {
        self.traces_dir.join(format!("inference_trace_{mode}.csv"))
    }
}

/// Build the application around the given engine double.
///
/// The registry URL points at a closed port: registration is expected
/// to fail and the response to carry a null run id.
pub fn build_test_context(engine: MockEngine) -> TestContext {
    let tmp = tempfile::tempdir().expect("create test sandbox");
    let root = tmp.path();

    let checkpoints_dir = root.join("checkpoints");
    let input_dir = root.join("input");
    let output_dir = root.join("output");
    let served_dir = root.join("served_images");
    let controlnet_dir = root.join("controlnet");
    let traces_dir = root.join("traces");
    for dir in [
        &checkpoints_dir,
        &input_dir,
        &output_dir,
        &served_dir,
        &controlnet_dir,
        &traces_dir,
    ] {
        std::fs::create_dir_all(dir).expect("create sandbox dir");
    }
    std::fs::write(checkpoints_dir.join(TEST_CHECKPOINT), b"").expect("seed checkpoint");

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8080".to_string()],
        request_timeout_secs: 30,
        engine_url: "http://engine.test".to_string(),
        engine_poll_interval_ms: 1,
        engine_wait_timeout_secs: 5,
        engine_input_dir: input_dir.clone(),
        engine_output_dir: output_dir.clone(),
        checkpoints_dir: checkpoints_dir.clone(),
        controlnet_models_dir: controlnet_dir.clone(),
        served_images_dir: served_dir.clone(),
        traces_dir: traces_dir.clone(),
        // Nothing listens here; registration must degrade gracefully.
        registry_url: "http://127.0.0.1:9".to_string(),
        registry_timeout_secs: 1,
    };

    let gpu = GpuInfo {
        name: "CPU".to_string(),
        driver_version: "N/A".to_string(),
    };

    let state =
        AppState::new(config, Arc::new(engine), gpu).expect("assemble test state");

    TestContext {
        app: build_router(state),
        checkpoints_dir,
        input_dir,
        output_dir,
        served_dir,
        controlnet_dir,
        traces_dir,
        _tmp: tmp,
    }
}

/// Issue a GET request against the app.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Issue a POST request with a JSON body against the app.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body into JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// Assert status and return the parsed body.
pub async fn expect_json(
    response: Response<Body>,
    status: StatusCode,
) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
