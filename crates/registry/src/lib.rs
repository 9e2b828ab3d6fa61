//! Best-effort client for the external run-registry service.
//!
//! After a successful dispatch, a [`RunRecord`] freezes the request's
//! full configuration together with the generated image names and is
//! POSTed to the registry. Recording is advisory telemetry: any
//! transport failure, non-success status, or timeout is logged as a
//! warning and never alters the response already computed for the
//! caller.

use std::time::Duration;

use photon_core::checkpoint::ResolvedCheckpoint;
use photon_core::request::{GenerationMode, GenerationRequest};
use photon_core::workflow::WorkflowGraph;
use serde::{Deserialize, Serialize};

/// Schema version stamped into every record.
pub const RECORD_VERSION: &str = "1.0.0";

/// Frozen configuration of one completed generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Checkpoint the run actually used (after fallback).
    pub model: String,
    pub vae: Option<String>,
    pub loras: Vec<serde_json::Value>,
    pub controlnets: Vec<serde_json::Value>,
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub sampler: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub batch_size: u32,
    pub batch_count: u32,
    /// The compiled workflow document, verbatim.
    pub workflow: serde_json::Value,
    pub version: String,
    pub generated_images: Vec<String>,
    /// "txt2img" or "img2img".
    pub generation_type: String,
}

impl RunRecord {
    /// Freeze a completed generation into a registry record.
    pub fn from_generation(
        request: &GenerationRequest,
        checkpoint: &ResolvedCheckpoint,
        workflow: &WorkflowGraph,
        generated_images: Vec<String>,
        mode: GenerationMode,
    ) -> Self {
        let controlnets = request
            .controlnet
            .as_ref()
            .map(|config| {
                config
                    .units
                    .iter()
                    .map(|unit| serde_json::to_value(unit).expect("unit serializes"))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            model: checkpoint.name().to_string(),
            vae: request.vae_name.clone(),
            loras: request.loras.clone(),
            controlnets,
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            seed: request.seed,
            sampler: request.sampler_name.clone(),
            steps: request.steps,
            cfg_scale: request.cfg_scale,
            width: request.width,
            height: request.height,
            batch_size: request.batch_size,
            batch_count: request.batch_count,
            workflow: workflow.to_value(),
            version: RECORD_VERSION.to_string(),
            generated_images,
            generation_type: mode.as_str().to_string(),
        }
    }
}

/// Errors from the registry transport. These never escape
/// [`RegistryClient::record_best_effort`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Registry returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// HTTP client for the run-registry collaborator.
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    /// Create a client for the registry at `base_url` with a short
    /// request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build registry HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// POST one record to the registry.
    pub async fn record(&self, record: &RunRecord) -> Result<(), RegistryError> {
        let response = self
            .client
            .post(format!("{}/api/runs", self.base_url))
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Record a run, swallowing failures.
    ///
    /// Returns the run id on success and `None` when recording failed;
    /// the caller reports a null run id without failing the request.
    pub async fn record_best_effort(&self, record: &RunRecord) -> Option<String> {
        match self.record(record).await {
            Ok(()) => {
                tracing::info!(run_id = %record.run_id, "Run registered");
                Some(record.run_id.clone())
            }
            Err(e) => {
                tracing::warn!(run_id = %record.run_id, error = %e, "Failed to register run");
                None
            }
        }
    }
}
