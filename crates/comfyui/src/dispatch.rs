//! Dispatch-and-wait semantics against the inference engine.
//!
//! [`Dispatcher`] owns the engine as a single-job resource: it
//! submits a compiled workflow, polls history until the job reaches a
//! terminal state, and normalizes the engine's response into a
//! [`DispatchResult`]. A second dispatch while one is in flight is
//! rejected before submission.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::{EngineApiError, EngineClient};

/// Descriptor of one generated image as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub image_type: String,
    /// Engine URL the image can be fetched from.
    pub url: String,
}

/// Normalized engine response for one dispatched workflow.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    /// Generated image descriptors; empty when the engine failed.
    pub images: Vec<GeneratedImage>,
    /// Raw engine payload, kept for the API response and debugging.
    pub raw: serde_json::Value,
    /// Engine-reported failure, terminal for the request.
    pub error: Option<String>,
}

impl DispatchResult {
    fn failed(error: impl Into<String>, raw: serde_json::Value) -> Self {
        Self {
            images: Vec::new(),
            raw,
            error: Some(error.into()),
        }
    }
}

/// Lifecycle of the engine's single job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Dispatching,
    Completed,
    Failed,
    Interrupted,
}

/// Errors from the dispatch layer itself (engine-reported failures
/// travel inside [`DispatchResult::error`]).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A dispatch is already in flight; the engine cannot interleave jobs.
    #[error("Engine is busy with another generation")]
    Busy,

    /// Transport or protocol failure talking to the engine.
    #[error("{0}")]
    Api(#[from] EngineApiError),

    /// The engine never reported a terminal state within the wait budget.
    #[error("Timed out waiting for the engine after {0} seconds")]
    Timeout(u64),
}

/// Owned handle over the engine's single job slot.
pub struct Dispatcher {
    client: Arc<dyn EngineClient>,
    /// Base URL used to build fetchable image URLs.
    engine_url: String,
    state: Mutex<JobState>,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn EngineClient>,
        engine_url: impl Into<String>,
        poll_interval: Duration,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            client,
            engine_url: engine_url.into(),
            state: Mutex::new(JobState::Idle),
            poll_interval,
            wait_timeout,
        }
    }

    /// Current job-slot state.
    pub fn state(&self) -> JobState {
        *self.state.lock().expect("dispatch state lock poisoned")
    }

    /// Submit a workflow and block until the engine reports a terminal
    /// state.
    ///
    /// Returns `Err(DispatchError::Busy)` without touching the engine
    /// when another dispatch holds the job slot.
    pub async fn dispatch(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<DispatchResult, DispatchError> {
        self.acquire_slot()?;

        let result = self.submit_and_wait(workflow).await;

        let final_state = match &result {
            Ok(r) if r.error.is_none() => JobState::Completed,
            _ => JobState::Failed,
        };
        *self.state.lock().expect("dispatch state lock poisoned") = final_state;

        result
    }

    /// Request cancellation of whatever the engine is currently
    /// running. Fire-and-forget: returns whether the interrupt signal
    /// was accepted, not whether any particular job was cancelled.
    pub async fn interrupt(&self) -> bool {
        match self.client.interrupt().await {
            Ok(()) => {
                let mut state = self.state.lock().expect("dispatch state lock poisoned");
                if *state == JobState::Dispatching {
                    *state = JobState::Interrupted;
                }
                tracing::info!("Engine interrupt accepted");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Engine interrupt failed");
                false
            }
        }
    }

    fn acquire_slot(&self) -> Result<(), DispatchError> {
        let mut state = self.state.lock().expect("dispatch state lock poisoned");
        if *state == JobState::Dispatching {
            return Err(DispatchError::Busy);
        }
        *state = JobState::Dispatching;
        Ok(())
    }

    async fn submit_and_wait(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<DispatchResult, DispatchError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let submitted = self.client.submit(workflow, &client_id).await?;
        tracing::info!(prompt_id = %submitted.prompt_id, "Workflow submitted to engine");

        let started = std::time::Instant::now();
        loop {
            let history = self.client.history(&submitted.prompt_id).await?;
            if let Some(entry) = history.get(&submitted.prompt_id) {
                if let Some(result) =
                    normalize_history_entry(entry, &self.engine_url)
                {
                    return Ok(result);
                }
            }

            if started.elapsed() >= self.wait_timeout {
                return Err(DispatchError::Timeout(self.wait_timeout.as_secs()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Interpret one history entry. Returns `None` while the job is still
/// running, `Some` once it reached a terminal state.
fn normalize_history_entry(
    entry: &serde_json::Value,
    engine_url: &str,
) -> Option<DispatchResult> {
    // Flat error field (also the shape transport shims produce).
    if let Some(error) = entry.get("error").and_then(|e| e.as_str()) {
        return Some(DispatchResult::failed(error, entry.clone()));
    }

    let status = entry.get("status");

    // Execution error reported through the status block.
    if status.and_then(|s| s.get("status_str")).and_then(|s| s.as_str()) == Some("error") {
        let message = extract_error_message(entry).unwrap_or_else(|| "execution failed".to_string());
        return Some(DispatchResult::failed(message, entry.clone()));
    }

    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(|c| c.as_bool())
        .unwrap_or(false);
    let outputs = entry.get("outputs").and_then(|o| o.as_object());

    if !completed && outputs.is_none() {
        return None;
    }

    let mut images = Vec::new();
    if let Some(outputs) = outputs {
        for node_output in outputs.values() {
            let Some(node_images) = node_output.get("images").and_then(|i| i.as_array()) else {
                continue;
            };
            for descriptor in node_images {
                let Some(filename) = descriptor.get("filename").and_then(|f| f.as_str()) else {
                    continue;
                };
                let subfolder = descriptor
                    .get("subfolder")
                    .and_then(|s| s.as_str())
                    .unwrap_or("");
                let image_type = descriptor
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("output");
                images.push(GeneratedImage {
                    filename: filename.to_string(),
                    subfolder: subfolder.to_string(),
                    image_type: image_type.to_string(),
                    url: format!(
                        "{engine_url}/view?filename={filename}&subfolder={subfolder}&type={image_type}"
                    ),
                });
            }
        }
    }

    Some(DispatchResult {
        images,
        raw: entry.clone(),
        error: None,
    })
}

/// Pull the exception message out of the status messages array
/// (`[["execution_error", {"exception_message": ...}], ...]`).
fn extract_error_message(entry: &serde_json::Value) -> Option<String> {
    let messages = entry.get("status")?.get("messages")?.as_array()?;
    for message in messages {
        let pair = message.as_array()?;
        if pair.first()?.as_str()? == "execution_error" {
            return pair
                .get(1)?
                .get("exception_message")?
                .as_str()
                .map(|s| s.to_string());
        }
    }
    None
}
