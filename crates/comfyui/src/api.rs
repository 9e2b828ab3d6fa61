//! REST client for the ComfyUI HTTP endpoints.
//!
//! [`EngineClient`] is the seam the dispatch layer works against;
//! [`HttpEngineClient`] is the [`reqwest`]-backed implementation.
//! Tests substitute their own implementations.

use async_trait::async_trait;
use serde::Deserialize;

/// Response returned by the engine's `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i64,
}

/// Errors from the engine REST layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Engine API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Minimal engine contract the dispatcher needs.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Queue a workflow for execution, returning the prompt id.
    async fn submit(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, EngineApiError>;

    /// Retrieve execution history for a prompt. The returned JSON is
    /// keyed by prompt id and is empty while the prompt is still
    /// running.
    async fn history(&self, prompt_id: &str) -> Result<serde_json::Value, EngineApiError>;

    /// Interrupt whatever is currently executing. Untargeted: the
    /// engine tracks at most one active job.
    async fn interrupt(&self) -> Result<(), EngineApiError>;
}

/// HTTP client for a single engine instance.
pub struct HttpEngineClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngineClient {
    /// Create a client for the engine at `base_url`
    /// (e.g. `http://host:8188`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ensure the response has a success status code, or capture the
    /// status and body into an [`EngineApiError::Api`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn submit(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, EngineApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_json(response).await
    }

    async fn history(&self, prompt_id: &str) -> Result<serde_json::Value, EngineApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.base_url, prompt_id))
            .send()
            .await?;

        Self::parse_json(response).await
    }

    async fn interrupt(&self) -> Result<(), EngineApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.base_url))
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
