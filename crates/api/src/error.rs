use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use photon_comfyui::DispatchError;
use photon_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and the dispatch layer's
/// errors, and adds HTTP-specific variants. Implements
/// [`IntoResponse`] to produce the `{status, message}` error envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `photon_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A dispatch-layer failure (busy engine, transport, timeout).
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                CoreError::InvalidImage(_) => (StatusCode::BAD_REQUEST, core.to_string()),
                CoreError::NoCheckpointsAvailable => {
                    tracing::error!("No checkpoints available in the engine model directory");
                    (StatusCode::INTERNAL_SERVER_ERROR, core.to_string())
                }
                CoreError::Storage(msg) => {
                    tracing::error!(error = %msg, "Storage failure");
                    (StatusCode::INTERNAL_SERVER_ERROR, core.to_string())
                }
                // The engine's message passes through verbatim.
                CoreError::Engine(msg) => {
                    tracing::error!(error = %msg, "Engine failure");
                    (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
                }
            },

            AppError::Dispatch(e) => {
                tracing::error!(error = %e, "Dispatch failure");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = json!({
            "status": "error",
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
