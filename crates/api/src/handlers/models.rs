//! Handler for listing available ControlNet models.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// File extensions recognized as ControlNet model files.
const CONTROLNET_MODEL_EXTENSIONS: &[&str] = &["safetensors", "ckpt", "pth", "pt"];

/// Response payload for the model listing endpoint.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub status: &'static str,
    pub models: Vec<String>,
}

/// GET /api/controlnet/models
pub async fn list_controlnet_models(
    State(state): State<AppState>,
) -> AppResult<Json<ModelsResponse>> {
    let dir = &state.config.controlnet_models_dir;
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AppError::InternalError(format!("Failed to fetch ControlNet models: {e}"))
    })?;

    let mut models: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            std::path::Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| CONTROLNET_MODEL_EXTENSIONS.contains(&ext))
        })
        .collect();
    models.sort_unstable();

    Ok(Json(ModelsResponse {
        status: "success",
        models,
    }))
}
