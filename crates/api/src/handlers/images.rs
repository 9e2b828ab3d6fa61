//! Handlers for serving generated images and uploading ControlNet
//! guide images.

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use photon_core::error::CoreError;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /api/images/{filename}
///
/// Looks in the served-images directory first, then the engine output
/// directory.
pub async fn serve_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Response> {
    if !is_safe_filename(&filename) {
        return Err(AppError::BadRequest("Invalid image filename".to_string()));
    }

    for dir in [
        &state.config.served_images_dir,
        &state.config.engine_output_dir,
    ] {
        let path = dir.join(&filename);
        if !path.is_file() {
            continue;
        }
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            AppError::InternalError(format!("Failed to read image {filename}: {e}"))
        })?;
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        return Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response());
    }

    Err(AppError::NotFound(format!("Image '{filename}' not found")))
}

/// Response payload for the ControlNet image upload endpoint.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    /// Name the image was stored under in the engine input directory.
    pub filename: String,
    pub unit_index: usize,
}

/// POST /api/upload-controlnet-image (multipart)
///
/// Accepts a `file` part and an optional `unit_index` part and writes
/// the image into the engine input directory under a
/// `controlnet_unit<i>_` prefix, where workflows reference it by name.
pub async fn upload_controlnet_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut unit_index: usize = 0;
    let mut file: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart request: {e}")))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file part: {e}")))?;
                file = Some((filename, bytes));
            }
            Some("unit_index") => {
                let text = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read unit_index part: {e}"))
                })?;
                unit_index = text.trim().parse().unwrap_or(0);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    if filename.is_empty() {
        return Err(AppError::BadRequest("No file selected".to_string()));
    }

    // Keep only the final path component of the client-supplied name.
    let safe_name = std::path::Path::new(&filename)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::BadRequest("Invalid file name".to_string()))?;

    let stored_name = format!("controlnet_unit{unit_index}_{safe_name}");
    let dir = &state.config.engine_input_dir;
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        AppError::Core(CoreError::Storage(format!(
            "Failed to create input directory: {e}"
        )))
    })?;
    let path = dir.join(&stored_name);
    tokio::fs::write(&path, &bytes).await.map_err(|e| {
        AppError::Core(CoreError::Storage(format!(
            "Failed to store uploaded image: {e}"
        )))
    })?;

    tracing::info!(
        filename = %stored_name,
        unit_index,
        size_bytes = bytes.len(),
        "Stored ControlNet guide image",
    );

    Ok(Json(UploadResponse {
        status: "success",
        filename: stored_name,
        unit_index,
    }))
}

/// Reject names that could escape the image directories.
fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains("..")
}
