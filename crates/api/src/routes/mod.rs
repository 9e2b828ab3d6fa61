//! Route definitions for the generation API.
//!
//! Route hierarchy:
//!
//! ```text
//! /health                          liveness
//!
//! /api/txt2img                     POST  text-to-image generation
//! /api/txt2img/interrupt           POST  interrupt the running job
//! /api/img2img                     POST  image-to-image generation
//! /api/img2img/interrupt           POST  interrupt the running job
//! /api/images/{filename}           GET   serve a generated image
//! /api/controlnet/models           GET   list available ControlNet models
//! /api/upload-controlnet-image     POST  upload a ControlNet guide image
//! ```

pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{generate, images, models};
use crate::state::AppState;

/// Build the `/api` route tree.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/txt2img", post(generate::txt2img))
        .route("/txt2img/interrupt", post(generate::interrupt))
        .route("/img2img", post(generate::img2img))
        .route("/img2img/interrupt", post(generate::interrupt))
        .route("/images/{filename}", get(images::serve_image))
        .route("/controlnet/models", get(models::list_controlnet_models))
        .route("/upload-controlnet-image", post(images::upload_controlnet_image))
}
