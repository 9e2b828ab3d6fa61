//! Handlers for the generation pipeline.
//!
//! Routes:
//! - `POST /txt2img`            -- text-to-image generation
//! - `POST /img2img`            -- image-to-image generation
//! - `POST /txt2img/interrupt`  -- interrupt the running job
//! - `POST /img2img/interrupt`  -- interrupt the running job
//!
//! Both generation handlers share the pipeline tail in
//! [`run_pipeline`]: dispatch with wall-clock timing, trace recording,
//! engine-error propagation, and best-effort run registration.

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use photon_comfyui::dispatch::{DispatchError, GeneratedImage};
use photon_core::checkpoint::{discover_checkpoints, select_checkpoint, ResolvedCheckpoint};
use photon_core::error::CoreError;
use photon_core::ingest::ingest_input_image;
use photon_core::request::{GenerationMode, GenerationRequest};
use photon_core::trace::InferenceTraceRecord;
use photon_core::workflow::WorkflowGraph;
use photon_registry::RunRecord;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Success payload for both generation endpoints.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub message: &'static str,
    /// Normalized engine response: image descriptors, metrics, and the
    /// raw engine payload.
    pub comfy_response: serde_json::Value,
    /// The compiled workflow, echoed for inspection and reproduction.
    pub workflow: WorkflowGraph,
    pub generated_images: Vec<GeneratedImage>,
    /// Registry id of the recorded run; null when registration failed.
    pub run_id: Option<String>,
}

/// POST /api/txt2img
pub async fn txt2img(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> AppResult<Json<GenerateResponse>> {
    request.validate_for_mode(GenerationMode::Txt2Img)?;

    let checkpoint = resolve_checkpoint(&state, &request)?;
    let workflow = photon_core::workflow::txt2img::compile(&request, &checkpoint)?;

    let response =
        run_pipeline(&state, &request, &checkpoint, workflow, GenerationMode::Txt2Img).await?;
    Ok(Json(response))
}

/// POST /api/img2img
///
/// The ingested input image is an RAII guard held across the whole
/// pipeline; it is removed when the handler returns, on success and on
/// every error path.
pub async fn img2img(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> AppResult<Json<GenerateResponse>> {
    request.validate_for_mode(GenerationMode::Img2Img)?;

    let payload = request
        .input_image
        .as_deref()
        .ok_or_else(|| CoreError::Validation("Missing required field: input_image".to_string()))?;
    let ingested = ingest_input_image(payload, &state.config.engine_input_dir)?;

    let checkpoint = resolve_checkpoint(&state, &request)?;
    let workflow =
        photon_core::workflow::img2img::compile(&request, &checkpoint, ingested.filename())?;

    let response =
        run_pipeline(&state, &request, &checkpoint, workflow, GenerationMode::Img2Img).await?;
    Ok(Json(response))
}

/// Response payload for the interrupt endpoints.
#[derive(Debug, Serialize)]
pub struct InterruptResponse {
    pub status: &'static str,
    pub interrupted: bool,
}

/// POST /api/txt2img/interrupt and /api/img2img/interrupt
///
/// Untargeted by design: the engine runs at most one job, so the
/// signal applies to whatever is currently executing.
pub async fn interrupt(State(state): State<AppState>) -> Json<InterruptResponse> {
    let interrupted = state.dispatcher.interrupt().await;
    Json(InterruptResponse {
        status: "received",
        interrupted,
    })
}

/// Resolve the checkpoint to use, applying the fallback policy over
/// the engine's model directory.
fn resolve_checkpoint(
    state: &AppState,
    request: &GenerationRequest,
) -> Result<ResolvedCheckpoint, CoreError> {
    let available = discover_checkpoints(&state.config.checkpoints_dir);
    select_checkpoint(request.checkpoint_name.as_deref(), &available)
}

/// Dispatch a compiled workflow and finish the request: record the
/// trace row, propagate engine failures, and register the run.
async fn run_pipeline(
    state: &AppState,
    request: &GenerationRequest,
    checkpoint: &ResolvedCheckpoint,
    workflow: WorkflowGraph,
    mode: GenerationMode,
) -> AppResult<GenerateResponse> {
    let workflow_value = workflow.to_value();

    let started = Instant::now();
    let dispatched = state.dispatcher.dispatch(&workflow_value).await;
    let elapsed = started.elapsed().as_secs_f64();

    // A busy rejection never reached the engine, so it leaves no trace row.
    if matches!(dispatched, Err(DispatchError::Busy)) {
        return Err(AppError::Dispatch(DispatchError::Busy));
    }

    let images_generated = match &dispatched {
        Ok(result) if result.error.is_none() => result.images.len(),
        _ => 0,
    };
    let record = InferenceTraceRecord::new(
        elapsed,
        images_generated,
        state.gpu.name.clone(),
        state.gpu.driver_version.clone(),
        checkpoint.name(),
    );
    state.trace.append(mode, &record)?;

    let result = dispatched?;
    if let Some(error) = &result.error {
        return Err(AppError::Core(CoreError::Engine(error.clone())));
    }

    let comfy_response = serde_json::json!({
        "all_images": &result.images,
        "metrics": {
            "elapsed_time_sec": elapsed,
            "time_per_image_sec": record.time_per_image_s,
            "gpu": &state.gpu.name,
            "driver_version": &state.gpu.driver_version,
        },
        "raw": result.raw,
    });

    let filenames: Vec<String> = result.images.iter().map(|i| i.filename.clone()).collect();
    let run_record = RunRecord::from_generation(request, checkpoint, &workflow, filenames, mode);
    let run_id = state.registry.record_best_effort(&run_record).await;

    Ok(GenerateResponse {
        status: "success",
        message: "Workflow sent to ComfyUI successfully",
        comfy_response,
        workflow,
        generated_images: result.images,
        run_id,
    })
}
