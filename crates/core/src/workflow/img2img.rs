//! Image-to-image workflow compilation.
//!
//! Identical to txt2img except the initial latent comes from encoding
//! the ingested source image, scaled by the request's denoising
//! strength.

use crate::checkpoint::ResolvedCheckpoint;
use crate::error::CoreError;
use crate::request::GenerationRequest;

use super::{
    apply_controlnet_units, insert_model_and_encoders, insert_sampler_and_outputs, node_id,
    WorkflowGraph, WorkflowNode, CLASS_LOAD_IMAGE, CLASS_VAE_ENCODE,
};

/// Compile an img2img request into a workflow graph.
///
/// `input_image` is the file name of the ingested source image inside
/// the engine's input directory.
pub fn compile(
    request: &GenerationRequest,
    checkpoint: &ResolvedCheckpoint,
    input_image: &str,
) -> Result<WorkflowGraph, CoreError> {
    if request.prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "Missing required field: prompt".to_string(),
        ));
    }
    let denoise = request.denoising_strength.ok_or_else(|| {
        CoreError::Validation("Missing required field: denoising_strength".to_string())
    })?;

    let mut graph = WorkflowGraph::default();
    insert_model_and_encoders(&mut graph, request, checkpoint);

    graph.insert(
        node_id::SOURCE_IMAGE,
        WorkflowNode::new(CLASS_LOAD_IMAGE).with_value("image", input_image),
    );
    graph.insert(
        node_id::LATENT,
        WorkflowNode::new(CLASS_VAE_ENCODE)
            .with_link("pixels", node_id::SOURCE_IMAGE, 0)
            .with_link("vae", node_id::CHECKPOINT, 2),
    );

    let positive = apply_controlnet_units(&mut graph, request)?;
    insert_sampler_and_outputs(&mut graph, request, positive, denoise);

    graph.check_invariants()?;
    Ok(graph)
}
