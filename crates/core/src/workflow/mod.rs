//! Workflow graph types and the request-to-graph compilers.
//!
//! A workflow is the node-graph document the inference engine
//! executes: a map from stable node id to a typed node whose inputs
//! are either literal values or `[node_id, output_slot]` links.
//! Compilation is pure (no filesystem or network access) and
//! deterministic: node ids are fixed per role, and the graph is backed
//! by a `BTreeMap`, so equal inputs serialize byte-for-byte equal.

pub mod img2img;
pub mod txt2img;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checkpoint::ResolvedCheckpoint;
use crate::error::CoreError;
use crate::request::GenerationRequest;

// ---------------------------------------------------------------------------
// Node class tags
// ---------------------------------------------------------------------------

pub const CLASS_CHECKPOINT_LOADER: &str = "CheckpointLoaderSimple";
pub const CLASS_TEXT_ENCODE: &str = "CLIPTextEncode";
pub const CLASS_EMPTY_LATENT: &str = "EmptyLatentImage";
pub const CLASS_KSAMPLER: &str = "KSampler";
pub const CLASS_VAE_DECODE: &str = "VAEDecode";
pub const CLASS_VAE_ENCODE: &str = "VAEEncode";
pub const CLASS_LOAD_IMAGE: &str = "LoadImage";
pub const CLASS_SAVE_IMAGE: &str = "SaveImage";
pub const CLASS_CONTROLNET_LOADER: &str = "ControlNetLoader";
pub const CLASS_CONTROLNET_APPLY: &str = "ControlNetApply";

/// Stable node ids, one per role.
///
/// Ids are deterministic functions of the node's role so that two
/// compiles of equal input produce structurally identical graphs.
pub mod node_id {
    pub const CHECKPOINT: &str = "1";
    pub const POSITIVE: &str = "2";
    pub const NEGATIVE: &str = "3";
    pub const LATENT: &str = "4";
    pub const SAMPLER: &str = "5";
    pub const DECODE: &str = "6";
    pub const SAVE: &str = "7";
    /// img2img only: the ingested source image loader.
    pub const SOURCE_IMAGE: &str = "8";

    pub fn controlnet_image(index: usize) -> String {
        format!("cn_image_{index}")
    }

    pub fn controlnet_model(index: usize) -> String {
        format!("cn_model_{index}")
    }

    pub fn controlnet_apply(index: usize) -> String {
        format!("cn_apply_{index}")
    }
}

/// Prefix the engine uses when naming output files.
pub const OUTPUT_FILENAME_PREFIX: &str = "photon";

// ---------------------------------------------------------------------------
// Graph types
// ---------------------------------------------------------------------------

/// Reference to another node's output slot; serializes as `[id, slot]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLink(pub String, pub u32);

/// One input slot of a node: a literal value or a link to an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeInput {
    Link(NodeLink),
    Value(serde_json::Value),
}

impl NodeInput {
    pub fn link(id: impl Into<String>, slot: u32) -> Self {
        Self::Link(NodeLink(id.into(), slot))
    }

    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Value(value.into())
    }
}

/// A typed node: class tag plus input slot assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub class_type: String,
    pub inputs: BTreeMap<String, NodeInput>,
}

impl WorkflowNode {
    pub fn new(class_type: &str) -> Self {
        Self {
            class_type: class_type.to_string(),
            inputs: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, slot: &str, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(slot.to_string(), NodeInput::value(value));
        self
    }

    pub fn with_link(mut self, slot: &str, id: impl Into<String>, output: u32) -> Self {
        self.inputs
            .insert(slot.to_string(), NodeInput::link(id, output));
        self
    }
}

/// A directed graph of typed nodes, keyed by stable id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    pub nodes: BTreeMap<String, WorkflowNode>,
}

impl WorkflowGraph {
    pub fn insert(&mut self, id: impl Into<String>, node: WorkflowNode) {
        self.nodes.insert(id.into(), node);
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    /// Count nodes with the given class tag.
    pub fn count_class(&self, class_type: &str) -> usize {
        self.nodes
            .values()
            .filter(|n| n.class_type == class_type)
            .count()
    }

    /// Check the structural invariants: every link target exists, and
    /// there is exactly one terminal save node.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        for (id, node) in &self.nodes {
            for input in node.inputs.values() {
                if let NodeInput::Link(NodeLink(target, _)) = input {
                    if !self.nodes.contains_key(target) {
                        return Err(CoreError::Validation(format!(
                            "Workflow node '{id}' references missing node '{target}'"
                        )));
                    }
                }
            }
        }

        let saves = self.count_class(CLASS_SAVE_IMAGE);
        if saves != 1 {
            return Err(CoreError::Validation(format!(
                "Workflow must contain exactly one save node, found {saves}"
            )));
        }

        Ok(())
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("workflow graphs always serialize")
    }
}

// ---------------------------------------------------------------------------
// Shared compilation pieces
// ---------------------------------------------------------------------------

/// Insert the checkpoint loader and both text encoders.
pub(crate) fn insert_model_and_encoders(
    graph: &mut WorkflowGraph,
    request: &GenerationRequest,
    checkpoint: &ResolvedCheckpoint,
) {
    graph.insert(
        node_id::CHECKPOINT,
        WorkflowNode::new(CLASS_CHECKPOINT_LOADER).with_value("ckpt_name", checkpoint.name()),
    );
    graph.insert(
        node_id::POSITIVE,
        WorkflowNode::new(CLASS_TEXT_ENCODE)
            .with_value("text", request.prompt.clone())
            .with_link("clip", node_id::CHECKPOINT, 1),
    );
    graph.insert(
        node_id::NEGATIVE,
        WorkflowNode::new(CLASS_TEXT_ENCODE)
            .with_value("text", request.negative_prompt.clone())
            .with_link("clip", node_id::CHECKPOINT, 1),
    );
}

/// Chain enabled ControlNet units between the positive encoder and the
/// sampler, in list order. Returns the conditioning link the sampler
/// should consume.
pub(crate) fn apply_controlnet_units(
    graph: &mut WorkflowGraph,
    request: &GenerationRequest,
) -> Result<NodeLink, CoreError> {
    let mut conditioning = NodeLink(node_id::POSITIVE.to_string(), 0);

    let config = match &request.controlnet {
        Some(config) if config.enabled => config,
        _ => return Ok(conditioning),
    };

    for (index, unit) in config.units.iter().enumerate() {
        if !unit.enabled {
            continue;
        }

        let image = unit.input_image.as_deref().ok_or_else(|| {
            CoreError::Validation(format!(
                "ControlNet unit {index} is enabled but has no input_image"
            ))
        })?;
        let model = unit.model.as_deref().ok_or_else(|| {
            CoreError::Validation(format!("ControlNet unit {index} is enabled but has no model"))
        })?;

        let image_id = node_id::controlnet_image(index);
        let model_id = node_id::controlnet_model(index);
        let apply_id = node_id::controlnet_apply(index);

        graph.insert(
            image_id.clone(),
            WorkflowNode::new(CLASS_LOAD_IMAGE).with_value("image", image),
        );
        graph.insert(
            model_id.clone(),
            WorkflowNode::new(CLASS_CONTROLNET_LOADER).with_value("control_net_name", model),
        );
        graph.insert(
            apply_id.clone(),
            WorkflowNode::new(CLASS_CONTROLNET_APPLY)
                .with_link("conditioning", conditioning.0.clone(), conditioning.1)
                .with_link("control_net", model_id, 0)
                .with_link("image", image_id, 0)
                .with_value("strength", unit.strength),
        );

        conditioning = NodeLink(apply_id, 0);
    }

    Ok(conditioning)
}

/// Insert the sampler, latent decoder, and save node.
///
/// `positive` is the conditioning link produced by
/// [`apply_controlnet_units`]; `denoise` is 1.0 for txt2img and the
/// request's denoising strength for img2img.
pub(crate) fn insert_sampler_and_outputs(
    graph: &mut WorkflowGraph,
    request: &GenerationRequest,
    positive: NodeLink,
    denoise: f64,
) {
    graph.insert(
        node_id::SAMPLER,
        WorkflowNode::new(CLASS_KSAMPLER)
            .with_value("seed", request.seed)
            .with_value("steps", request.steps)
            .with_value("cfg", request.cfg_scale)
            .with_value("sampler_name", request.sampler_name.clone())
            .with_value("scheduler", request.scheduler.clone())
            .with_value("denoise", denoise)
            .with_link("model", node_id::CHECKPOINT, 0)
            .with_link("positive", positive.0, positive.1)
            .with_link("negative", node_id::NEGATIVE, 0)
            .with_link("latent_image", node_id::LATENT, 0),
    );
    graph.insert(
        node_id::DECODE,
        WorkflowNode::new(CLASS_VAE_DECODE)
            .with_link("samples", node_id::SAMPLER, 0)
            .with_link("vae", node_id::CHECKPOINT, 2),
    );
    graph.insert(
        node_id::SAVE,
        WorkflowNode::new(CLASS_SAVE_IMAGE)
            .with_value("filename_prefix", OUTPUT_FILENAME_PREFIX)
            .with_link("images", node_id::DECODE, 0),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_serialize_as_arrays() {
        let node = WorkflowNode::new(CLASS_VAE_DECODE)
            .with_link("samples", "5", 0)
            .with_value("strength", 0.5);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["inputs"]["samples"], serde_json::json!(["5", 0]));
        assert_eq!(json["inputs"]["strength"], serde_json::json!(0.5));
    }

    #[test]
    fn links_round_trip_through_json() {
        let node = WorkflowNode::new(CLASS_KSAMPLER)
            .with_link("model", "1", 0)
            .with_value("steps", 20);
        let json = serde_json::to_string(&node).unwrap();
        let back: WorkflowNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn invariant_check_rejects_dangling_link() {
        let mut graph = WorkflowGraph::default();
        graph.insert(
            "7",
            WorkflowNode::new(CLASS_SAVE_IMAGE).with_link("images", "99", 0),
        );
        let err = graph.check_invariants().unwrap_err();
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn invariant_check_requires_single_save_node() {
        let mut graph = WorkflowGraph::default();
        graph.insert("7", WorkflowNode::new(CLASS_SAVE_IMAGE));
        graph.insert("9", WorkflowNode::new(CLASS_SAVE_IMAGE));
        assert!(graph.check_invariants().is_err());

        let mut empty = WorkflowGraph::default();
        empty.insert("1", WorkflowNode::new(CLASS_CHECKPOINT_LOADER));
        assert!(empty.check_invariants().is_err());
    }
}
