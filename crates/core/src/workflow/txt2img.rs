//! Text-to-image workflow compilation.

use crate::checkpoint::ResolvedCheckpoint;
use crate::error::CoreError;
use crate::request::GenerationRequest;

use super::{
    apply_controlnet_units, insert_model_and_encoders, insert_sampler_and_outputs, node_id,
    WorkflowGraph, WorkflowNode, CLASS_EMPTY_LATENT,
};

/// Compile a txt2img request into a workflow graph.
///
/// The initial latent is an empty latent sized
/// `width x height x batch_size`; the sampler runs at full denoise.
pub fn compile(
    request: &GenerationRequest,
    checkpoint: &ResolvedCheckpoint,
) -> Result<WorkflowGraph, CoreError> {
    if request.prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "Missing required field: prompt".to_string(),
        ));
    }

    let mut graph = WorkflowGraph::default();
    insert_model_and_encoders(&mut graph, request, checkpoint);

    graph.insert(
        node_id::LATENT,
        WorkflowNode::new(CLASS_EMPTY_LATENT)
            .with_value("width", request.width)
            .with_value("height", request.height)
            .with_value("batch_size", request.batch_size),
    );

    let positive = apply_controlnet_units(&mut graph, request)?;
    insert_sampler_and_outputs(&mut graph, request, positive, 1.0);

    graph.check_invariants()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::select_checkpoint;
    use crate::request::{ControlNetConfig, ControlNetUnit};
    use crate::workflow::{NodeInput, CLASS_CONTROLNET_APPLY, CLASS_KSAMPLER, CLASS_SAVE_IMAGE};

    fn request() -> GenerationRequest {
        serde_json::from_value(serde_json::json!({
            "prompt": "a red fox in a snowy forest",
            "steps": 20,
            "cfg_scale": 7.0,
            "seed": 42,
            "width": 512,
            "height": 512,
            "batch_size": 1
        }))
        .unwrap()
    }

    fn checkpoint() -> ResolvedCheckpoint {
        select_checkpoint(None, &["model.safetensors".to_string()]).unwrap()
    }

    #[test]
    fn contains_one_latent_and_one_save_node() {
        for batch_size in [1u32, 4, 16] {
            let mut req = request();
            req.batch_size = batch_size;
            let graph = compile(&req, &checkpoint()).unwrap();

            assert_eq!(graph.count_class(CLASS_EMPTY_LATENT), 1);
            assert_eq!(graph.count_class(CLASS_SAVE_IMAGE), 1);

            let latent = graph.get(node_id::LATENT).unwrap();
            assert_eq!(
                latent.inputs["batch_size"],
                NodeInput::value(batch_size),
            );
        }
    }

    #[test]
    fn sampler_carries_request_parameters() {
        let graph = compile(&request(), &checkpoint()).unwrap();
        let sampler = graph.get(node_id::SAMPLER).unwrap();
        assert_eq!(sampler.class_type, CLASS_KSAMPLER);
        assert_eq!(sampler.inputs["seed"], NodeInput::value(42));
        assert_eq!(sampler.inputs["steps"], NodeInput::value(20));
        assert_eq!(sampler.inputs["cfg"], NodeInput::value(7.0));
        assert_eq!(sampler.inputs["denoise"], NodeInput::value(1.0));
        assert_eq!(sampler.inputs["positive"], NodeInput::link(node_id::POSITIVE, 0));
    }

    #[test]
    fn checkpoint_name_flows_into_loader() {
        let graph = compile(&request(), &checkpoint()).unwrap();
        let loader = graph.get(node_id::CHECKPOINT).unwrap();
        assert_eq!(
            loader.inputs["ckpt_name"],
            NodeInput::value("model.safetensors"),
        );
    }

    #[test]
    fn equal_inputs_compile_to_identical_bytes() {
        let a = serde_json::to_string(&compile(&request(), &checkpoint()).unwrap()).unwrap();
        let b = serde_json::to_string(&compile(&request(), &checkpoint()).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_prompt_is_a_validation_error() {
        let mut req = request();
        req.prompt = String::new();
        let err = compile(&req, &checkpoint()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn controlnet_units_chain_in_list_order() {
        let mut req = request();
        req.controlnet = Some(ControlNetConfig {
            enabled: true,
            units: vec![
                ControlNetUnit {
                    enabled: true,
                    input_image: Some("pose.png".to_string()),
                    model: Some("openpose.safetensors".to_string()),
                    strength: 0.8,
                },
                ControlNetUnit {
                    enabled: false,
                    input_image: Some("skipped.png".to_string()),
                    model: Some("skipped.safetensors".to_string()),
                    strength: 1.0,
                },
                ControlNetUnit {
                    enabled: true,
                    input_image: Some("depth.png".to_string()),
                    model: Some("depth.safetensors".to_string()),
                    strength: 0.5,
                },
            ],
        });

        let graph = compile(&req, &checkpoint()).unwrap();
        assert_eq!(graph.count_class(CLASS_CONTROLNET_APPLY), 2);

        // First enabled unit conditions on the positive encoder.
        let first = graph.get(&node_id::controlnet_apply(0)).unwrap();
        assert_eq!(
            first.inputs["conditioning"],
            NodeInput::link(node_id::POSITIVE, 0),
        );

        // Unit 1 is disabled, so unit 2 chains directly after unit 0.
        let second = graph.get(&node_id::controlnet_apply(2)).unwrap();
        assert_eq!(
            second.inputs["conditioning"],
            NodeInput::link(node_id::controlnet_apply(0), 0),
        );

        // The sampler consumes the end of the chain.
        let sampler = graph.get(node_id::SAMPLER).unwrap();
        assert_eq!(
            sampler.inputs["positive"],
            NodeInput::link(node_id::controlnet_apply(2), 0),
        );
    }

    #[test]
    fn enabled_unit_without_image_is_rejected() {
        let mut req = request();
        req.controlnet = Some(ControlNetConfig {
            enabled: true,
            units: vec![ControlNetUnit {
                enabled: true,
                input_image: None,
                model: Some("openpose.safetensors".to_string()),
                strength: 1.0,
            }],
        });
        let err = compile(&req, &checkpoint()).unwrap_err();
        assert!(err.to_string().contains("input_image"));
    }

    #[test]
    fn disabled_controlnet_config_adds_no_nodes() {
        let mut req = request();
        req.controlnet = Some(ControlNetConfig {
            enabled: false,
            units: vec![ControlNetUnit {
                enabled: true,
                input_image: Some("pose.png".to_string()),
                model: Some("openpose.safetensors".to_string()),
                strength: 1.0,
            }],
        });
        let graph = compile(&req, &checkpoint()).unwrap();
        assert_eq!(graph.count_class(CLASS_CONTROLNET_APPLY), 0);
    }
}
