//! Generation request types and field validation.
//!
//! [`GenerationRequest`] is the wire format accepted by both the
//! txt2img and img2img endpoints. Numeric bounds are enforced with
//! `validator` derives; mode-specific required fields are checked in
//! [`GenerationRequest::validate_for_mode`].

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Maximum allowed prompt length in characters.
pub const MAX_PROMPT_LENGTH: usize = 10_000;

/// Which generation pipeline a request runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Txt2Img,
    Img2Img,
}

impl GenerationMode {
    /// Canonical lowercase tag, used in trace file names and run records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Txt2Img => "txt2img",
            Self::Img2Img => "img2img",
        }
    }
}

/// Semantic parameters for one generation request.
///
/// txt2img and img2img share this type; `input_image` and
/// `denoising_strength` are only consulted (and required) in img2img
/// mode.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[serde(default)]
    pub prompt: String,

    #[serde(default)]
    pub negative_prompt: String,

    #[serde(default = "default_dimension")]
    #[validate(range(min = 1, max = 8192))]
    pub width: u32,

    #[serde(default = "default_dimension")]
    #[validate(range(min = 1, max = 8192))]
    pub height: u32,

    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 64))]
    pub batch_size: u32,

    #[serde(default = "default_batch_count")]
    #[validate(range(min = 1))]
    pub batch_count: u32,

    #[serde(default = "default_steps")]
    #[validate(range(min = 1, max = 1000))]
    pub steps: u32,

    #[serde(default = "default_cfg_scale")]
    #[validate(range(min = 0.0))]
    pub cfg_scale: f64,

    #[serde(default = "default_sampler")]
    pub sampler_name: String,

    #[serde(default = "default_scheduler")]
    pub scheduler: String,

    #[serde(default)]
    pub seed: i64,

    /// Requested checkpoint file name. Subject to fallback when absent
    /// or not present in the engine's model directory.
    #[serde(default, rename = "ckpt_name")]
    pub checkpoint_name: Option<String>,

    #[serde(default)]
    pub vae_name: Option<String>,

    /// LoRA configurations, passed through to run provenance untouched.
    #[serde(default, alias = "lora")]
    pub loras: Vec<serde_json::Value>,

    /// img2img only: how far the output may diverge from the input.
    #[validate(range(min = 0.0, max = 1.0))]
    pub denoising_strength: Option<f64>,

    /// img2img only: base64 (optionally data-URL-prefixed) image payload.
    pub input_image: Option<String>,

    #[serde(default)]
    pub controlnet: Option<ControlNetConfig>,
}

/// Auxiliary conditioning configuration attached to a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlNetConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub units: Vec<ControlNetUnit>,
}

/// One conditioning unit: a guide image plus a model and strength.
///
/// `input_image` is a file name already present in the engine's input
/// directory (placed there via the upload endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlNetUnit {
    #[serde(default)]
    pub enabled: bool,
    pub input_image: Option<String>,
    pub model: Option<String>,
    #[serde(default = "default_strength")]
    pub strength: f64,
}

impl GenerationRequest {
    /// Check mode-specific required fields, then numeric bounds.
    ///
    /// Missing-field errors name the offending field so the caller can
    /// return a actionable 400.
    pub fn validate_for_mode(&self, mode: GenerationMode) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "Missing required field: prompt".to_string(),
            ));
        }
        if self.prompt.len() > MAX_PROMPT_LENGTH {
            return Err(CoreError::Validation(format!(
                "Prompt exceeds maximum length of {MAX_PROMPT_LENGTH} characters"
            )));
        }

        if mode == GenerationMode::Img2Img {
            if self.input_image.is_none() {
                return Err(CoreError::Validation(
                    "Missing required field: input_image".to_string(),
                ));
            }
            if self.denoising_strength.is_none() {
                return Err(CoreError::Validation(
                    "Missing required field: denoising_strength".to_string(),
                ));
            }
        }

        self.validate()
            .map_err(|e| CoreError::Validation(format_validation_errors(&e)))
    }
}

/// Flatten `validator` output into a single human-readable message.
fn format_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<String> = errors.errors().keys().map(|k| k.to_string()).collect();
    fields.sort_unstable();
    format!("Invalid value for field(s): {}", fields.join(", "))
}

fn default_dimension() -> u32 {
    512
}

fn default_batch_size() -> u32 {
    1
}

fn default_batch_count() -> u32 {
    1
}

fn default_steps() -> u32 {
    20
}

fn default_cfg_scale() -> f64 {
    7.0
}

fn default_sampler() -> String {
    "euler".to_string()
}

fn default_scheduler() -> String {
    "normal".to_string()
}

fn default_strength() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_request() -> GenerationRequest {
        serde_json::from_value(serde_json::json!({
            "prompt": "a red fox in a snowy forest"
        }))
        .expect("minimal request should deserialize")
    }

    #[test]
    fn defaults_applied_on_deserialize() {
        let req = minimal_request();
        assert_eq!(req.width, 512);
        assert_eq!(req.height, 512);
        assert_eq!(req.batch_size, 1);
        assert_eq!(req.steps, 20);
        assert_eq!(req.cfg_scale, 7.0);
        assert_eq!(req.sampler_name, "euler");
        assert_eq!(req.scheduler, "normal");
        assert_eq!(req.seed, 0);
    }

    #[test]
    fn txt2img_minimal_request_valid() {
        assert!(minimal_request()
            .validate_for_mode(GenerationMode::Txt2Img)
            .is_ok());
    }

    #[test]
    fn empty_prompt_rejected() {
        let mut req = minimal_request();
        req.prompt = "   ".to_string();
        let err = req.validate_for_mode(GenerationMode::Txt2Img).unwrap_err();
        assert!(err.to_string().contains("prompt"));
    }

    #[test]
    fn oversized_prompt_rejected() {
        let mut req = minimal_request();
        req.prompt = "x".repeat(MAX_PROMPT_LENGTH + 1);
        let err = req.validate_for_mode(GenerationMode::Txt2Img).unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[test]
    fn img2img_requires_input_image() {
        let mut req = minimal_request();
        req.denoising_strength = Some(0.6);
        let err = req.validate_for_mode(GenerationMode::Img2Img).unwrap_err();
        assert!(err.to_string().contains("input_image"));
    }

    #[test]
    fn img2img_requires_denoising_strength() {
        let mut req = minimal_request();
        req.input_image = Some("aGVsbG8=".to_string());
        let err = req.validate_for_mode(GenerationMode::Img2Img).unwrap_err();
        assert!(err.to_string().contains("denoising_strength"));
    }

    #[test]
    fn denoising_strength_out_of_range_rejected() {
        let mut req = minimal_request();
        req.input_image = Some("aGVsbG8=".to_string());
        req.denoising_strength = Some(1.5);
        let err = req.validate_for_mode(GenerationMode::Img2Img).unwrap_err();
        assert!(err.to_string().contains("denoising_strength"));
    }

    #[test]
    fn zero_width_rejected() {
        let mut req = minimal_request();
        req.width = 0;
        let err = req.validate_for_mode(GenerationMode::Txt2Img).unwrap_err();
        assert!(err.to_string().contains("width"));
    }

    #[test]
    fn ckpt_name_alias_accepted() {
        let req: GenerationRequest = serde_json::from_value(serde_json::json!({
            "prompt": "p",
            "ckpt_name": "model.safetensors"
        }))
        .unwrap();
        assert_eq!(req.checkpoint_name.as_deref(), Some("model.safetensors"));
    }

    #[test]
    fn mode_tags_are_stable() {
        assert_eq!(GenerationMode::Txt2Img.as_str(), "txt2img");
        assert_eq!(GenerationMode::Img2Img.as_str(), "img2img");
    }
}
