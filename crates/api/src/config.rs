use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local engine checkout next
/// to the server. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `5001`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds. Generous by default because a
    /// dispatch blocks for the whole generation.
    pub request_timeout_secs: u64,
    /// Base HTTP URL of the inference engine.
    pub engine_url: String,
    /// Interval between history polls while waiting on the engine.
    pub engine_poll_interval_ms: u64,
    /// Upper bound on one dispatch-and-wait cycle.
    pub engine_wait_timeout_secs: u64,
    /// Directory the engine reads input images from.
    pub engine_input_dir: PathBuf,
    /// Directory the engine writes generated images to.
    pub engine_output_dir: PathBuf,
    /// Directory holding checkpoint model files.
    pub checkpoints_dir: PathBuf,
    /// Directory holding ControlNet model files.
    pub controlnet_models_dir: PathBuf,
    /// Directory images are served from before falling back to the
    /// engine output directory.
    pub served_images_dir: PathBuf,
    /// Directory the inference trace CSVs live in.
    pub traces_dir: PathBuf,
    /// Base HTTP URL of the run-registry collaborator.
    pub registry_url: String,
    /// Short timeout for registry calls, in seconds.
    pub registry_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                          |
    /// |----------------------------|----------------------------------|
    /// | `HOST`                     | `127.0.0.1`                      |
    /// | `PORT`                     | `5001`                           |
    /// | `CORS_ORIGINS`             | `http://localhost:8080`          |
    /// | `REQUEST_TIMEOUT_SECS`     | `600`                            |
    /// | `COMFYUI_URL`              | `http://127.0.0.1:8188`          |
    /// | `COMFYUI_POLL_INTERVAL_MS` | `500`                            |
    /// | `COMFYUI_WAIT_TIMEOUT_SECS`| `600`                            |
    /// | `COMFYUI_INPUT_DIR`        | `ComfyUI/input`                  |
    /// | `COMFYUI_OUTPUT_DIR`       | `ComfyUI/output`                 |
    /// | `CHECKPOINTS_DIR`          | `ComfyUI/models/checkpoints`     |
    /// | `CONTROLNET_MODELS_DIR`    | `ComfyUI/models/controlnet`      |
    /// | `SERVED_IMAGES_DIR`        | `served_images`                  |
    /// | `INFERENCE_TRACES_DIR`     | `inference_traces`               |
    /// | `REGISTRY_URL`             | `http://127.0.0.1:5005`          |
    /// | `REGISTRY_TIMEOUT_SECS`    | `5`                              |
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "127.0.0.1"),
            port: parse_env("PORT", 5001),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:8080")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 600),
            engine_url: env_or("COMFYUI_URL", "http://127.0.0.1:8188"),
            engine_poll_interval_ms: parse_env("COMFYUI_POLL_INTERVAL_MS", 500),
            engine_wait_timeout_secs: parse_env("COMFYUI_WAIT_TIMEOUT_SECS", 600),
            engine_input_dir: env_or("COMFYUI_INPUT_DIR", "ComfyUI/input").into(),
            engine_output_dir: env_or("COMFYUI_OUTPUT_DIR", "ComfyUI/output").into(),
            checkpoints_dir: env_or("CHECKPOINTS_DIR", "ComfyUI/models/checkpoints").into(),
            controlnet_models_dir: env_or("CONTROLNET_MODELS_DIR", "ComfyUI/models/controlnet")
                .into(),
            served_images_dir: env_or("SERVED_IMAGES_DIR", "served_images").into(),
            traces_dir: env_or("INFERENCE_TRACES_DIR", "inference_traces").into(),
            registry_url: env_or("REGISTRY_URL", "http://127.0.0.1:5005"),
            registry_timeout_secs: parse_env("REGISTRY_TIMEOUT_SECS", 5),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid value: {e}")),
        Err(_) => default,
    }
}
