use std::sync::Arc;
use std::time::Duration;

use photon_comfyui::api::EngineClient;
use photon_comfyui::dispatch::Dispatcher;
use photon_comfyui::gpu::GpuInfo;
use photon_core::error::CoreError;
use photon_core::trace::TraceWriter;
use photon_registry::RegistryClient;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Single-job handle over the inference engine.
    pub dispatcher: Arc<Dispatcher>,
    /// Append-only inference trace writer.
    pub trace: Arc<TraceWriter>,
    /// Best-effort run-registry client.
    pub registry: Arc<RegistryClient>,
    /// GPU identity, captured once at startup.
    pub gpu: GpuInfo,
}

impl AppState {
    /// Assemble state from configuration and an engine client.
    ///
    /// The engine client is injected so integration tests can
    /// substitute a double for the engine collaborator.
    pub fn new(
        config: ServerConfig,
        engine: Arc<dyn EngineClient>,
        gpu: GpuInfo,
    ) -> Result<Self, CoreError> {
        let dispatcher = Dispatcher::new(
            engine,
            config.engine_url.clone(),
            Duration::from_millis(config.engine_poll_interval_ms),
            Duration::from_secs(config.engine_wait_timeout_secs),
        );
        let trace = TraceWriter::new(&config.traces_dir)?;
        let registry = RegistryClient::new(
            config.registry_url.clone(),
            Duration::from_secs(config.registry_timeout_secs),
        );

        Ok(Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            trace: Arc::new(trace),
            registry: Arc::new(registry),
            gpu,
        })
    }
}
