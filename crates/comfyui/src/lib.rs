//! ComfyUI client library.
//!
//! Provides the REST API client for workflow submission and
//! interruption, the dispatch-and-wait layer that normalizes engine
//! responses, and best-effort GPU identification for trace records.

pub mod api;
pub mod dispatch;
pub mod gpu;

pub use api::{EngineApiError, EngineClient, HttpEngineClient, SubmitResponse};
pub use dispatch::{DispatchError, DispatchResult, Dispatcher, GeneratedImage, JobState};
pub use gpu::{gpu_info, GpuInfo};
