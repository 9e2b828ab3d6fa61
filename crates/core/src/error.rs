/// Domain-level error taxonomy.
///
/// Each variant corresponds to one failure class of the generation
/// pipeline; the HTTP layer maps variants to status codes
/// (`Validation` and `InvalidImage` are user-correctable 400s, the
/// rest are 500s).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A request field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The input image payload could not be decoded.
    #[error("Invalid input image: {0}")]
    InvalidImage(String),

    /// The engine's model directory contains no usable checkpoints.
    #[error("No checkpoints available on server")]
    NoCheckpointsAvailable,

    /// A filesystem write or verification failed during ingestion.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The inference engine reported a failure or was unreachable.
    /// Carries the engine's own message verbatim.
    #[error("{0}")]
    Engine(String),
}
