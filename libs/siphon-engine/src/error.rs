use siphon_api::error::ReplicaError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported type: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Replica(#[from] ReplicaError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For `Replica` variant, context is added to the inner `ReplicaError`.
    /// For other variants, context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Replica(e) => EngineError::Replica(e.with_context(ctx)),
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            EngineError::Schema(msg) => EngineError::Schema(format!("{ctx}: {msg}")),
            EngineError::Decode(msg) => EngineError::Decode(format!("{ctx}: {msg}")),
            EngineError::Unsupported(msg) => EngineError::Unsupported(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
