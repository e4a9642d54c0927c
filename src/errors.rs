/// Domain-specific error types for the hedging engine.
/// Nothing here is fatal to the process. The engine must:
/// - Recover provider failures inside the fallback chain
/// - Skip a tick on invalid pricing input instead of publishing NaN
/// - Absorb commentary failures into a placeholder string
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("price source {source_name} failed: {reason}")]
    Provider { source_name: &'static str, reason: String },

    #[error("invalid pricing input: {0}")]
    Validation(String),

    #[error("commentary error: {0}")]
    Commentary(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl EngineError {
    pub fn provider(source_name: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Provider {
            source_name,
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
