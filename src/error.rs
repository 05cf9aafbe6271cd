use thiserror::Error;

/// Internal cache failures.
///
/// None of these reach the HTTP caller: codec and serialization failures
/// degrade to "no entry found" at the store boundary. They exist so the
/// codec can propagate with `?` and so hosts can react to telemetry setup
/// problems at startup.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl CacheError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
