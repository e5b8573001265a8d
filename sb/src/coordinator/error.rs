//! Coordinator error types

use thiserror::Error;

/// Failures of the coordinator's own infrastructure
///
/// Errors raised by individual subscribers never surface here.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Subscriber '{0}' requested a zero interval")]
    ZeroInterval(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("Coordinator is shut down")]
    ShutDown,

    #[error("No async runtime available to persist documents")]
    NoRuntime,
}
