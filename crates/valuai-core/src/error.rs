//! Error taxonomy surfaced to callers of the AI layer.

use std::time::Duration;

/// Typed failure of a facade or service call.
///
/// Adapters report failures as `anyhow::Error`; the base service wraps
/// those into `ExternalService`. Timeouts and validation failures are
/// produced by the service itself and pass through untouched.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// Malformed or missing caller input. Raised before any vendor call.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The vendor did not answer within the configured duration.
    #[error("{provider} request timed out after {}ms", duration.as_millis())]
    Timeout { provider: String, duration: Duration },

    /// Any other vendor-side failure. `source` keeps the full chain for
    /// logging; `Display` only shows the summary.
    #[error("{provider} service error: {message}")]
    ExternalService {
        provider: String,
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AiError {
    pub(crate) fn external(provider: &str, source: anyhow::Error) -> Self {
        Self::ExternalService {
            provider: provider.to_string(),
            message: source.to_string(),
            source,
        }
    }

    /// Short machine-readable tag, used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            AiError::Validation(_) => "validation",
            AiError::Timeout { .. } => "timeout",
            AiError::ExternalService { .. } => "external_service",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AiError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, AiError>;
