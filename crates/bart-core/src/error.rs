//! Uniform failure shape for the provider gateways.

use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Normalized gateway failure. Gateways never let a provider error escape in
/// any other shape; the HTTP layer and the conversation controller both
/// branch on these variants.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A required credential is absent. Operator-facing, not user-actionable.
    #[error("{0}")]
    Config(String),

    /// Caller input was missing or empty.
    #[error("{0}")]
    Validation(String),

    /// The provider answered with a non-success status.
    #[error("upstream error {status}: {detail}")]
    Upstream { status: u16, detail: String },

    /// Network or response-parse failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// HTTP status the gateway surface answers with for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::Config(_) | GatewayError::Transport(_) => 500,
            GatewayError::Upstream { status, .. } => *status,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(GatewayError::Validation("x".into()).http_status(), 400);
        assert_eq!(GatewayError::Config("x".into()).http_status(), 500);
        assert_eq!(GatewayError::Transport("x".into()).http_status(), 500);
        let upstream = GatewayError::Upstream {
            status: 429,
            detail: "rate limited".into(),
        };
        assert_eq!(upstream.http_status(), 429);
    }
}
