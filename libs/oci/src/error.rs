//! Error types for registry operations.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors from OCI registry operations.
///
/// Variants split into two classes: transient failures a caller may retry
/// (see [`OciError::is_retryable`]) and protocol or content failures that
/// will not change on a second attempt.
#[derive(Debug, Error)]
pub enum OciError {
    /// Network or HTTP-level failure before a usable response was received.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Registry rejected the credentials, or none were given when required.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The manifest lists no layer with the requested media type.
    #[error("no layer with media type {media_type}")]
    LayerNotFound { media_type: String },

    /// Content did not hash to its declared digest.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Malformed or unsupported manifest, digest, or challenge.
    #[error("parse error: {0}")]
    Parse(String),

    /// Manifest or blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other unexpected registry status.
    #[error("registry returned {status} for {url}")]
    Registry { status: StatusCode, url: String },

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("layer too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("request timed out")]
    Timeout,
}

impl OciError {
    /// Whether a caller may reasonably retry the same pull.
    pub fn is_retryable(&self) -> bool {
        match self {
            OciError::Transport(_) | OciError::Timeout => true,
            OciError::Registry { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for OciError {
    fn from(err: serde_json::Error) -> Self {
        OciError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(OciError::Timeout.is_retryable());
        assert!(OciError::Registry {
            status: StatusCode::BAD_GATEWAY,
            url: "https://r/v2/".into(),
        }
        .is_retryable());
        assert!(OciError::Registry {
            status: StatusCode::TOO_MANY_REQUESTS,
            url: "https://r/v2/".into(),
        }
        .is_retryable());

        assert!(!OciError::Registry {
            status: StatusCode::BAD_REQUEST,
            url: "https://r/v2/".into(),
        }
        .is_retryable());
        assert!(!OciError::Authentication("denied".into()).is_retryable());
        assert!(!OciError::NotFound("x".into()).is_retryable());
        assert!(!OciError::Integrity {
            expected: "sha256:a".into(),
            actual: "sha256:b".into(),
        }
        .is_retryable());
    }
}
