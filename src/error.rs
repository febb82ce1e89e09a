//! Error types for Relay
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;

/// All error types that can occur while running a turn
#[derive(Debug, Error)]
pub enum RelayError {
    /// Remote provider connect, handshake or discovery failed
    #[error("Connect error: {0}")]
    Connect(String),

    /// A local tool with the same name is already registered
    #[error("Tool already registered: {0}")]
    RegistrationConflict(String),

    /// Tool name could not be resolved anywhere
    #[error("Lookup failed: {0}")]
    LookupFailure(String),

    /// Tool ran but returned an error
    #[error("Invocation failed: {0}")]
    Invocation(String),

    /// Malformed tool-call text or result envelope
    #[error("Parse error: {0}")]
    Parse(String),

    /// Non end-of-stream receive error while reading fragments
    #[error("Stream error: {0}")]
    Stream(String),

    /// Pipeline construction rejected its inputs
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Model provider error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_conflict_error() {
        let err = RelayError::RegistrationConflict("recall_context".to_string());
        assert_eq!(err.to_string(), "Tool already registered: recall_context");
    }

    #[test]
    fn test_lookup_failure_error() {
        let err = RelayError::LookupFailure("tool 'echo' not found".to_string());
        assert_eq!(err.to_string(), "Lookup failed: tool 'echo' not found");
    }

    #[test]
    fn test_connect_error() {
        let err = RelayError::Connect("connection refused".to_string());
        assert_eq!(err.to_string(), "Connect error: connection refused");
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: RelayError = LlmError::InvalidResponse("empty choices".to_string()).into();
        assert!(matches!(err, RelayError::Llm(_)));
        assert!(err.to_string().contains("empty choices"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RelayError = io_err.into();
        assert!(matches!(err, RelayError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: RelayError = json_err.into();
        assert!(matches!(err, RelayError::Json(_)));
    }
}
