//! Error taxonomy for cadgen.

/// Failures of an external collaborator (generation backend, visual critic,
/// dimension lookup).
///
/// These never escape the pipeline: every call site converts them into a
/// value on the run result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("{stage} timed out after {limit_ms}ms")]
    Timeout { stage: String, limit_ms: u64 },

    #[error("{0}")]
    Transport(String),

    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("No Python code extracted from response")]
    NoCode,

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Result type for adapter calls.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// cadgen domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CadgenError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown material: {0}")]
    UnknownMaterial(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cadgen domain operations.
pub type Result<T> = std::result::Result<T, CadgenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_names_stage() {
        let err = AdapterError::Timeout {
            stage: "generation".to_string(),
            limit_ms: 120_000,
        };
        assert_eq!(err.to_string(), "generation timed out after 120000ms");
    }

    #[test]
    fn test_no_code_display() {
        assert!(AdapterError::NoCode.to_string().contains("No Python code"));
    }

    #[test]
    fn test_cadgen_error_display() {
        let err = CadgenError::InvalidRequest("task text is empty".to_string());
        assert!(err.to_string().contains("invalid request"));

        let err = CadgenError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
