//! Domain-level error taxonomy for Scriptgate.

use scriptgate_state::StorageError;

/// Scriptgate domain errors.
///
/// Quality defects are not errors: they are reported as blockers and
/// warnings on a `QualityReport`. Promotion refusals are values too.
#[derive(Debug, thiserror::Error)]
pub enum ScriptGateError {
    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("unknown section '{0}' (expected hook|feature1|feature2|feature3|cta)")]
    UnknownSection(String),

    #[error("unknown promotion segment '{0}' (expected core-icp|broad)")]
    UnknownSegment(String),

    #[error("unknown domain pack: {0}")]
    UnknownPack(String),

    #[error("version {job_id} not found for {root}")]
    VersionNotFound { root: String, job_id: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("job queue is closed")]
    QueueClosed,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Scriptgate domain operations.
pub type Result<T> = std::result::Result<T, ScriptGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_section_lists_valid_names() {
        let err = ScriptGateError::UnknownSection("outro".to_string());
        let msg = err.to_string();
        assert!(msg.contains("outro"));
        assert!(msg.contains("feature2"));
    }

    #[test]
    fn storage_errors_convert() {
        let err: ScriptGateError = StorageError::InvalidRoot("owner is empty".into()).into();
        assert!(err.to_string().contains("storage error"));
    }
}
