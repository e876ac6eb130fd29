//! Error taxonomy (§7). Every component converts its local, driver-specific
//! errors into one of these tagged variants at the boundary; the Pipeline
//! Engine decides fatal-vs-continue purely from the `kind`, never by
//! matching on message text.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CognifyError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient backend error: {0}")]
    TransientBackend(String),

    #[error("permanent backend error: {0}")]
    PermanentBackend(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("degraded: {0}")]
    Degraded(String),

    #[error("cancelled")]
    Cancelled,
}

impl CognifyError {
    /// §7: whether the Pipeline Engine's retry policy (§5) applies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CognifyError::TransientBackend(_))
    }

    /// §7: whether the error is fatal to the run (as opposed to a recorded,
    /// non-fatal degradation).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CognifyError::Validation(_)
                | CognifyError::PermanentBackend(_)
                | CognifyError::Cancelled
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CognifyError::Validation(_) => "ValidationError",
            CognifyError::NotFound(_) => "NotFound",
            CognifyError::TransientBackend(_) => "TransientBackendError",
            CognifyError::PermanentBackend(_) => "PermanentBackendError",
            CognifyError::Integrity(_) => "IntegrityError",
            CognifyError::Degraded(_) => "DegradedError",
            CognifyError::Cancelled => "CancelledError",
        }
    }
}

pub type Result<T> = std::result::Result<T, CognifyError>;

/// §7: "a failed run exposes `{stage, kind, message, retryable}`".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunFailure {
    pub stage: String,
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl RunFailure {
    pub fn from_error(stage: impl Into<String>, err: &CognifyError) -> Self {
        Self {
            stage: stage.into(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable_and_not_fatal() {
        let e = CognifyError::TransientBackend("timeout".into());
        assert!(e.is_retryable());
        assert!(!e.is_fatal());
    }

    #[test]
    fn permanent_is_fatal_and_not_retryable() {
        let e = CognifyError::PermanentBackend("invalid key".into());
        assert!(!e.is_retryable());
        assert!(e.is_fatal());
    }

    #[test]
    fn integrity_is_neither_fatal_nor_retryable() {
        let e = CognifyError::Integrity("dangling edge".into());
        assert!(!e.is_retryable());
        assert!(!e.is_fatal());
    }

    #[test]
    fn run_failure_captures_kind_and_message() {
        let e = CognifyError::PermanentBackend("auth failure".into());
        let failure = RunFailure::from_error("extraction", &e);
        assert_eq!(failure.kind, "PermanentBackendError");
        assert_eq!(failure.stage, "extraction");
        assert!(!failure.retryable);
    }
}
