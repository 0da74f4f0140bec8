//! Domain errors that callers branch on.
//!
//! Everything else propagates as [`anyhow::Error`] with context attached.
//! These variants are the signals the UI layer treats differently from a
//! generic failure: a locked-out operation, a missing session, an absent
//! record, or a file rejected before upload.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetastreamError {
    /// The operation exists in the interface but is locked out.
    #[error("{0} is disabled: not supported in the current architecture")]
    OperationDisabled(&'static str),

    /// No credentials could be obtained, even after a forced refresh.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("record not found: {0}")]
    NotFound(String),

    /// The file failed local validation (extension or size).
    #[error("invalid file: {0}")]
    InvalidFile(String),
}

impl MetastreamError {
    /// True if `err` carries [`MetastreamError::OperationDisabled`], with or
    /// without added context.
    pub fn is_disabled(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<MetastreamError>(),
            Some(MetastreamError::OperationDisabled(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_is_detected_through_anyhow() {
        let err: anyhow::Error = MetastreamError::OperationDisabled("delete").into();
        assert!(MetastreamError::is_disabled(&err));
        assert_eq!(
            err.to_string(),
            "delete is disabled: not supported in the current architecture"
        );

        let other: anyhow::Error = MetastreamError::NotAuthenticated.into();
        assert!(!MetastreamError::is_disabled(&other));
    }
}
