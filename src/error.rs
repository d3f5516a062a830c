//! Custom error types for Stowaway
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. Every message is meant to be shown to the
//! operator as-is.

use thiserror::Error;

/// The main error type for Stowaway operations
#[derive(Error, Debug)]
pub enum StowawayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid backup options (empty source, bad compression level, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Wrong magic byte, unknown algorithm id or malformed artifact
    #[error("Format error: {0}")]
    Format(String),

    /// CRC32 disagreement between stored and recomputed values
    #[error("Checksum mismatch in {context}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        context: String,
        expected: u32,
        actual: u32,
    },

    /// Encryption errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// A recovery stage failed; earlier stages are not rolled back
    #[error("Recovery failed while {stage}: {source}")]
    RecoveryFailed {
        stage: &'static str,
        #[source]
        source: Box<StowawayError>,
    },
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Format,
    ChecksumMismatch,
    Io,
    Other,
}

impl StowawayError {
    /// Create a "not found" error for input files
    pub fn file_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "File",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for backup records
    pub fn record_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup record",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for backup artifacts
    pub fn artifact_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup artifact",
            identifier: identifier.into(),
        }
    }

    /// Wrap this error as the failure of a recovery stage
    pub fn in_stage(self, stage: &'static str) -> Self {
        Self::RecoveryFailed {
            stage,
            source: Box::new(self),
        }
    }

    /// Prefix the message with `what`, keeping the variant
    pub fn with_context(self, what: &str) -> Self {
        let prefix = |msg: String| format!("{}: {}", what, msg);
        match self {
            Self::Config(m) => Self::Config(prefix(m)),
            Self::Validation(m) => Self::Validation(prefix(m)),
            Self::Io(m) => Self::Io(prefix(m)),
            Self::Json(m) => Self::Json(prefix(m)),
            Self::Format(m) => Self::Format(prefix(m)),
            Self::Encryption(m) => Self::Encryption(prefix(m)),
            Self::Storage(m) => Self::Storage(prefix(m)),
            Self::NotFound {
                entity_type,
                identifier,
            } => Self::NotFound {
                entity_type,
                identifier: prefix(identifier),
            },
            Self::ChecksumMismatch {
                context,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                context: prefix(context),
                expected,
                actual,
            },
            Self::RecoveryFailed { stage, source } => Self::RecoveryFailed {
                stage,
                source: Box::new(source.with_context(what)),
            },
        }
    }

    /// Classify this error, looking through recovery stage wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Format(_) => ErrorKind::Format,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::Io(_) | Self::Storage(_) => ErrorKind::Io,
            Self::RecoveryFailed { source, .. } => source.kind(),
            Self::Json(_) | Self::Encryption(_) => ErrorKind::Other,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

impl From<std::io::Error> for StowawayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StowawayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for Stowaway operations
pub type StowawayResult<T> = Result<T, StowawayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StowawayError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = StowawayError::record_not_found("notes.txt");
        assert_eq!(err.to_string(), "Backup record not found: notes.txt");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = StowawayError::ChecksumMismatch {
            context: "a.huff".into(),
            expected: 0xec4ac3d0,
            actual: 0x1,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch in a.huff: expected ec4ac3d0, got 00000001"
        );
    }

    #[test]
    fn test_stage_wrapper_keeps_kind() {
        let err = StowawayError::Format("bad magic".into()).in_stage("unpacking");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(
            err.to_string(),
            "Recovery failed while unpacking: Format error: bad magic"
        );
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = StowawayError::Format("expected 5 bytes, archive held 2".into())
            .with_context("Failed to extract 'a.txt'");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(
            err.to_string(),
            "Format error: Failed to extract 'a.txt': expected 5 bytes, archive held 2"
        );

        let err = StowawayError::Io("disk full".into()).with_context("Failed to extract 'b'");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StowawayError = io_err.into();
        assert!(matches!(err, StowawayError::Io(_)));
    }
}
