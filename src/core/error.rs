//! Error types.
//!
//! All failures are returned to the immediate caller. A missing key on a
//! load is normal empty state and never surfaces here.

use std::path::PathBuf;
use thiserror::Error;

/// Error conditions raised by the state database.
#[derive(Debug, Error)]
pub enum StateDbError {
    /// Backing store unreachable, connection dropped, or an operation timed out.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// The store answered but refused the command (e.g. WRONGTYPE).
    #[error("store rejected command: {kind} {message}")]
    StoreRejected { kind: String, message: String },

    /// A stored value could not be interpreted.
    #[error("invalid value stored at {key}: {reason}")]
    InvalidStoredValue { key: String, reason: String },

    /// Legacy snapshot present but unreadable under any known schema.
    #[error("corrupt legacy file {}: {reason}", path.display())]
    CorruptLegacyFile { path: PathBuf, reason: String },

    /// Legacy snapshot carries a version marker this reader does not handle.
    #[error("unsupported legacy schema version {version} in {}", path.display())]
    UnsupportedSchemaVersion { path: PathBuf, version: i64 },

    /// The pre-migration backup copy could not be written.
    #[error("failed to write backup {}: {source}", path.display())]
    BackupWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State was merged into the store but the legacy file could not be renamed.
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    FinalizeRenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Caller supplied an unusable argument.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl StateDbError {
    /// Create a StoreUnavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a CorruptLegacyFile error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptLegacyFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidStoredValue error.
    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidStoredValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Check if a caller may reasonably retry the operation.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Check if this error means the legacy file could not be decoded.
    pub fn is_legacy_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::CorruptLegacyFile { .. } | Self::UnsupportedSchemaVersion { .. }
        )
    }

    /// Check if this is the finalize-only partial success.
    ///
    /// The store already holds the migrated state and a backup exists.
    pub fn is_partial_success(&self) -> bool {
        matches!(self, Self::FinalizeRenameFailed { .. })
    }
}

/// Result type using StateDbError.
pub type StateDbResult<T> = Result<T, StateDbError>;
