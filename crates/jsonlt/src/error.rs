//! Error types for JSONLT operations.

use crate::json::JsonObject;
use crate::keys::Key;

/// Errors raised by the store. One variant per failure kind; nothing is
/// retried internally, every error surfaces to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed bytes: invalid UTF-8, invalid JSON, a non-object line,
    /// duplicate object members, tombstone shape violations, or a header
    /// found past the first line.
    #[error("parse error: {0}")]
    Parse(String),

    /// Shape violations of keys, key specifiers, or records.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A format limit was exceeded: key length, record size, nesting
    /// depth, tuple arity, integer magnitude, or the file-size cap.
    #[error("limit exceeded: {0}")]
    Limit(String),

    /// The advisory file lock could not be acquired.
    #[error("lock error: {0}")]
    Lock(String),

    /// Filesystem failure not classified above.
    #[error("file error: {0}")]
    File(String),

    /// Optimistic conflict at transaction commit: the key's on-disk value
    /// no longer matches what the transaction snapshotted. Either side is
    /// `None` for create/delete conflicts.
    #[error("transaction conflict detected for key {key}")]
    Conflict {
        key: Key,
        expected: Option<JsonObject>,
        actual: Option<JsonObject>,
    },

    /// Transaction lifecycle violation: operations after commit or abort,
    /// or double finalisation.
    #[error("transaction error: {0}")]
    Transaction(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Prefix the message of a shape/parse error with positional context,
    /// leaving the variant intact.
    pub(crate) fn with_context(self, context: &str) -> Self {
        match self {
            Self::Parse(message) => Self::Parse(format!("{context}: {message}")),
            Self::InvalidKey(message) => Self::InvalidKey(format!("{context}: {message}")),
            Self::Limit(message) => Self::Limit(format!("{context}: {message}")),
            other => other,
        }
    }
}
