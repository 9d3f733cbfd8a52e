//! Centralized error types for mailsift.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::Uid;

/// All errors produced by the mailsift library.
///
/// An empty search result is never an error: every layer returns an empty
/// [`IdSet`](crate::search::idset::IdSet) for "nothing matched".
#[derive(Error, Debug)]
pub enum SearchError {
    /// Connection or protocol-level failure reported by the mail store.
    /// Not retried; surfaced verbatim to the caller.
    #[error("Mail store transport error: {0}")]
    Transport(String),

    /// The mail store refused a command (unknown search key, bad charset).
    #[error("Mail store rejected command: {0}")]
    Rejected(String),

    /// The mail store returned data that cannot be interpreted.
    #[error("Malformed response from mail store: {0}")]
    MalformedResponse(String),

    /// The requested mailbox does not exist in the store.
    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    /// No message with this identifier exists in the selected mailbox.
    #[error("Message not found: UID {0}")]
    MessageNotFound(Uid),

    /// A text query could not be turned into a search tree.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, SearchError>`.
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error only says that a single message is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MessageNotFound(_))
    }
}
