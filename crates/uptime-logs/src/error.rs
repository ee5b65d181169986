//! Error types for the history log.

use thiserror::Error;

/// Result type alias for history log operations.
pub type LogResult<T> = Result<T, LogError>;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log not found: {0}")]
    NotFound(String),

    #[error("archive already exists: {0}")]
    ArchiveExists(String),

    #[error("invalid log name: {0:?}")]
    InvalidName(String),

    #[error("log line for {0} spans multiple lines")]
    MultiLine(String),

    #[error("i/o error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt archive {name}: {reason}")]
    Corrupt { name: String, reason: String },
}

impl LogError {
    /// Map an I/O error on `name`, surfacing missing files as `NotFound`.
    pub(crate) fn io(name: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => LogError::NotFound(name.to_string()),
            std::io::ErrorKind::AlreadyExists => LogError::ArchiveExists(name.to_string()),
            _ => LogError::Io {
                name: name.to_string(),
                source,
            },
        }
    }
}
