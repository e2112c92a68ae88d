//! Sender error types.

use thiserror::Error;

/// Errors that can occur while delivering content to a group.
#[derive(Debug, Error)]
pub enum SendError {
    /// Session acquisition or connection failed.
    #[error(transparent)]
    Session(#[from] session::SessionError),

    /// Error from the chat platform binding.
    #[error(transparent)]
    Proto(#[from] chat_core::ProtoError),

    /// Error from the persistence layer.
    #[error(transparent)]
    Database(#[from] database::DatabaseError),

    /// Media URL returned a non-2xx response. Typed so the retry policy can
    /// classify by status code instead of string matching.
    #[error("fetch {url}: status {code}")]
    HttpStatus { code: u16, url: String },

    /// Media fetch transport failure.
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Local upload file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Local upload URL tried to escape the uploads directory.
    #[error("invalid local upload path: {0}")]
    InvalidUploadPath(String),

    /// No enabled template to pick from.
    #[error("no enabled template")]
    NoTemplate,
}
