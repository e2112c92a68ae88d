//! Session manager error types.

use thiserror::Error;

/// Errors that can occur while managing device sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Error from the chat platform binding.
    #[error(transparent)]
    Proto(#[from] chat_core::ProtoError),

    /// Error from the persistence layer.
    #[error(transparent)]
    Database(#[from] database::DatabaseError),

    /// Pairing by number requires a phone number.
    #[error("msisdn required")]
    MsisdnRequired,

    /// QR code image encoding failed.
    #[error("qr encode failed: {0}")]
    Qr(String),
}

impl SessionError {
    /// Whether this error means the binding cannot pair by phone number.
    pub fn is_pairing_unsupported(&self) -> bool {
        matches!(self, SessionError::Proto(chat_core::ProtoError::PairingUnsupported))
    }
}
