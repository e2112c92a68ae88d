//! Error types shared by all chat platform bindings.

use thiserror::Error;

/// Errors that can occur when interacting with the chat platform.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The session has no stored device credentials.
    #[error("not paired")]
    NotPaired,

    /// The session already has stored device credentials.
    #[error("already paired")]
    AlreadyPaired,

    /// The socket is already open. Callers generally treat this as success.
    #[error("already connected")]
    AlreadyConnected,

    /// The binding does not support pairing by phone number.
    #[error("pairing via phone number unsupported by this binding")]
    PairingUnsupported,

    /// The QR stream ended before a code was produced.
    #[error("qr channel closed")]
    QrChannelClosed,

    /// Credential container could not be opened.
    #[error("credential store error: {0}")]
    Store(String),

    /// Transport-level failure talking to the platform.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The platform rejected the operation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Message delivery failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

impl ProtoError {
    /// Whether this error just means the socket was already open.
    pub fn is_already_connected(&self) -> bool {
        matches!(self, ProtoError::AlreadyConnected)
    }
}
