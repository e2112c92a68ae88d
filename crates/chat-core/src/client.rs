//! Client and platform traits implemented by bindings.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::error::ProtoError;
use crate::types::{Event, GroupInfo, MediaKind, MediaUpload, OutgoingMessage};

/// One item from the pairing QR stream. `event == "code"` carries a pairing
/// code in `code`; other event kinds ("timeout", "success", ...) pass through
/// for logging.
#[derive(Debug, Clone)]
pub struct QrItem {
    pub event: String,
    pub code: String,
}

/// A single device session on the chat platform.
///
/// Implementations wrap whatever transport the platform needs. All methods
/// take `&self`; callers bound slow operations with `tokio::time::timeout`.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Whether the credential container holds a paired device.
    fn is_paired(&self) -> bool;

    /// Whether the socket is currently open.
    fn is_connected(&self) -> bool;

    /// Phone number of the paired device, when known.
    fn msisdn(&self) -> Option<String>;

    /// Open the socket. Returns [`ProtoError::AlreadyConnected`] if it is
    /// already open; most callers treat that as success.
    async fn connect(&self) -> Result<(), ProtoError>;

    /// Close the socket. Idempotent.
    async fn disconnect(&self);

    /// Server-side logout, invalidating the stored device.
    async fn logout(&self) -> Result<(), ProtoError>;

    /// Acquire the pairing QR stream. The returned channel is owned by the
    /// binding and stays alive until pairing completes or fails; dropping the
    /// receiver does not tear down the pairing socket.
    async fn qr_channel(&self) -> Result<mpsc::Receiver<QrItem>, ProtoError>;

    /// Request a pairing code for linking by phone number.
    ///
    /// Returns [`ProtoError::PairingUnsupported`] when the binding cannot do
    /// number-based pairing.
    async fn pair_phone(
        &self,
        msisdn: &str,
        show_push: bool,
        client_kind: &str,
        os_label: &str,
    ) -> Result<String, ProtoError>;

    /// Deliver one message to a chat JID.
    async fn send_message(&self, jid: &str, message: OutgoingMessage) -> Result<(), ProtoError>;

    /// Upload media bytes to the platform blob store.
    async fn upload(&self, data: Vec<u8>, kind: MediaKind) -> Result<MediaUpload, ProtoError>;

    /// Join a group via invite code; returns the group JID.
    async fn join_group_by_invite(&self, code: &str) -> Result<String, ProtoError>;

    /// Fetch group metadata for an invite code without joining.
    async fn group_info_by_invite(&self, code: &str) -> Result<GroupInfo, ProtoError>;

    /// List all groups the device is currently a member of.
    async fn joined_groups(&self) -> Result<Vec<GroupInfo>, ProtoError>;

    /// Fetch metadata for a group the device is a member of.
    async fn group_info(&self, jid: &str) -> Result<GroupInfo, ProtoError>;

    /// Subscribe to the client's event stream. Events arrive in the
    /// platform's native order for this session.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}

/// Factory for clients bound to isolated credential containers.
///
/// `store_dsn` names the per-account credential container; opening the same
/// DSN twice yields sessions backed by the same stored device, while distinct
/// DSNs can never share credentials. The binding reuses a stored device if
/// the container has one and provisions a fresh device otherwise.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn open(&self, store_dsn: &str) -> Result<Arc<dyn ChatClient>, ProtoError>;
}
