//! Event and message types exchanged with the platform.

use serde::{Deserialize, Serialize};

/// Media categories the platform distinguishes on upload and send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Sticker,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Sticker => "sticker",
            MediaKind::Document => "document",
        }
    }
}

/// Result of uploading media bytes to the platform's blob store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaUpload {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_sha256: Vec<u8>,
}

/// An uploaded blob plus the metadata needed to reference it in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    pub upload: MediaUpload,
    pub mimetype: String,
    pub file_length: u64,
}

/// Typed outbound message payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Conversation {
        text: String,
    },
    Image {
        media: MediaRef,
        caption: Option<String>,
    },
    Video {
        media: MediaRef,
        caption: Option<String>,
    },
    Audio {
        media: MediaRef,
    },
    Sticker {
        media: MediaRef,
    },
    Document {
        media: MediaRef,
        file_name: String,
        caption: Option<String>,
    },
}

/// Typed inbound message payloads. Only the variants that can carry text are
/// modeled in detail; everything else collapses to [`IncomingPayload::Other`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingPayload {
    Conversation { text: String },
    ExtendedText { text: String },
    Image { caption: Option<String> },
    Video { caption: Option<String> },
    Document { caption: Option<String> },
    Audio,
    Sticker,
    Other,
}

impl IncomingPayload {
    /// The textual content of the message, if any variant carries it.
    pub fn text(&self) -> Option<&str> {
        match self {
            IncomingPayload::Conversation { text } | IncomingPayload::ExtendedText { text } => {
                Some(text.as_str())
            }
            IncomingPayload::Image { caption }
            | IncomingPayload::Video { caption }
            | IncomingPayload::Document { caption } => caption.as_deref(),
            _ => None,
        }
    }
}

/// An inbound message as delivered by the platform's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// JID of the user who sent the message.
    pub sender: String,
    /// JID of the chat the message arrived in.
    pub chat: String,
    /// Platform timestamp, milliseconds since epoch.
    pub timestamp: u64,
    pub payload: IncomingPayload,
}

/// Lifecycle and message events emitted by a client.
#[derive(Debug, Clone)]
pub enum Event {
    Connected,
    LoggedOut,
    StreamReplaced,
    Message(MessageEvent),
}

/// A group member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub jid: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

/// Group metadata as reported by the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group JID, e.g. `120363041234567890@g.us`.
    pub jid: String,
    pub name: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text_extraction() {
        let p = IncomingPayload::Conversation {
            text: "hello".into(),
        };
        assert_eq!(p.text(), Some("hello"));

        let p = IncomingPayload::Image {
            caption: Some("cap".into()),
        };
        assert_eq!(p.text(), Some("cap"));

        let p = IncomingPayload::Image { caption: None };
        assert_eq!(p.text(), None);

        assert_eq!(IncomingPayload::Sticker.text(), None);
        assert_eq!(IncomingPayload::Other.text(), None);
    }

    #[test]
    fn media_kind_labels() {
        assert_eq!(MediaKind::Image.as_str(), "image");
        assert_eq!(MediaKind::Document.as_str(), "document");
    }
}
