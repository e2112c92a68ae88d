//! Core traits and types for chat platform bindings.
//!
//! This crate defines the interface every component in the workspace uses to
//! talk to the chat platform:
//!
//! - [`ChatClient`] - one paired (or pairable) device session
//! - [`ChatPlatform`] - factory that opens a client inside an isolated
//!   per-account credential container
//! - [`Event`] / [`MessageEvent`] - inbound event stream items
//! - [`OutgoingMessage`] - typed message payloads for delivery
//! - [`ProtoError`] - error taxonomy shared by all bindings
//!
//! The concrete binding lives in `wa-bridge`; tests use `mock-chat`.
//!
//! # Example
//!
//! ```no_run
//! use chat_core::{ChatClient, ChatPlatform, OutgoingMessage};
//! use std::sync::Arc;
//!
//! # async fn example(platform: Arc<dyn ChatPlatform>) -> Result<(), chat_core::ProtoError> {
//! let client = platform.open("sqlite:promote_wa_a1.db").await?;
//! client.connect().await?;
//! client
//!     .send_message(
//!         "120@g.us",
//!         OutgoingMessage::Conversation {
//!             text: "hello".into(),
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod types;

pub use client::{ChatClient, ChatPlatform, QrItem};
pub use error::ProtoError;
pub use types::{
    Event, GroupInfo, IncomingPayload, MediaKind, MediaRef, MediaUpload, MessageEvent,
    OutgoingMessage, Participant,
};

// Re-export async_trait so implementors don't need a direct dependency.
pub use async_trait::async_trait;
