//! Chat bridge daemon client.
//!
//! The bridge daemon owns the platform sockets and per-account credential
//! containers; this crate talks to it over HTTP JSON-RPC and receives
//! lifecycle, message and pairing-QR events over a per-store SSE feed. It
//! is the production implementation of the `chat-core` traits; everything
//! above it is transport-agnostic.
//!
//! # Example
//!
//! ```no_run
//! use chat_core::{ChatClient, ChatPlatform};
//! use wa_bridge::{BridgeConfig, BridgePlatform};
//!
//! # async fn example() -> Result<(), chat_core::ProtoError> {
//! let platform = BridgePlatform::new(BridgeConfig::new("http://127.0.0.1:8077"));
//! let client = platform.open("sqlite:promote_wa_a1.db?mode=rwc").await?;
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod sse;

pub use client::{BridgeClient, BridgePlatform};
pub use config::BridgeConfig;
