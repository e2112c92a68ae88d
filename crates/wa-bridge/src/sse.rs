//! Server-Sent Events feed from the bridge daemon.
//!
//! One background task per opened store consumes the bridge's event feed
//! and forwards items into the client's broadcast channel (lifecycle,
//! messages) and QR subscribers. The task reconnects with backoff and ends
//! when the client is dropped.

use std::sync::Weak;
use std::time::Duration;

use futures::StreamExt;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chat_core::{Event, MessageEvent, QrItem};

use crate::client::BridgeClient;
use crate::config::BridgeConfig;

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct QrWire {
    #[serde(default)]
    event: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct ConnectedWire {
    #[serde(default)]
    msisdn: Option<String>,
}

/// Spawn the feed task for one store.
pub(crate) fn spawn(
    client: Weak<BridgeClient>,
    config: BridgeConfig,
    store_dsn: String,
) -> JoinHandle<()> {
    tokio::spawn(run(client, config, store_dsn))
}

async fn run(client: Weak<BridgeClient>, config: BridgeConfig, store_dsn: String) {
    let url = config.events_url(&store_dsn);
    let mut retry_delay = INITIAL_RETRY_DELAY;

    loop {
        if client.strong_count() == 0 {
            return;
        }

        // SSE connections are long-lived; the dedicated client has no
        // request timeout.
        let Ok(http) = reqwest::Client::builder().build() else {
            warn!(store = %store_dsn, "failed to build SSE client");
            return;
        };
        let mut source = match EventSource::new(http.get(&url)) {
            Ok(source) => source,
            Err(err) => {
                warn!(store = %store_dsn, error = %err, "failed to open event feed");
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                continue;
            }
        };

        while let Some(item) = source.next().await {
            let Some(client) = client.upgrade() else {
                return;
            };
            match item {
                Ok(SseEvent::Open) => {
                    debug!(store = %store_dsn, "event feed open");
                    retry_delay = INITIAL_RETRY_DELAY;
                }
                Ok(SseEvent::Message(message)) => {
                    handle_message(&client, &message.event, &message.data);
                }
                Err(err) => {
                    warn!(store = %store_dsn, error = %err, "event feed error");
                    break;
                }
            }
        }

        info!(store = %store_dsn, retry = ?retry_delay, "event feed closed, reconnecting");
        tokio::time::sleep(retry_delay).await;
        retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
    }
}

fn handle_message(client: &BridgeClient, event: &str, data: &str) {
    match event {
        "connected" => {
            let msisdn = serde_json::from_str::<ConnectedWire>(data)
                .ok()
                .and_then(|wire| wire.msisdn);
            client.on_connected(msisdn);
        }
        "loggedOut" => client.on_logged_out(),
        "streamReplaced" => client.on_stream_replaced(),
        "paired" => client.on_paired(),
        "qr" => match serde_json::from_str::<QrWire>(data) {
            Ok(wire) => client.dispatch_qr(QrItem {
                event: wire.event,
                code: wire.code,
            }),
            Err(err) => warn!(error = %err, "bad qr event payload"),
        },
        "message" => match serde_json::from_str::<MessageEvent>(data) {
            Ok(message) => {
                let _ = client.events_sender().send(Event::Message(message));
            }
            Err(err) => {
                warn!(error = %err, "bad message event payload");
                debug!(raw = %data, "undecodable message event");
            }
        },
        other => debug!(event = %other, "ignoring event feed item"),
    }
}
