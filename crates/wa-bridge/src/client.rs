//! JSON-RPC client for the chat bridge daemon.
//!
//! The bridge holds the actual platform sockets and credential containers;
//! this client addresses one container per [`BridgeClient`] by passing its
//! store DSN with every call. Lifecycle and message events arrive over a
//! per-store SSE feed (see [`crate::sse`]).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use chat_core::{
    ChatClient, ChatPlatform, Event, GroupInfo, MediaKind, MediaUpload, OutgoingMessage,
    ProtoError, QrItem,
};

use crate::config::BridgeConfig;
use crate::sse;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Serialize)]
struct RpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<T>,
    id: u64,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: String,
    result: Option<T>,
    error: Option<RpcError>,
    #[allow(dead_code)]
    id: u64,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

const RPC_METHOD_NOT_FOUND: i32 = -32601;

impl RpcError {
    fn into_proto(self) -> ProtoError {
        let lower = self.message.to_lowercase();
        if self.code == RPC_METHOD_NOT_FOUND {
            return ProtoError::PairingUnsupported;
        }
        if lower.contains("already") && lower.contains("connected") {
            return ProtoError::AlreadyConnected;
        }
        if lower.contains("not paired") {
            return ProtoError::NotPaired;
        }
        ProtoError::Protocol(self.message)
    }
}

/// Session state reported by the bridge when a store is opened.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionState {
    #[serde(default)]
    paired: bool,
    #[serde(default)]
    connected: bool,
    #[serde(default)]
    msisdn: Option<String>,
}

/// Upload result on the wire: hash and key material is base64.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadWire {
    #[serde(default)]
    url: String,
    #[serde(default)]
    direct_path: String,
    #[serde(default)]
    media_key: String,
    #[serde(default)]
    file_enc_sha256: String,
    #[serde(default)]
    file_sha256: String,
}

impl UploadWire {
    fn into_upload(self) -> Result<MediaUpload, ProtoError> {
        let decode = |label: &str, value: &str| {
            if value.is_empty() {
                return Ok(Vec::new());
            }
            BASE64
                .decode(value)
                .map_err(|err| ProtoError::Protocol(format!("bad {label} in upload result: {err}")))
        };
        Ok(MediaUpload {
            media_key: decode("mediaKey", &self.media_key)?,
            file_enc_sha256: decode("fileEncSha256", &self.file_enc_sha256)?,
            file_sha256: decode("fileSha256", &self.file_sha256)?,
            url: self.url,
            direct_path: self.direct_path,
        })
    }
}

/// One device session, addressed by its credential store DSN.
pub struct BridgeClient {
    http: Client,
    config: BridgeConfig,
    store_dsn: String,
    request_id: AtomicU64,
    paired: AtomicBool,
    connected: AtomicBool,
    msisdn: Mutex<Option<String>>,
    events_tx: broadcast::Sender<Event>,
    qr_senders: Mutex<Vec<mpsc::Sender<QrItem>>>,
}

impl BridgeClient {
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Make a JSON-RPC call to the bridge.
    async fn rpc_call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<R, ProtoError> {
        let id = self.next_id();
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        debug!(method, id, store = %self.store_dsn, "bridge rpc call");

        let response = self
            .http
            .post(self.config.rpc_url())
            .json(&request)
            .send()
            .await
            .map_err(|err| ProtoError::Connection(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProtoError::Connection(format!("HTTP {status}: {body}")));
        }

        let rpc_response: RpcResponse<R> = response
            .json()
            .await
            .map_err(|err| ProtoError::Protocol(format!("bad rpc response: {err}")))?;

        if let Some(error) = rpc_response.error {
            return Err(error.into_proto());
        }
        rpc_response
            .result
            .ok_or_else(|| ProtoError::Protocol("no result in rpc response".to_string()))
    }

    // --- SSE feed hooks --------------------------------------------------

    pub(crate) fn events_sender(&self) -> broadcast::Sender<Event> {
        self.events_tx.clone()
    }

    pub(crate) fn on_connected(&self, msisdn: Option<String>) {
        self.connected.store(true, Ordering::SeqCst);
        if msisdn.is_some() {
            *self.msisdn.lock().unwrap() = msisdn;
        }
        let _ = self.events_tx.send(Event::Connected);
    }

    pub(crate) fn on_logged_out(&self) {
        self.paired.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events_tx.send(Event::LoggedOut);
    }

    pub(crate) fn on_stream_replaced(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events_tx.send(Event::StreamReplaced);
    }

    pub(crate) fn on_paired(&self) {
        self.paired.store(true, Ordering::SeqCst);
    }

    pub(crate) fn dispatch_qr(&self, item: QrItem) {
        let mut senders = self.qr_senders.lock().unwrap();
        senders.retain(|tx| tx.try_send(item.clone()).is_ok());
    }
}

#[async_trait]
impl ChatClient for BridgeClient {
    fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn msisdn(&self) -> Option<String> {
        self.msisdn.lock().unwrap().clone()
    }

    async fn connect(&self) -> Result<(), ProtoError> {
        let result: serde_json::Value = self
            .rpc_call(
                "connect",
                Some(serde_json::json!({ "store": self.store_dsn })),
            )
            .await?;
        let _ = result;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        let result: Result<serde_json::Value, _> = self
            .rpc_call(
                "disconnect",
                Some(serde_json::json!({ "store": self.store_dsn })),
            )
            .await;
        if let Err(err) = result {
            warn!(store = %self.store_dsn, error = %err, "disconnect rpc failed");
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn logout(&self) -> Result<(), ProtoError> {
        let _: serde_json::Value = self
            .rpc_call(
                "logout",
                Some(serde_json::json!({ "store": self.store_dsn })),
            )
            .await?;
        self.paired.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn qr_channel(&self) -> Result<mpsc::Receiver<QrItem>, ProtoError> {
        // QR items come in over the long-lived SSE feed, so the stream's
        // lifetime is the bridge's, not any HTTP caller's.
        let (tx, rx) = mpsc::channel(16);
        self.qr_senders.lock().unwrap().push(tx);
        Ok(rx)
    }

    async fn pair_phone(
        &self,
        msisdn: &str,
        show_push: bool,
        client_kind: &str,
        os_label: &str,
    ) -> Result<String, ProtoError> {
        #[derive(Deserialize)]
        struct PairResult {
            code: String,
        }
        let result: PairResult = self
            .rpc_call(
                "pairPhone",
                Some(serde_json::json!({
                    "store": self.store_dsn,
                    "msisdn": msisdn,
                    "showPushNotification": show_push,
                    "clientKind": client_kind,
                    "osLabel": os_label,
                })),
            )
            .await?;
        Ok(result.code)
    }

    async fn send_message(&self, jid: &str, message: OutgoingMessage) -> Result<(), ProtoError> {
        let _: serde_json::Value = self
            .rpc_call(
                "send",
                Some(serde_json::json!({
                    "store": self.store_dsn,
                    "jid": jid,
                    "message": message,
                })),
            )
            .await
            .map_err(|err| match err {
                ProtoError::Protocol(message) => ProtoError::SendFailed(message),
                other => other,
            })?;
        Ok(())
    }

    async fn upload(&self, data: Vec<u8>, kind: MediaKind) -> Result<MediaUpload, ProtoError> {
        let wire: UploadWire = self
            .rpc_call(
                "upload",
                Some(serde_json::json!({
                    "store": self.store_dsn,
                    "data": BASE64.encode(&data),
                    "kind": kind.as_str(),
                })),
            )
            .await?;
        wire.into_upload()
    }

    async fn join_group_by_invite(&self, code: &str) -> Result<String, ProtoError> {
        #[derive(Deserialize)]
        struct JoinResult {
            jid: String,
        }
        let result: JoinResult = self
            .rpc_call(
                "joinGroupByInvite",
                Some(serde_json::json!({ "store": self.store_dsn, "code": code })),
            )
            .await?;
        Ok(result.jid)
    }

    async fn group_info_by_invite(&self, code: &str) -> Result<GroupInfo, ProtoError> {
        self.rpc_call(
            "groupInfoByInvite",
            Some(serde_json::json!({ "store": self.store_dsn, "code": code })),
        )
        .await
    }

    async fn joined_groups(&self) -> Result<Vec<GroupInfo>, ProtoError> {
        self.rpc_call(
            "joinedGroups",
            Some(serde_json::json!({ "store": self.store_dsn })),
        )
        .await
    }

    async fn group_info(&self, jid: &str) -> Result<GroupInfo, ProtoError> {
        self.rpc_call(
            "groupInfo",
            Some(serde_json::json!({ "store": self.store_dsn, "jid": jid })),
        )
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }
}

/// Factory opening one [`BridgeClient`] per credential store DSN.
pub struct BridgePlatform {
    http: Client,
    config: BridgeConfig,
}

impl BridgePlatform {
    pub fn new(config: BridgeConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    /// Verify the bridge is reachable.
    pub async fn health_check(&self) -> Result<bool, ProtoError> {
        let response = self
            .http
            .get(self.config.check_url())
            .send()
            .await
            .map_err(|err| ProtoError::Connection(err.to_string()))?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl ChatPlatform for BridgePlatform {
    async fn open(&self, store_dsn: &str) -> Result<Arc<dyn ChatClient>, ProtoError> {
        let (events_tx, _) = broadcast::channel(256);
        let client = Arc::new(BridgeClient {
            http: self.http.clone(),
            config: self.config.clone(),
            store_dsn: store_dsn.to_string(),
            request_id: AtomicU64::new(1),
            paired: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            msisdn: Mutex::new(None),
            events_tx,
            qr_senders: Mutex::new(Vec::new()),
        });

        // The bridge opens (or creates) the credential container and reports
        // whether it already holds a paired device.
        let state: SessionState = client
            .rpc_call(
                "openSession",
                Some(serde_json::json!({ "store": store_dsn })),
            )
            .await?;
        client.paired.store(state.paired, Ordering::SeqCst);
        client.connected.store(state.connected, Ordering::SeqCst);
        *client.msisdn.lock().unwrap() = state.msisdn;

        // Detached on purpose; the task exits once the client is dropped.
        let _ = sse::spawn(Arc::downgrade(&client), self.config.clone(), store_dsn.to_string());
        info!(store = %store_dsn, paired = state.paired, "bridge session opened");
        Ok(client)
    }
}
