//! Scripted in-memory implementation of the chat platform traits.
//!
//! Tests configure a [`MockClient`] with canned responses (pairing codes,
//! join results, send failures) and then drive the component under test
//! against it. Every interaction is recorded for assertions.
//!
//! # Example
//!
//! ```
//! use mock_chat::MockPlatform;
//!
//! let platform = MockPlatform::new();
//! let client = platform.client_for("sqlite:test_wa_a1.db");
//! client.set_paired(true);
//! client.set_join_ok("ABCDEFGHIJ", "120@g.us");
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use chat_core::{
    ChatClient, ChatPlatform, Event, GroupInfo, MediaKind, MediaUpload, OutgoingMessage,
    ProtoError, QrItem,
};

#[derive(Default)]
struct State {
    paired: bool,
    connected: bool,
    msisdn: Option<String>,
    connect_calls: usize,
    connect_errors: VecDeque<ProtoError>,
    qr_queue: VecDeque<QrItem>,
    qr_tx: Option<mpsc::Sender<QrItem>>,
    pair_code: Option<String>,
    pair_unsupported: bool,
    sent: Vec<(String, OutgoingMessage)>,
    send_errors: VecDeque<ProtoError>,
    uploads: Vec<MediaKind>,
    join_attempts: Vec<String>,
    join_results: HashMap<String, Result<String, String>>,
    invite_infos: HashMap<String, GroupInfo>,
    invite_info_errors: HashMap<String, String>,
    joined_groups: Vec<GroupInfo>,
    joined_groups_errors: VecDeque<String>,
    joined_groups_calls: usize,
    group_infos: HashMap<String, GroupInfo>,
}

/// A scripted chat client. All setters take `&self`; state lives behind a
/// mutex so the same handle can be shared with the code under test.
pub struct MockClient {
    state: Mutex<State>,
    events_tx: broadcast::Sender<Event>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(State::default()),
            events_tx,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // --- scripting -------------------------------------------------------

    pub fn set_paired(&self, paired: bool) {
        self.lock().paired = paired;
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn set_msisdn(&self, msisdn: &str) {
        self.lock().msisdn = Some(msisdn.to_string());
    }

    /// Queue an error for the next `connect()` call.
    pub fn push_connect_error(&self, err: ProtoError) {
        self.lock().connect_errors.push_back(err);
    }

    /// Queue a QR stream item. Items queued before `qr_channel()` is called
    /// are delivered as soon as the channel opens.
    pub fn push_qr(&self, event: &str, code: &str) {
        let item = QrItem {
            event: event.to_string(),
            code: code.to_string(),
        };
        let mut state = self.lock();
        if let Some(tx) = &state.qr_tx {
            if tx.try_send(item.clone()).is_ok() {
                return;
            }
        }
        state.qr_queue.push_back(item);
    }

    pub fn set_pair_code(&self, code: &str) {
        self.lock().pair_code = Some(code.to_string());
    }

    pub fn set_pair_unsupported(&self) {
        self.lock().pair_unsupported = true;
    }

    /// Queue an error for the next `send_message()` call.
    pub fn push_send_error(&self, err: ProtoError) {
        self.lock().send_errors.push_back(err);
    }

    pub fn set_join_ok(&self, code: &str, group_jid: &str) {
        self.lock()
            .join_results
            .insert(code.to_string(), Ok(group_jid.to_string()));
    }

    pub fn set_join_err(&self, code: &str, message: &str) {
        self.lock()
            .join_results
            .insert(code.to_string(), Err(message.to_string()));
    }

    pub fn set_invite_info(&self, code: &str, info: GroupInfo) {
        self.lock().invite_infos.insert(code.to_string(), info);
    }

    pub fn set_invite_info_err(&self, code: &str, message: &str) {
        self.lock()
            .invite_info_errors
            .insert(code.to_string(), message.to_string());
    }

    pub fn set_joined_groups(&self, groups: Vec<GroupInfo>) {
        self.lock().joined_groups = groups;
    }

    /// Queue an error for the next `joined_groups()` call.
    pub fn push_joined_groups_error(&self, message: &str) {
        self.lock()
            .joined_groups_errors
            .push_back(message.to_string());
    }

    pub fn set_group_info(&self, jid: &str, info: GroupInfo) {
        self.lock().group_infos.insert(jid.to_string(), info);
    }

    /// Emit an event to all subscribers, as the platform would.
    pub fn emit(&self, event: Event) {
        let _ = self.events_tx.send(event);
    }

    // --- recorded interactions ------------------------------------------

    pub fn sent(&self) -> Vec<(String, OutgoingMessage)> {
        self.lock().sent.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn join_attempts(&self) -> Vec<String> {
        self.lock().join_attempts.clone()
    }

    pub fn uploads(&self) -> Vec<MediaKind> {
        self.lock().uploads.clone()
    }

    pub fn joined_groups_calls(&self) -> usize {
        self.lock().joined_groups_calls
    }
}

#[async_trait]
impl ChatClient for MockClient {
    fn is_paired(&self) -> bool {
        self.lock().paired
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn msisdn(&self) -> Option<String> {
        self.lock().msisdn.clone()
    }

    async fn connect(&self) -> Result<(), ProtoError> {
        let mut state = self.lock();
        state.connect_calls += 1;
        if let Some(err) = state.connect_errors.pop_front() {
            return Err(err);
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        self.lock().connected = false;
    }

    async fn logout(&self) -> Result<(), ProtoError> {
        let mut state = self.lock();
        state.paired = false;
        state.connected = false;
        Ok(())
    }

    async fn qr_channel(&self) -> Result<mpsc::Receiver<QrItem>, ProtoError> {
        let (tx, rx) = mpsc::channel(16);
        let mut state = self.lock();
        while let Some(item) = state.qr_queue.pop_front() {
            let _ = tx.try_send(item);
        }
        state.qr_tx = Some(tx);
        Ok(rx)
    }

    async fn pair_phone(
        &self,
        _msisdn: &str,
        _show_push: bool,
        _client_kind: &str,
        _os_label: &str,
    ) -> Result<String, ProtoError> {
        let state = self.lock();
        if state.pair_unsupported {
            return Err(ProtoError::PairingUnsupported);
        }
        state
            .pair_code
            .clone()
            .ok_or_else(|| ProtoError::Protocol("no pairing code scripted".to_string()))
    }

    async fn send_message(&self, jid: &str, message: OutgoingMessage) -> Result<(), ProtoError> {
        let mut state = self.lock();
        if let Some(err) = state.send_errors.pop_front() {
            return Err(err);
        }
        state.sent.push((jid.to_string(), message));
        Ok(())
    }

    async fn upload(&self, data: Vec<u8>, kind: MediaKind) -> Result<MediaUpload, ProtoError> {
        let mut state = self.lock();
        state.uploads.push(kind);
        let n = state.uploads.len();
        Ok(MediaUpload {
            url: format!("mock://blob/{n}"),
            direct_path: format!("/blob/{n}"),
            media_key: vec![0; 32],
            file_enc_sha256: vec![1; 32],
            file_sha256: data.iter().take(32).copied().collect(),
        })
    }

    async fn join_group_by_invite(&self, code: &str) -> Result<String, ProtoError> {
        let mut state = self.lock();
        state.join_attempts.push(code.to_string());
        match state.join_results.get(code) {
            Some(Ok(jid)) => Ok(jid.clone()),
            Some(Err(msg)) => Err(ProtoError::Protocol(msg.clone())),
            None => Err(ProtoError::Protocol(format!("unknown invite code: {code}"))),
        }
    }

    async fn group_info_by_invite(&self, code: &str) -> Result<GroupInfo, ProtoError> {
        let state = self.lock();
        if let Some(msg) = state.invite_info_errors.get(code) {
            return Err(ProtoError::Protocol(msg.clone()));
        }
        state
            .invite_infos
            .get(code)
            .cloned()
            .ok_or_else(|| ProtoError::Protocol(format!("no invite info for: {code}")))
    }

    async fn joined_groups(&self) -> Result<Vec<GroupInfo>, ProtoError> {
        let mut state = self.lock();
        state.joined_groups_calls += 1;
        if let Some(msg) = state.joined_groups_errors.pop_front() {
            return Err(ProtoError::Protocol(msg));
        }
        Ok(state.joined_groups.clone())
    }

    async fn group_info(&self, jid: &str) -> Result<GroupInfo, ProtoError> {
        self.lock()
            .group_infos
            .get(jid)
            .cloned()
            .ok_or_else(|| ProtoError::Protocol(format!("no group info for: {jid}")))
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }
}

/// A platform that hands out one [`MockClient`] per credential store DSN.
#[derive(Default)]
pub struct MockPlatform {
    clients: Mutex<HashMap<String, Arc<MockClient>>>,
    opened: Mutex<Vec<String>>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get (creating if needed) the client for a store DSN, so tests can
    /// script it before the code under test opens the session.
    pub fn client_for(&self, store_dsn: &str) -> Arc<MockClient> {
        self.clients
            .lock()
            .unwrap()
            .entry(store_dsn.to_string())
            .or_insert_with(MockClient::new)
            .clone()
    }

    /// The store DSNs passed to `open`, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn open(&self, store_dsn: &str) -> Result<Arc<dyn ChatClient>, ProtoError> {
        self.opened.lock().unwrap().push(store_dsn.to_string());
        Ok(self.client_for(store_dsn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_join() {
        let client = MockClient::new();
        client.set_join_ok("ABCDEFGHIJ", "120@g.us");

        let jid = client.join_group_by_invite("ABCDEFGHIJ").await.unwrap();
        assert_eq!(jid, "120@g.us");
        assert!(client.join_group_by_invite("UNKNOWNCODE1").await.is_err());
        assert_eq!(client.join_attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_send_error_queue() {
        let client = MockClient::new();
        client.push_send_error(ProtoError::SendFailed("timeout".into()));

        let msg = OutgoingMessage::Conversation {
            text: "hi".into(),
        };
        assert!(client.send_message("1@g.us", msg.clone()).await.is_err());
        client.send_message("1@g.us", msg).await.unwrap();
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_platform_isolates_by_dsn() {
        let platform = MockPlatform::new();
        let a = platform.client_for("sqlite:wa_a.db");
        a.set_paired(true);

        let opened_a = platform.open("sqlite:wa_a.db").await.unwrap();
        let opened_b = platform.open("sqlite:wa_b.db").await.unwrap();
        assert!(opened_a.is_paired());
        assert!(!opened_b.is_paired());
        assert_eq!(platform.opened().len(), 2);
    }
}
