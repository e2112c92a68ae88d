//! Per-account device session management.
//!
//! The [`SessionManager`] owns one session handle per account. Each handle
//! wraps a chat client bound to an isolated per-account credential container
//! (see [`store_dsn`]) plus a background task that translates the client's
//! event stream into account status transitions and fans inbound messages
//! out to registered [`MessageHandler`]s.
//!
//! # Example
//!
//! ```no_run
//! use session::SessionManager;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     db: database::Database,
//! #     platform: Arc<dyn chat_core::ChatPlatform>,
//! # ) -> Result<(), session::SessionError> {
//! let manager = SessionManager::new(db, platform, "sqlite:promote.db?mode=rwc".into());
//! let png = manager.start_pairing("account-1").await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod qr;
pub mod store_dsn;

pub use error::SessionError;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chat_core::{ChatClient, ChatPlatform, Event, MessageEvent, ProtoError};
use database::models::CachedParticipant;
use database::{account, group, participant, AccountStatus, Database};

/// Participant cache TTL in minutes.
const PARTICIPANT_CACHE_MINUTES: i64 = 1440;

/// Sink for inbound messages. Handlers receive every message event along
/// with the id of the account whose session observed it; within one account
/// the order is the platform's native order.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, account_id: &str, message: &MessageEvent);
}

struct SessionHandle {
    client: Arc<dyn ChatClient>,
    drive: JoinHandle<()>,
}

/// Owns the account → session handle map and all session lifecycle logic.
pub struct SessionManager {
    db: Database,
    platform: Arc<dyn ChatPlatform>,
    base_dsn: String,
    handles: AsyncMutex<HashMap<String, SessionHandle>>,
    // Accounts with a pairing connect already in flight; never cleared while
    // the process lives, mirroring the one-connect-per-pairing guard.
    pairing_active: Mutex<HashSet<String>>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
}

impl SessionManager {
    pub fn new(db: Database, platform: Arc<dyn ChatPlatform>, base_dsn: String) -> Arc<Self> {
        Arc::new(Self {
            db,
            platform,
            base_dsn,
            handles: AsyncMutex::new(HashMap::new()),
            pairing_active: Mutex::new(HashSet::new()),
            handlers: RwLock::new(Vec::new()),
        })
    }

    /// Register a sink for inbound messages from every account's session.
    pub fn add_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().unwrap().push(handler);
    }

    /// Get (or create) the session handle for an account without connecting.
    ///
    /// On first acquisition the platform reuses any device stored in the
    /// account's credential container and provisions a fresh one otherwise.
    pub async fn client(
        self: &Arc<Self>,
        account_id: &str,
    ) -> Result<Arc<dyn ChatClient>, SessionError> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(account_id) {
            return Ok(handle.client.clone());
        }

        let dsn = store_dsn::per_account_dsn(&self.base_dsn, account_id);
        let client = self.platform.open(&dsn).await?;
        debug!(account = %account_id, store = %dsn, "opened session handle");

        let drive = self.spawn_drive(account_id.to_string(), client.clone());
        handles.insert(account_id.to_string(), SessionHandle {
            client: client.clone(),
            drive,
        });
        Ok(client)
    }

    fn spawn_drive(self: &Arc<Self>, account_id: String, client: Arc<dyn ChatClient>) -> JoinHandle<()> {
        let weak: Weak<SessionManager> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut events = client.subscribe();
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.dispatch_event(&account_id, client.as_ref(), event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(account = %account_id, skipped = n, "event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn dispatch_event(&self, account_id: &str, client: &dyn ChatClient, event: Event) {
        match event {
            Event::Connected => {
                // Opportunistically persist the device's number when known.
                let msisdn = client.msisdn();
                if let Err(err) = account::update_account_status(
                    self.db.pool(),
                    account_id,
                    AccountStatus::Online,
                    "",
                    msisdn.as_deref(),
                )
                .await
                {
                    warn!(account = %account_id, error = %err, "status update failed");
                }
            }
            Event::LoggedOut => {
                if let Err(err) = account::update_account_status(
                    self.db.pool(),
                    account_id,
                    AccountStatus::LoggedOut,
                    "",
                    None,
                )
                .await
                {
                    warn!(account = %account_id, error = %err, "status update failed");
                }
            }
            Event::StreamReplaced => {
                if let Err(err) = account::update_account_status(
                    self.db.pool(),
                    account_id,
                    AccountStatus::Replaced,
                    "",
                    None,
                )
                .await
                {
                    warn!(account = %account_id, error = %err, "status update failed");
                }
            }
            Event::Message(message) => {
                let handlers: Vec<_> = self.handlers.read().unwrap().clone();
                for handler in handlers {
                    handler.handle_message(account_id, &message).await;
                }
            }
        }
    }

    /// Start (at most once per account) the background connect that opens
    /// the pairing socket.
    fn spawn_guarded_connect(&self, account_id: &str, client: &Arc<dyn ChatClient>, tag: &'static str) {
        let fresh = self
            .pairing_active
            .lock()
            .unwrap()
            .insert(account_id.to_string());
        if !fresh {
            return;
        }

        info!(account = %account_id, "{tag}: starting background connect");
        let client = client.clone();
        let account = account_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = client.connect().await {
                if !err.is_already_connected() {
                    error!(account = %account, error = %err, "pairing connect failed");
                }
            }
        });
    }

    /// Begin QR pairing and block until the stream yields a code, returned
    /// as a 256×256 PNG.
    ///
    /// The QR stream is owned by the binding and deliberately not tied to
    /// the caller's lifetime; an HTTP handler timing out must not tear down
    /// the pairing socket. Callers bound the wait with `tokio::time::timeout`.
    pub async fn start_pairing(self: &Arc<Self>, account_id: &str) -> Result<Vec<u8>, SessionError> {
        let client = self.client(account_id).await?;
        if client.is_paired() {
            return Err(ProtoError::AlreadyPaired.into());
        }

        self.spawn_guarded_connect(account_id, &client, "pair:qr");

        let mut stream = client.qr_channel().await?;
        info!(account = %account_id, "pair:qr: waiting for code");
        loop {
            match stream.recv().await {
                None => {
                    error!(account = %account_id, "pair:qr: channel closed");
                    return Err(ProtoError::QrChannelClosed.into());
                }
                Some(item) if item.event == "code" && !item.code.is_empty() => {
                    info!(account = %account_id, len = item.code.len(), "pair:qr: got code");
                    return qr::encode_png(&item.code);
                }
                Some(item) => {
                    debug!(account = %account_id, event = %item.event, "pair:qr: event");
                }
            }
        }
    }

    /// Request a short pairing code for linking by phone number.
    ///
    /// Waits for the first QR stream event or a 1 s grace delay (whichever
    /// comes first) so the socket has settled before the code is requested.
    pub async fn request_pairing_code(
        self: &Arc<Self>,
        account_id: &str,
        msisdn: &str,
    ) -> Result<String, SessionError> {
        let client = self.client(account_id).await?;
        if client.is_paired() {
            return Err(ProtoError::AlreadyPaired.into());
        }
        if msisdn.is_empty() {
            return Err(SessionError::MsisdnRequired);
        }

        self.spawn_guarded_connect(account_id, &client, "pair:number");

        let mut stream = client.qr_channel().await?;
        tokio::select! {
            _ = stream.recv() => debug!(account = %account_id, "pair:number: initial stream event"),
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                debug!(account = %account_id, "pair:number: proceeding after settle delay")
            }
        }

        let code = client
            .pair_phone(msisdn, false, "chrome", "Chrome (Linux)")
            .await?;

        account::update_account_status(
            self.db.pool(),
            account_id,
            AccountStatus::Pairing,
            "",
            Some(msisdn),
        )
        .await?;

        info!(account = %account_id, len = code.len(), "pair:number: got code");
        Ok(code)
    }

    /// Connect an already-paired account, returning its client. Fails when
    /// the account is not paired; an already-open socket counts as success.
    pub async fn ensure_connected(
        self: &Arc<Self>,
        account_id: &str,
    ) -> Result<Arc<dyn ChatClient>, SessionError> {
        let client = self.client(account_id).await?;
        if !client.is_paired() {
            return Err(ProtoError::NotPaired.into());
        }
        match client.connect().await {
            Ok(()) => Ok(client),
            Err(err) if err.is_already_connected() => Ok(client),
            Err(err) => Err(err.into()),
        }
    }

    /// Connect an already-paired account.
    pub async fn connect_if_paired(self: &Arc<Self>, account_id: &str) -> Result<(), SessionError> {
        self.ensure_connected(account_id).await.map(|_| ())
    }

    /// Disconnect and log the device out server-side. Logout errors are
    /// logged but not fatal; the account always ends up `logged_out`.
    pub async fn logout(self: &Arc<Self>, account_id: &str) -> Result<(), SessionError> {
        let client = self.client(account_id).await?;
        client.disconnect().await;
        if let Err(err) = client.logout().await {
            warn!(account = %account_id, error = %err, "server-side logout failed");
        }
        account::update_account_status(
            self.db.pool(),
            account_id,
            AccountStatus::LoggedOut,
            "",
            None,
        )
        .await?;
        Ok(())
    }

    /// Disconnect and forget the in-memory handle. Called on account
    /// deletion so no session stays cached for a dead account.
    pub async fn drop_account(&self, account_id: &str) {
        let handle = self.handles.lock().await.remove(account_id);
        if let Some(handle) = handle {
            handle.client.disconnect().await;
            handle.drive.abort();
        }
    }

    /// Fetch the joined-group list from the platform and upsert every group.
    ///
    /// Never deletes: groups that disappeared platform-side keep their rows,
    /// and enablement/risk state is preserved by the upsert. Returns how
    /// many groups were synced.
    pub async fn fetch_and_sync_groups(
        self: &Arc<Self>,
        account_id: &str,
    ) -> Result<usize, SessionError> {
        let client = self.ensure_connected(account_id).await?;

        // Brief settle time for the session.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let groups = match client.joined_groups().await {
            Ok(groups) => groups,
            Err(err) => {
                warn!(account = %account_id, error = %err, "joined-groups query failed, retrying");
                tokio::time::sleep(Duration::from_millis(800)).await;
                client.joined_groups().await?
            }
        };

        let mut count = 0;
        for info in groups {
            if info.jid.is_empty() {
                continue;
            }
            group::upsert_group(self.db.pool(), account_id, &info.jid, &info.name).await?;
            count += 1;
        }
        info!(account = %account_id, count, "groups synced");
        Ok(count)
    }

    /// Participant list for a group, cache-first with a 24 h TTL.
    pub async fn get_group_participants(
        self: &Arc<Self>,
        account_id: &str,
        group_jid: &str,
    ) -> Result<Vec<CachedParticipant>, SessionError> {
        let (cached, hit) =
            participant::get_cached_participants(self.db.pool(), group_jid, PARTICIPANT_CACHE_MINUTES)
                .await?;
        if hit && !cached.is_empty() {
            debug!(group = %group_jid, members = cached.len(), "participants: cache hit");
            return Ok(cached);
        }

        let client = self.client(account_id).await?;
        if !client.is_paired() {
            return Err(ProtoError::NotPaired.into());
        }
        if !client.is_connected() {
            match client.connect().await {
                Ok(()) => {}
                Err(err) if err.is_already_connected() => {}
                Err(err) => return Err(err.into()),
            }
            // Let the connection stabilize before querying.
            tokio::time::sleep(Duration::from_secs(3)).await;
        }

        let info = tokio::time::timeout(Duration::from_secs(30), client.group_info(group_jid))
            .await
            .map_err(|_| ProtoError::Connection(format!("group info timeout for {group_jid}")))??;

        let members: Vec<CachedParticipant> = info
            .participants
            .into_iter()
            .map(|p| CachedParticipant {
                number: p.jid.split('@').next().unwrap_or_default().to_string(),
                jid: p.jid,
                is_admin: p.is_admin,
                is_superadmin: p.is_super_admin,
            })
            .collect();

        if let Err(err) = participant::cache_participants(self.db.pool(), group_jid, &members).await
        {
            warn!(group = %group_jid, error = %err, "participant cache save failed");
        }

        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::{GroupInfo, IncomingPayload, Participant};
    use mock_chat::MockPlatform;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    const BASE: &str = "sqlite:test.db?mode=rwc";

    fn dsn_for(account: &str) -> String {
        store_dsn::per_account_dsn(BASE, account)
    }

    async fn setup() -> (Database, Arc<MockPlatform>, Arc<SessionManager>, String) {
        let db = test_db().await;
        let platform = MockPlatform::new();
        let manager = SessionManager::new(db.clone(), platform.clone(), BASE.to_string());
        let id = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();
        (db, platform, manager, id)
    }

    #[tokio::test]
    async fn test_each_account_gets_own_store() {
        let (db, platform, manager, a1) = setup().await;
        let a2 = account::create_account(db.pool(), "B", "", true, 100)
            .await
            .unwrap();

        manager.client(&a1).await.unwrap();
        manager.client(&a2).await.unwrap();
        // Same account again reuses the handle without reopening
        manager.client(&a1).await.unwrap();

        let opened = platform.opened();
        assert_eq!(opened.len(), 2);
        assert_ne!(opened[0], opened[1]);
        assert!(opened.contains(&dsn_for(&a1)));
        assert!(opened.contains(&dsn_for(&a2)));
    }

    #[tokio::test]
    async fn test_connect_if_paired_requires_pairing() {
        let (_db, _platform, manager, id) = setup().await;
        let err = manager.connect_if_paired(&id).await.unwrap_err();
        assert!(matches!(err, SessionError::Proto(ProtoError::NotPaired)));
    }

    #[tokio::test]
    async fn test_connect_tolerates_already_connected() {
        let (_db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.set_paired(true);
        mock.push_connect_error(ProtoError::AlreadyConnected);

        manager.connect_if_paired(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_pairing_yields_png() {
        let (_db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.push_qr("code", "2@pairing-payload-data");

        let png = manager.start_pairing(&id).await.unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_pairing_connect_started_once() {
        let (_db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.push_qr("code", "2@first");
        manager.start_pairing(&id).await.unwrap();

        mock.push_qr("code", "2@second");
        manager.start_pairing(&id).await.unwrap();

        // Give the spawned connect a chance to run; only one may exist
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(mock.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_start_pairing_rejects_paired_account() {
        let (_db, platform, manager, id) = setup().await;
        platform.client_for(&dsn_for(&id)).set_paired(true);

        let err = manager.start_pairing(&id).await.unwrap_err();
        assert!(matches!(err, SessionError::Proto(ProtoError::AlreadyPaired)));
    }

    #[tokio::test]
    async fn test_pairing_code_unsupported_binding() {
        let (db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.set_pair_unsupported();

        let err = manager.request_pairing_code(&id, "628111").await.unwrap_err();
        assert!(err.is_pairing_unsupported());

        // Status untouched on failure
        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.status, "inactive");
    }

    #[tokio::test]
    async fn test_pairing_code_happy_path() {
        let (db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.set_pair_code("ABCD-1234");

        let code = manager.request_pairing_code(&id, "628111").await.unwrap();
        assert_eq!(code, "ABCD-1234");

        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.status, "pairing");
        assert_eq!(acc.msisdn, "628111");
    }

    #[tokio::test]
    async fn test_pairing_code_requires_msisdn() {
        let (_db, _platform, manager, id) = setup().await;
        let err = manager.request_pairing_code(&id, "").await.unwrap_err();
        assert!(matches!(err, SessionError::MsisdnRequired));
    }

    #[tokio::test]
    async fn test_fetch_and_sync_groups() {
        let (db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.set_paired(true);
        mock.set_joined_groups(vec![
            GroupInfo {
                jid: "1@g.us".into(),
                name: "One".into(),
                participants: vec![],
            },
            GroupInfo {
                jid: "2@g.us".into(),
                name: "Two".into(),
                participants: vec![],
            },
        ]);

        let count = manager.fetch_and_sync_groups(&id).await.unwrap();
        assert_eq!(count, 2);

        let groups = group::list_groups(db.pool(), Some(&id)).await.unwrap();
        assert_eq!(groups.len(), 2);
        // Discovered groups start disabled
        assert!(groups.iter().all(|g| !g.enabled));
    }

    #[tokio::test]
    async fn test_fetch_and_sync_retries_once() {
        let (_db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.set_paired(true);
        mock.push_joined_groups_error("transient stream error");
        mock.set_joined_groups(vec![GroupInfo {
            jid: "1@g.us".into(),
            name: "One".into(),
            participants: vec![],
        }]);

        let count = manager.fetch_and_sync_groups(&id).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(mock.joined_groups_calls(), 2);
    }

    #[tokio::test]
    async fn test_sync_preserves_enablement_and_name() {
        let (db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.set_paired(true);
        mock.set_joined_groups(vec![GroupInfo {
            jid: "1@g.us".into(),
            name: "One".into(),
            participants: vec![],
        }]);
        manager.fetch_and_sync_groups(&id).await.unwrap();
        group::toggle_group(db.pool(), "1@g.us", true).await.unwrap();

        // Second sync reports an empty name; both name and enablement survive
        mock.set_joined_groups(vec![GroupInfo {
            jid: "1@g.us".into(),
            name: String::new(),
            participants: vec![],
        }]);
        manager.fetch_and_sync_groups(&id).await.unwrap();

        let groups = group::list_groups(db.pool(), Some(&id)).await.unwrap();
        assert_eq!(groups[0].name, "One");
        assert!(groups[0].enabled);
    }

    #[tokio::test]
    async fn test_events_drive_status_transitions() {
        let (db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.set_msisdn("628555");
        manager.client(&id).await.unwrap();

        mock.emit(Event::Connected);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.status, "online");
        assert_eq!(acc.msisdn, "628555");

        mock.emit(Event::StreamReplaced);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.status, "replaced");
    }

    struct Recorder(Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle_message(&self, account_id: &str, message: &MessageEvent) {
            let text = message.payload.text().unwrap_or_default().to_string();
            self.0.lock().unwrap().push((account_id.to_string(), text));
        }
    }

    #[tokio::test]
    async fn test_message_fan_out() {
        let (_db, platform, manager, id) = setup().await;
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        manager.add_message_handler(recorder.clone());

        let mock = platform.client_for(&dsn_for(&id));
        manager.client(&id).await.unwrap();

        mock.emit(Event::Message(MessageEvent {
            sender: "628111@s.whatsapp.net".into(),
            chat: "120@g.us".into(),
            timestamp: 1,
            payload: IncomingPayload::Conversation {
                text: "hello".into(),
            },
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec![(id.clone(), "hello".to_string())]);
    }

    #[tokio::test]
    async fn test_drop_account_forgets_handle() {
        let (_db, platform, manager, id) = setup().await;
        manager.client(&id).await.unwrap();
        manager.drop_account(&id).await;
        manager.client(&id).await.unwrap();

        // Handle was reopened after the drop
        assert_eq!(platform.opened().len(), 2);
    }

    #[tokio::test]
    async fn test_logout_sets_status() {
        let (db, platform, manager, id) = setup().await;
        let mock = platform.client_for(&dsn_for(&id));
        mock.set_paired(true);
        mock.set_connected(true);

        manager.logout(&id).await.unwrap();

        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.status, "logged_out");
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn test_participants_cache_first() {
        let (db, platform, manager, id) = setup().await;
        group::upsert_group(db.pool(), &id, "120@g.us", "Toko")
            .await
            .unwrap();

        let mock = platform.client_for(&dsn_for(&id));
        mock.set_paired(true);
        mock.set_connected(true);
        mock.set_group_info(
            "120@g.us",
            GroupInfo {
                jid: "120@g.us".into(),
                name: "Toko".into(),
                participants: vec![Participant {
                    jid: "628111@s.whatsapp.net".into(),
                    is_admin: true,
                    is_super_admin: false,
                }],
            },
        );

        let members = manager.get_group_participants(&id, "120@g.us").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].number, "628111");
        assert!(members[0].is_admin);

        // Second lookup is served from the cache, no further RPC
        mock.set_group_info("120@g.us", GroupInfo::default());
        let members = manager.get_group_participants(&id, "120@g.us").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].number, "628111");
    }
}
