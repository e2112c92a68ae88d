//! Auto-join engine: invite links seen in inbound messages are filtered
//! through per-account policy and, when allowed, joined at most once.
//!
//! The engine subscribes to the session manager's inbound-message stream.
//! For every message it extracts invite codes, then runs each code through
//! the pipeline: validate → load settings → enabled? → daily count →
//! preview → filter → rate limit → duplicate check → join. Every outcome
//! lands in the durable audit log; a successful join also triggers a group
//! re-sync shortly after.
//!
//! The same entry point serves operator-initiated joins
//! ([`AutoJoiner::process_invite_code`] with `shared_by = "manual"`);
//! filters still apply.

pub mod detector;
pub mod filter;

pub use filter::{Filter, FilterReason};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use chat_core::{GroupInfo, MessageEvent, ProtoError};
use database::autojoin as join_store;
use database::autojoin::NewAutoJoinLog;
use database::{Database, JoinStatus};
use session::{MessageHandler, SessionError, SessionManager};

/// Minimum interval between successful joins per account.
const MIN_JOIN_INTERVAL: Duration = Duration::from_secs(3);
/// Group info preview timeout.
const PREVIEW_TIMEOUT: Duration = Duration::from_secs(15);
/// Join call timeout.
const JOIN_TIMEOUT: Duration = Duration::from_secs(30);
/// Delay before the post-join group re-sync.
const POST_JOIN_SYNC_DELAY: Duration = Duration::from_secs(2);

/// Handles invite codes from inbound messages and manual requests.
pub struct AutoJoiner {
    db: Database,
    sessions: Arc<SessionManager>,
    // In-memory per-account rate limit; reset on restart is fine because
    // joins are also bounded by the durable daily quota.
    last_join: Mutex<HashMap<String, Instant>>,
}

impl AutoJoiner {
    pub fn new(db: Database, sessions: Arc<SessionManager>) -> Arc<Self> {
        Arc::new(Self {
            db,
            sessions,
            last_join: Mutex::new(HashMap::new()),
        })
    }

    /// Run one invite code through the full pipeline. All outcomes are
    /// recorded in the audit log; errors never propagate to the caller.
    pub async fn process_invite_code(
        &self,
        account_id: &str,
        invite_code: &str,
        shared_by: &str,
        shared_in: &str,
    ) {
        let code = detector::normalize_invite_code(invite_code);
        if !detector::validate_invite_code(&code) {
            warn!(account = %account_id, code = %invite_code, "invalid invite code");
            self.log_skip(account_id, "", &code, shared_by, shared_in, FilterReason::InvalidCode)
                .await;
            return;
        }

        let settings = match join_store::get_settings(self.db.pool(), account_id).await {
            Ok(settings) => settings,
            Err(err) => {
                error!(account = %account_id, error = %err, "failed to load auto-join settings");
                return;
            }
        };
        if !settings.enabled {
            debug!(account = %account_id, "auto-join disabled");
            self.log_skip(account_id, "", &code, shared_by, shared_in, FilterReason::Disabled)
                .await;
            return;
        }

        let joins_today = match join_store::count_joins_today(self.db.pool(), account_id).await {
            Ok(n) => n,
            Err(err) => {
                error!(account = %account_id, error = %err, "failed to count joins today");
                return;
            }
        };

        let filter = Filter::from(&settings);

        let mut group_name = String::new();
        if settings.preview_before_join {
            match self.preview_group(account_id, &code).await {
                Ok(info) => {
                    info!(
                        account = %account_id,
                        group = %info.name,
                        participants = info.participants.len(),
                        "previewed group"
                    );
                    group_name = info.name;
                }
                Err(err) => {
                    warn!(account = %account_id, code = %code, error = %err, "group preview failed");
                    self.log_attempt(
                        account_id,
                        "",
                        "",
                        &code,
                        shared_by,
                        shared_in,
                        JoinStatus::Failed,
                        &format!("preview_failed: {err}"),
                    )
                    .await;
                    return;
                }
            }
        }

        if let Err(reason) = filter.should_join(shared_by, &group_name, joins_today) {
            info!(account = %account_id, code = %code, reason = %reason, "join filtered");
            self.log_attempt(
                account_id,
                "",
                &group_name,
                &code,
                shared_by,
                shared_in,
                JoinStatus::Skipped,
                reason.as_str(),
            )
            .await;
            return;
        }

        if !self.check_rate_limit(account_id) {
            info!(account = %account_id, code = %code, "join rate limited");
            self.log_attempt(
                account_id,
                "",
                &group_name,
                &code,
                shared_by,
                shared_in,
                JoinStatus::Skipped,
                FilterReason::RateLimit.as_str(),
            )
            .await;
            return;
        }

        match join_store::has_successful_join(self.db.pool(), account_id, &code).await {
            Ok(true) => {
                info!(account = %account_id, code = %code, "already joined");
                self.log_attempt(
                    account_id,
                    "",
                    &group_name,
                    &code,
                    shared_by,
                    shared_in,
                    JoinStatus::Skipped,
                    FilterReason::AlreadyJoined.as_str(),
                )
                .await;
                return;
            }
            Ok(false) => {}
            Err(err) => {
                error!(account = %account_id, error = %err, "duplicate check failed");
                return;
            }
        }

        let group_jid = match self.join_group(account_id, &code).await {
            Ok(jid) => jid,
            Err(err) => {
                warn!(account = %account_id, code = %code, error = %err, "join failed");
                self.log_attempt(
                    account_id,
                    "",
                    &group_name,
                    &code,
                    shared_by,
                    shared_in,
                    JoinStatus::Failed,
                    &err.to_string(),
                )
                .await;
                return;
            }
        };

        info!(account = %account_id, group = %group_jid, code = %code, "joined group");

        // Fill in the name when we skipped the preview.
        if group_name.is_empty() {
            if let Ok(client) = self.sessions.client(account_id).await {
                if let Ok(info) = client.group_info(&group_jid).await {
                    group_name = info.name;
                }
            }
        }

        self.log_attempt(
            account_id,
            &group_jid,
            &group_name,
            &code,
            shared_by,
            shared_in,
            JoinStatus::Joined,
            "",
        )
        .await;

        self.last_join
            .lock()
            .unwrap()
            .insert(account_id.to_string(), Instant::now());

        // Pull the fresh group into the database shortly after the join.
        let sessions = self.sessions.clone();
        let account = account_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(POST_JOIN_SYNC_DELAY).await;
            if let Err(err) = sessions.fetch_and_sync_groups(&account).await {
                warn!(account = %account, error = %err, "post-join group sync failed");
            }
        });
    }

    async fn preview_group(
        &self,
        account_id: &str,
        code: &str,
    ) -> Result<GroupInfo, SessionError> {
        let client = self.sessions.client(account_id).await?;
        let info = tokio::time::timeout(PREVIEW_TIMEOUT, client.group_info_by_invite(code))
            .await
            .map_err(|_| ProtoError::Connection("group preview timeout".to_string()))??;
        Ok(info)
    }

    async fn join_group(&self, account_id: &str, code: &str) -> Result<String, SessionError> {
        let client = self.sessions.client(account_id).await?;

        if !client.is_connected() {
            match client.connect().await {
                Ok(()) => {}
                Err(err) if err.is_already_connected() => {}
                Err(err) => return Err(err.into()),
            }
            // Let the connection stabilize before the join call.
            tokio::time::sleep(Duration::from_secs(2)).await;
        }

        let jid = tokio::time::timeout(JOIN_TIMEOUT, client.join_group_by_invite(code))
            .await
            .map_err(|_| ProtoError::Connection("join timeout".to_string()))??;
        Ok(jid)
    }

    /// Non-blocking rate limit: false when the account joined less than the
    /// minimum interval ago.
    fn check_rate_limit(&self, account_id: &str) -> bool {
        match self.last_join.lock().unwrap().get(account_id) {
            Some(last) => last.elapsed() >= MIN_JOIN_INTERVAL,
            None => true,
        }
    }

    async fn log_skip(
        &self,
        account_id: &str,
        group_name: &str,
        code: &str,
        shared_by: &str,
        shared_in: &str,
        reason: FilterReason,
    ) {
        self.log_attempt(
            account_id,
            "",
            group_name,
            code,
            shared_by,
            shared_in,
            JoinStatus::Skipped,
            reason.as_str(),
        )
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_attempt(
        &self,
        account_id: &str,
        group_id: &str,
        group_name: &str,
        invite_code: &str,
        shared_by: &str,
        shared_in: &str,
        status: JoinStatus,
        reason: &str,
    ) {
        let entry = NewAutoJoinLog {
            account_id,
            group_id,
            group_name,
            invite_code,
            shared_by,
            shared_in,
            status,
            reason,
        };
        if let Err(err) = join_store::append_join_log(self.db.pool(), &entry).await {
            error!(account = %account_id, error = %err, "failed to write auto-join log");
        }
    }
}

#[async_trait]
impl MessageHandler for AutoJoiner {
    async fn handle_message(&self, account_id: &str, message: &MessageEvent) {
        let Some(text) = message.payload.text() else {
            return;
        };
        if text.is_empty() || !detector::has_group_link(text) {
            return;
        }
        let codes = detector::extract_invite_codes(text);
        if codes.is_empty() {
            return;
        }

        info!(
            account = %account_id,
            sender = %message.sender,
            links = codes.len(),
            "invite links detected"
        );
        for code in codes {
            self.process_invite_code(account_id, &code, &message.sender, &message.chat)
                .await;
        }
    }
}
