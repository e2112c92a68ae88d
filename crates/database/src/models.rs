//! Database models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of an account's device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Inactive,
    Pairing,
    Online,
    LoggedOut,
    Replaced,
    Error,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Inactive => "inactive",
            AccountStatus::Pairing => "pairing",
            AccountStatus::Online => "online",
            AccountStatus::LoggedOut => "logged_out",
            AccountStatus::Replaced => "replaced",
            AccountStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one delivery attempt part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Sent,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Sent => "sent",
            LogStatus::Failed => "failed",
        }
    }
}

/// Outcome of one auto-join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    Joined,
    Failed,
    Skipped,
}

impl JoinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinStatus::Joined => "joined",
            JoinStatus::Failed => "failed",
            JoinStatus::Skipped => "skipped",
        }
    }
}

/// A chat device session managed by the system.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: String,
    pub label: String,
    pub msisdn: String,
    pub enabled: bool,
    pub daily_limit: i64,
    pub status: String,
    pub last_error: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A chat group known to one account, keyed by the platform JID.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub enabled: bool,
    pub last_sent_at: Option<NaiveDateTime>,
    pub risk_score: i64,
    pub created_at: NaiveDateTime,
}

/// A promotional content bundle. Media URL lists are stored as JSON arrays.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub text_only: String,
    pub images_json: String,
    pub images_caption: String,
    pub videos_json: String,
    pub videos_caption: String,
    pub audio_json: String,
    pub stickers_json: String,
    pub docs_json: String,
    pub docs_caption: String,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Template {
    pub fn image_urls(&self) -> Vec<String> {
        parse_json_list(&self.images_json)
    }

    pub fn video_urls(&self) -> Vec<String> {
        parse_json_list(&self.videos_json)
    }

    pub fn audio_urls(&self) -> Vec<String> {
        parse_json_list(&self.audio_json)
    }

    pub fn sticker_urls(&self) -> Vec<String> {
        parse_json_list(&self.stickers_json)
    }

    pub fn doc_urls(&self) -> Vec<String> {
        parse_json_list(&self.docs_json)
    }
}

/// One audit row per delivery attempt part. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LogEntry {
    pub id: i64,
    pub ts: NaiveDateTime,
    pub account_id: String,
    pub group_id: String,
    pub campaign_id: String,
    pub campaign_session_id: String,
    pub status: String,
    pub error: String,
    pub message_preview: String,
    pub attempt: i64,
    pub scheduled_for: Option<NaiveDateTime>,
}

/// Per-account auto-join policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoJoinSettings {
    pub enabled: bool,
    pub daily_limit: i64,
    pub preview_before_join: bool,
    pub whitelist_contacts: Vec<String>,
    pub blacklist_keywords: Vec<String>,
}

impl Default for AutoJoinSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            daily_limit: 20,
            preview_before_join: true,
            whitelist_contacts: Vec::new(),
            blacklist_keywords: Vec::new(),
        }
    }
}

/// One audit row per auto-join attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AutoJoinLogEntry {
    pub id: i64,
    pub account_id: String,
    pub group_id: String,
    pub group_name: String,
    pub invite_code: String,
    pub shared_by: String,
    pub shared_in: String,
    pub status: String,
    pub reason: String,
    pub joined_at: NaiveDateTime,
}

/// Aggregate auto-join counters for one account.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinStats {
    pub total_joined: i64,
    pub total_failed: i64,
    pub total_skipped: i64,
    pub joined_today: i64,
}

/// A cached group member row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CachedParticipant {
    pub jid: String,
    pub number: String,
    pub is_admin: bool,
    pub is_superadmin: bool,
}

/// Parse a JSON array column; empty or malformed content yields an empty list.
pub fn parse_json_list(s: &str) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(s).unwrap_or_default()
}

/// Serialize a URL list for storage in a JSON array column.
pub fn to_json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
