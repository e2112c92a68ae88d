//! SQLite persistence layer for the broadcast engine.
//!
//! This crate owns all SQL. It provides async, typed operations for accounts,
//! groups, templates, delivery logs, auto-join policy/audit, and the group
//! participant cache, using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:promote.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let id = database::account::create_account(db.pool(), "Main", "", true, 0).await?;
//!     database::group::upsert_group(db.pool(), &id, "120@g.us", "Toko").await?;
//!
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod autojoin;
pub mod error;
pub mod group;
pub mod log;
pub mod models;
pub mod participant;
pub mod template;

pub use error::{DatabaseError, Result};
pub use models::{
    Account, AccountStatus, AutoJoinLogEntry, AutoJoinSettings, CachedParticipant, Group,
    JoinStats, JoinStatus, LogEntry, LogStatus, Template,
};

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// WAL journaling and foreign keys are enabled on every connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("Connected to database: {}", url);

        Ok(Self { pool })
    }

    /// Apply the schema, idempotently.
    ///
    /// Tables are created if missing; columns added after the first release
    /// are applied as tolerated `ALTER TABLE` statements so existing
    /// databases upgrade in place. Safe to call on every startup.
    pub async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        const STMTS: &[&str] = &[
            r#"CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                msisdn TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1,
                daily_limit INTEGER NOT NULL DEFAULT 100,
                status TEXT NOT NULL DEFAULT 'inactive',
                last_error TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"#,
            r#"CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 0,
                last_sent_at TIMESTAMP,
                risk_score INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE CASCADE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                text_only TEXT NOT NULL DEFAULT '',
                images_json TEXT NOT NULL DEFAULT '',
                images_caption TEXT NOT NULL DEFAULT '',
                videos_json TEXT NOT NULL DEFAULT '',
                videos_caption TEXT NOT NULL DEFAULT '',
                stickers_json TEXT NOT NULL DEFAULT '',
                docs_json TEXT NOT NULL DEFAULT '',
                docs_caption TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"#,
            r#"CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                account_id TEXT,
                group_id TEXT,
                campaign_id TEXT,
                status TEXT,
                error TEXT,
                message_preview TEXT,
                attempt INTEGER NOT NULL DEFAULT 1,
                scheduled_for TIMESTAMP,
                FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE SET NULL,
                FOREIGN KEY(group_id) REFERENCES groups(id) ON DELETE SET NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS auto_join_settings (
                account_id TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 0,
                daily_limit INTEGER NOT NULL DEFAULT 20,
                preview_before_join INTEGER NOT NULL DEFAULT 1,
                whitelist_contacts TEXT NOT NULL DEFAULT '[]',
                blacklist_keywords TEXT NOT NULL DEFAULT '[]',
                FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE CASCADE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS auto_join_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                group_id TEXT,
                group_name TEXT,
                invite_code TEXT NOT NULL,
                shared_by TEXT,
                shared_in TEXT,
                status TEXT NOT NULL,
                reason TEXT,
                joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE CASCADE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS group_participants (
                group_id TEXT NOT NULL,
                jid TEXT NOT NULL,
                number TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                is_superadmin INTEGER NOT NULL DEFAULT 0,
                cached_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (group_id, jid),
                FOREIGN KEY(group_id) REFERENCES groups(id) ON DELETE CASCADE
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_groups_account ON groups(account_id)",
            "CREATE INDEX IF NOT EXISTS idx_logs_group_ts ON logs(group_id, ts)",
            "CREATE INDEX IF NOT EXISTS idx_logs_account_ts ON logs(account_id, ts)",
            "CREATE INDEX IF NOT EXISTS idx_templates_enabled ON templates(enabled)",
            "CREATE INDEX IF NOT EXISTS idx_auto_join_logs_account ON auto_join_logs(account_id, joined_at)",
            "CREATE INDEX IF NOT EXISTS idx_group_participants_cached ON group_participants(group_id, cached_at)",
        ];

        for stmt in STMTS {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }

        tx.commit().await?;

        // Additive upgrades for databases created before these columns
        // existed. Failure means the column is already there.
        let _ = sqlx::query("ALTER TABLE templates ADD COLUMN audio_json TEXT NOT NULL DEFAULT ''")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("ALTER TABLE logs ADD COLUMN campaign_session_id TEXT")
            .execute(&self.pool)
            .await;

        tracing::info!("Schema migration complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AutoJoinSettings, JoinStatus, LogStatus};

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = test_db().await;
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_account_crud() {
        let db = test_db().await;

        let id = account::create_account(db.pool(), "Main", "628111", true, 0)
            .await
            .unwrap();

        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.label, "Main");
        assert_eq!(acc.msisdn, "628111");
        // daily_limit <= 0 clamps to the default
        assert_eq!(acc.daily_limit, 100);
        assert_eq!(acc.status, "inactive");

        assert!(account::account_exists(db.pool(), &id).await.unwrap());
        assert!(!account::account_exists(db.pool(), "missing").await.unwrap());

        account::update_account(db.pool(), &id, "Renamed", "628222", false, 50)
            .await
            .unwrap();
        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.label, "Renamed");
        assert!(!acc.enabled);
        assert_eq!(acc.daily_limit, 50);

        let list = account::list_accounts(db.pool()).await.unwrap();
        assert_eq!(list.len(), 1);

        account::delete_account(db.pool(), &id).await.unwrap();
        assert!(!account::account_exists(db.pool(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_daily_limit_hard_cap() {
        let db = test_db().await;
        let id = account::create_account(db.pool(), "Big", "", true, 5000)
            .await
            .unwrap();
        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.daily_limit, 1000);
    }

    #[tokio::test]
    async fn test_update_status_preserves_msisdn() {
        let db = test_db().await;
        let id = account::create_account(db.pool(), "A", "628111", true, 100)
            .await
            .unwrap();

        // Empty msisdn leaves the stored one alone
        account::update_account_status(db.pool(), &id, AccountStatus::Online, "", Some(""))
            .await
            .unwrap();
        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.status, "online");
        assert_eq!(acc.msisdn, "628111");

        // Non-empty msisdn overwrites
        account::update_account_status(
            db.pool(),
            &id,
            AccountStatus::Online,
            "",
            Some("628999"),
        )
        .await
        .unwrap();
        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.msisdn, "628999");

        // None leaves it alone too
        account::update_account_status(db.pool(), &id, AccountStatus::LoggedOut, "boom", None)
            .await
            .unwrap();
        let acc = account::get_account(db.pool(), &id).await.unwrap();
        assert_eq!(acc.status, "logged_out");
        assert_eq!(acc.last_error, "boom");
        assert_eq!(acc.msisdn, "628999");
    }

    #[tokio::test]
    async fn test_group_upsert_preserves_name() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();

        group::upsert_group(db.pool(), &acc, "120@g.us", "Toko")
            .await
            .unwrap();
        // Re-sync with an empty name keeps "Toko"
        group::upsert_group(db.pool(), &acc, "120@g.us", "")
            .await
            .unwrap();

        let groups = group::list_groups(db.pool(), Some(&acc)).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Toko");
        assert!(!groups[0].enabled);

        // A fresh name overwrites
        group::upsert_group(db.pool(), &acc, "120@g.us", "Toko Baru")
            .await
            .unwrap();
        let groups = group::list_groups(db.pool(), Some(&acc)).await.unwrap();
        assert_eq!(groups[0].name, "Toko Baru");
    }

    #[tokio::test]
    async fn test_group_cascade_on_account_delete() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();
        group::upsert_group(db.pool(), &acc, "120@g.us", "Toko")
            .await
            .unwrap();
        autojoin::set_enabled(db.pool(), &acc, true).await.unwrap();

        account::delete_account(db.pool(), &acc).await.unwrap();

        assert!(group::list_groups(db.pool(), Some(&acc))
            .await
            .unwrap()
            .is_empty());
        // Settings row gone: reading yields the defaults again
        let settings = autojoin::get_settings(db.pool(), &acc).await.unwrap();
        assert!(!settings.enabled);
    }

    #[tokio::test]
    async fn test_toggle_group() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();
        group::upsert_group(db.pool(), &acc, "120@g.us", "Toko")
            .await
            .unwrap();

        assert_eq!(group::toggle_group(db.pool(), "120@g.us", true).await.unwrap(), 1);
        let groups = group::list_groups(db.pool(), None).await.unwrap();
        assert!(groups[0].enabled);

        assert_eq!(group::toggle_group(db.pool(), "missing@g.us", true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_group_eligibility() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();
        group::upsert_group(db.pool(), &acc, "1@g.us", "One").await.unwrap();
        group::upsert_group(db.pool(), &acc, "2@g.us", "Two").await.unwrap();
        group::upsert_group(db.pool(), &acc, "3@g.us", "Three").await.unwrap();

        // Nothing enabled yet
        assert_eq!(
            group::count_eligible_groups(db.pool(), &acc, 48, 3).await.unwrap(),
            0
        );

        group::toggle_group(db.pool(), "1@g.us", true).await.unwrap();
        group::toggle_group(db.pool(), "2@g.us", true).await.unwrap();
        assert_eq!(
            group::count_eligible_groups(db.pool(), &acc, 48, 3).await.unwrap(),
            2
        );

        // A recent send puts the group on cooldown
        group::mark_sent(db.pool(), "1@g.us").await.unwrap();
        assert_eq!(
            group::count_eligible_groups(db.pool(), &acc, 48, 3).await.unwrap(),
            1
        );
        let picked = group::pick_eligible_group(db.pool(), &acc, 48, 3)
            .await
            .unwrap();
        assert_eq!(picked.as_deref(), Some("2@g.us"));

        let groups = group::list_groups(db.pool(), Some(&acc)).await.unwrap();
        let recent = groups.iter().find(|g| g.id == "1@g.us").unwrap();
        assert!(recent.last_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_risk_bump_auto_pauses() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();
        group::upsert_group(db.pool(), &acc, "1@g.us", "One").await.unwrap();
        group::toggle_group(db.pool(), "1@g.us", true).await.unwrap();

        group::bump_risk_and_maybe_pause(db.pool(), "1@g.us", 3).await.unwrap();
        group::bump_risk_and_maybe_pause(db.pool(), "1@g.us", 3).await.unwrap();
        let g = &group::list_groups(db.pool(), Some(&acc)).await.unwrap()[0];
        assert_eq!(g.risk_score, 2);
        assert!(g.enabled);

        group::bump_risk_and_maybe_pause(db.pool(), "1@g.us", 3).await.unwrap();
        let g = &group::list_groups(db.pool(), Some(&acc)).await.unwrap()[0];
        assert_eq!(g.risk_score, 3);
        assert!(!g.enabled);

        assert_eq!(
            group::count_eligible_groups(db.pool(), &acc, 0, 3).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_logs_and_stats() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();
        group::upsert_group(db.pool(), &acc, "1@g.us", "One").await.unwrap();

        log::append_log(
            db.pool(),
            &log::NewLogEntry {
                account_id: &acc,
                group_id: "1@g.us",
                campaign_id: None,
                session_id: Some("s1"),
                status: LogStatus::Sent,
                error: "",
                preview: "text-only:halo",
                attempt: 1,
            },
        )
        .await
        .unwrap();
        log::append_log(
            db.pool(),
            &log::NewLogEntry {
                account_id: &acc,
                group_id: "1@g.us",
                campaign_id: None,
                session_id: Some("s1"),
                status: LogStatus::Failed,
                error: "timeout",
                preview: "image:https://x/y.jpg",
                attempt: 3,
            },
        )
        .await
        .unwrap();

        let (total, sent, failed) = log::stats_today(db.pool()).await.unwrap();
        assert_eq!((total, sent, failed), (2, 1, 1));

        assert_eq!(log::count_sent_today(db.pool(), &acc).await.unwrap(), 1);

        let rows = log::logs_after(db.pool(), 0, 100).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].campaign_session_id, "s1");
        assert_eq!(rows[1].status, "failed");
        assert_eq!(rows[1].attempt, 3);

        let rows = log::logs_after(db.pool(), rows[0].id, 100).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_template_crud_and_random_pick() {
        let db = test_db().await;

        assert!(template::pick_random_enabled(db.pool()).await.unwrap().is_none());

        let id = template::create_template(
            db.pool(),
            &template::NewTemplate {
                name: "Promo".into(),
                text_only: "halo {group_name}".into(),
                image_urls: vec!["/uploads/a.jpg".into()],
                images_caption: "cek {time_now}".into(),
                video_urls: vec![],
                videos_caption: String::new(),
                audio_urls: vec![],
                sticker_urls: vec![],
                doc_urls: vec![],
                docs_caption: String::new(),
                enabled: true,
            },
        )
        .await
        .unwrap();

        let t = template::pick_random_enabled(db.pool()).await.unwrap().unwrap();
        assert_eq!(t.id, id);
        assert_eq!(t.image_urls(), vec!["/uploads/a.jpg".to_string()]);
        assert_eq!(t.images_caption, "cek {time_now}");

        // Disabled templates are never picked
        template::toggle_template(db.pool(), &id, false).await.unwrap();
        assert!(template::pick_random_enabled(db.pool()).await.unwrap().is_none());

        assert_eq!(template::delete_template(db.pool(), &id).await.unwrap(), 1);
        assert!(template::list_templates(db.pool()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_autojoin_settings_defaults_and_clamp() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();

        // Missing row yields the defaults
        let s = autojoin::get_settings(db.pool(), &acc).await.unwrap();
        assert!(!s.enabled);
        assert_eq!(s.daily_limit, 20);
        assert!(s.preview_before_join);
        assert!(s.whitelist_contacts.is_empty());

        let mut s = AutoJoinSettings {
            enabled: true,
            daily_limit: 500,
            preview_before_join: false,
            whitelist_contacts: vec!["628111@s.whatsapp.net".into()],
            blacklist_keywords: vec!["judi".into()],
        };
        autojoin::upsert_settings(db.pool(), &acc, &s).await.unwrap();
        let stored = autojoin::get_settings(db.pool(), &acc).await.unwrap();
        assert_eq!(stored.daily_limit, 100); // clamped
        assert!(stored.enabled);
        assert_eq!(stored.blacklist_keywords, vec!["judi".to_string()]);

        s.daily_limit = 0;
        autojoin::upsert_settings(db.pool(), &acc, &s).await.unwrap();
        let stored = autojoin::get_settings(db.pool(), &acc).await.unwrap();
        assert_eq!(stored.daily_limit, 20); // back to default
    }

    #[tokio::test]
    async fn test_autojoin_log_dedup_and_stats() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();

        assert!(!autojoin::has_successful_join(db.pool(), &acc, "ABCDEFGHIJ")
            .await
            .unwrap());

        autojoin::append_join_log(
            db.pool(),
            &autojoin::NewAutoJoinLog {
                account_id: &acc,
                group_id: "120@g.us",
                group_name: "Promo Toko",
                invite_code: "ABCDEFGHIJ",
                shared_by: "628111@s.whatsapp.net",
                shared_in: "628111@s.whatsapp.net",
                status: JoinStatus::Joined,
                reason: "",
            },
        )
        .await
        .unwrap();
        autojoin::append_join_log(
            db.pool(),
            &autojoin::NewAutoJoinLog {
                account_id: &acc,
                group_id: "",
                group_name: "",
                invite_code: "XYZ1234567",
                shared_by: "",
                shared_in: "",
                status: JoinStatus::Skipped,
                reason: "keyword_blacklisted",
            },
        )
        .await
        .unwrap();

        assert!(autojoin::has_successful_join(db.pool(), &acc, "ABCDEFGHIJ")
            .await
            .unwrap());
        assert!(!autojoin::has_successful_join(db.pool(), &acc, "XYZ1234567")
            .await
            .unwrap());

        assert_eq!(autojoin::count_joins_today(db.pool(), &acc).await.unwrap(), 1);

        let stats = autojoin::join_stats(db.pool(), &acc).await.unwrap();
        assert_eq!(stats.total_joined, 1);
        assert_eq!(stats.total_skipped, 1);
        assert_eq!(stats.joined_today, 1);

        let rows = autojoin::list_join_logs(db.pool(), &acc, 50, None).await.unwrap();
        assert_eq!(rows.len(), 2);
        let joined = autojoin::list_join_logs(db.pool(), &acc, 50, Some("joined"))
            .await
            .unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].invite_code, "ABCDEFGHIJ");
    }

    #[tokio::test]
    async fn test_participant_cache() {
        let db = test_db().await;
        let acc = account::create_account(db.pool(), "A", "", true, 100)
            .await
            .unwrap();
        group::upsert_group(db.pool(), &acc, "120@g.us", "Toko")
            .await
            .unwrap();

        let (rows, hit) = participant::get_cached_participants(db.pool(), "120@g.us", 1440)
            .await
            .unwrap();
        assert!(!hit);
        assert!(rows.is_empty());

        let members = vec![
            CachedParticipant {
                jid: "628111@s.whatsapp.net".into(),
                number: "628111".into(),
                is_admin: true,
                is_superadmin: false,
            },
            CachedParticipant {
                jid: "628222@s.whatsapp.net".into(),
                number: "628222".into(),
                is_admin: false,
                is_superadmin: false,
            },
        ];
        participant::cache_participants(db.pool(), "120@g.us", &members)
            .await
            .unwrap();

        let (rows, hit) = participant::get_cached_participants(db.pool(), "120@g.us", 1440)
            .await
            .unwrap();
        assert!(hit);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_admin);

        // Refresh replaces the whole set in one transaction
        participant::cache_participants(db.pool(), "120@g.us", &members[..1])
            .await
            .unwrap();
        let (rows, _) = participant::get_cached_participants(db.pool(), "120@g.us", 1440)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        participant::invalidate_participants_cache(db.pool(), "120@g.us")
            .await
            .unwrap();
        let (_, hit) = participant::get_cached_participants(db.pool(), "120@g.us", 1440)
            .await
            .unwrap();
        assert!(!hit);
    }
}
