//! Auto-join settings and audit log operations.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{parse_json_list, to_json_list, AutoJoinLogEntry, AutoJoinSettings, JoinStats, JoinStatus};

/// Default auto-join daily limit.
pub const DEFAULT_JOIN_LIMIT: i64 = 20;
/// Safety cap on the auto-join daily limit.
pub const MAX_JOIN_LIMIT: i64 = 100;

/// Load settings for an account, falling back to the defaults when no row
/// exists yet.
pub async fn get_settings(pool: &SqlitePool, account_id: &str) -> Result<AutoJoinSettings> {
    let row = sqlx::query_as::<_, (bool, i64, bool, String, String)>(
        r#"
        SELECT enabled, daily_limit, preview_before_join,
               COALESCE(whitelist_contacts, '[]'),
               COALESCE(blacklist_keywords, '[]')
        FROM auto_join_settings
        WHERE account_id = ?
        "#,
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        Some((enabled, daily_limit, preview_before_join, whitelist, blacklist)) => {
            AutoJoinSettings {
                enabled,
                daily_limit,
                preview_before_join,
                whitelist_contacts: parse_json_list(&whitelist),
                blacklist_keywords: parse_json_list(&blacklist),
            }
        }
        None => AutoJoinSettings::default(),
    })
}

/// Insert or replace settings for an account. The daily limit is clamped to
/// 1..=100, with non-positive values falling back to the default.
pub async fn upsert_settings(
    pool: &SqlitePool,
    account_id: &str,
    settings: &AutoJoinSettings,
) -> Result<()> {
    let daily_limit = if settings.daily_limit < 1 {
        DEFAULT_JOIN_LIMIT
    } else {
        settings.daily_limit.min(MAX_JOIN_LIMIT)
    };

    sqlx::query(
        r#"
        INSERT INTO auto_join_settings
            (account_id, enabled, daily_limit, preview_before_join,
             whitelist_contacts, blacklist_keywords)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(account_id) DO UPDATE SET
            enabled = excluded.enabled,
            daily_limit = excluded.daily_limit,
            preview_before_join = excluded.preview_before_join,
            whitelist_contacts = excluded.whitelist_contacts,
            blacklist_keywords = excluded.blacklist_keywords
        "#,
    )
    .bind(account_id)
    .bind(settings.enabled)
    .bind(daily_limit)
    .bind(settings.preview_before_join)
    .bind(to_json_list(&settings.whitelist_contacts))
    .bind(to_json_list(&settings.blacklist_keywords))
    .execute(pool)
    .await?;

    Ok(())
}

/// Quick enable/disable, creating a row with defaults when missing.
pub async fn set_enabled(pool: &SqlitePool, account_id: &str, enabled: bool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auto_join_settings (account_id, enabled, daily_limit, preview_before_join)
        VALUES (?, ?, ?, 1)
        ON CONFLICT(account_id) DO UPDATE SET enabled = excluded.enabled
        "#,
    )
    .bind(account_id)
    .bind(enabled)
    .bind(DEFAULT_JOIN_LIMIT)
    .execute(pool)
    .await?;

    Ok(())
}

/// How many groups this account has successfully joined today.
pub async fn count_joins_today(pool: &SqlitePool, account_id: &str) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM auto_join_logs
        WHERE account_id = ? AND status = 'joined'
          AND joined_at >= datetime('now', 'start of day')
        "#,
    )
    .bind(account_id)
    .fetch_one(pool)
    .await?;

    Ok(n)
}

/// Whether this account already has a successful join for the invite code.
pub async fn has_successful_join(
    pool: &SqlitePool,
    account_id: &str,
    invite_code: &str,
) -> Result<bool> {
    let n = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM auto_join_logs
        WHERE account_id = ? AND invite_code = ? AND status = 'joined'
        "#,
    )
    .bind(account_id)
    .bind(invite_code)
    .fetch_one(pool)
    .await?;

    Ok(n > 0)
}

/// One row to append to the auto-join audit log.
#[derive(Debug)]
pub struct NewAutoJoinLog<'a> {
    pub account_id: &'a str,
    pub group_id: &'a str,
    pub group_name: &'a str,
    pub invite_code: &'a str,
    pub shared_by: &'a str,
    pub shared_in: &'a str,
    pub status: JoinStatus,
    pub reason: &'a str,
}

/// Append one auto-join audit row. Empty optional fields are stored as NULL.
pub async fn append_join_log(pool: &SqlitePool, entry: &NewAutoJoinLog<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auto_join_logs
            (account_id, group_id, group_name, invite_code,
             shared_by, shared_in, status, reason)
        VALUES (?, NULLIF(?, ''), NULLIF(?, ''), ?, NULLIF(?, ''), NULLIF(?, ''), ?, NULLIF(?, ''))
        "#,
    )
    .bind(entry.account_id)
    .bind(entry.group_id)
    .bind(entry.group_name)
    .bind(entry.invite_code)
    .bind(entry.shared_by)
    .bind(entry.shared_in)
    .bind(entry.status.as_str())
    .bind(entry.reason)
    .execute(pool)
    .await?;

    Ok(())
}

/// Auto-join history for an account, newest first, optionally filtered by
/// status.
pub async fn list_join_logs(
    pool: &SqlitePool,
    account_id: &str,
    limit: i64,
    status: Option<&str>,
) -> Result<Vec<AutoJoinLogEntry>> {
    const COLUMNS: &str = r#"
        SELECT id, account_id,
               COALESCE(group_id, '') AS group_id,
               COALESCE(group_name, '') AS group_name,
               invite_code,
               COALESCE(shared_by, '') AS shared_by,
               COALESCE(shared_in, '') AS shared_in,
               status,
               COALESCE(reason, '') AS reason,
               joined_at
        FROM auto_join_logs
    "#;

    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, AutoJoinLogEntry>(&format!(
                "{COLUMNS} WHERE account_id = ? AND status = ? ORDER BY joined_at DESC, id DESC LIMIT ?"
            ))
            .bind(account_id)
            .bind(status)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, AutoJoinLogEntry>(&format!(
                "{COLUMNS} WHERE account_id = ? ORDER BY joined_at DESC, id DESC LIMIT ?"
            ))
            .bind(account_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows)
}

/// Aggregate counters for an account's auto-join history.
pub async fn join_stats(pool: &SqlitePool, account_id: &str) -> Result<JoinStats> {
    let (total_joined, total_failed, total_skipped) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN status = 'joined' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'skipped' THEN 1 ELSE 0 END), 0)
        FROM auto_join_logs
        WHERE account_id = ?
        "#,
    )
    .bind(account_id)
    .fetch_one(pool)
    .await?;

    let joined_today = count_joins_today(pool, account_id).await?;

    Ok(JoinStats {
        total_joined,
        total_failed,
        total_skipped,
        joined_today,
    })
}
