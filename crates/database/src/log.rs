//! Delivery log operations. The logs table is append-only.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{LogEntry, LogStatus};

/// One row to append to the delivery log.
#[derive(Debug)]
pub struct NewLogEntry<'a> {
    pub account_id: &'a str,
    pub group_id: &'a str,
    pub campaign_id: Option<&'a str>,
    /// Groups all rows from one sender invocation.
    pub session_id: Option<&'a str>,
    pub status: LogStatus,
    pub error: &'a str,
    /// ≤128-char summary of the part that was sent.
    pub preview: &'a str,
    /// Number of underlying send attempts, 1-based.
    pub attempt: i64,
}

/// Append one delivery log row.
pub async fn append_log(pool: &SqlitePool, entry: &NewLogEntry<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO logs
            (account_id, group_id, campaign_id, campaign_session_id,
             status, error, message_preview, attempt, scheduled_for)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
        "#,
    )
    .bind(entry.account_id)
    .bind(entry.group_id)
    .bind(entry.campaign_id)
    .bind(entry.session_id)
    .bind(entry.status.as_str())
    .bind(entry.error)
    .bind(entry.preview)
    .bind(entry.attempt)
    .execute(pool)
    .await?;

    Ok(())
}

/// (total, sent, failed) counters for the current day.
pub async fn stats_today(pool: &SqlitePool) -> Result<(i64, i64, i64)> {
    let row = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN status = 'sent' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0)
        FROM logs
        WHERE ts >= datetime('now', 'start of day')
          AND ts < datetime('now', 'start of day', '+1 day')
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// How many parts an account has successfully sent today. Compared against
/// the account's daily_limit by the scheduler.
pub async fn count_sent_today(pool: &SqlitePool, account_id: &str) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(CASE WHEN status = 'sent' THEN 1 ELSE 0 END), 0)
        FROM logs
        WHERE account_id = ?
          AND ts >= datetime('now', 'start of day')
          AND ts < datetime('now', 'start of day', '+1 day')
        "#,
    )
    .bind(account_id)
    .fetch_one(pool)
    .await?;

    Ok(n)
}

/// Rows with id greater than `last_id`, oldest first. Feeds the SSE stream.
pub async fn logs_after(pool: &SqlitePool, last_id: i64, limit: i64) -> Result<Vec<LogEntry>> {
    let rows = sqlx::query_as::<_, LogEntry>(
        r#"
        SELECT id, ts,
               COALESCE(account_id, '') AS account_id,
               COALESCE(group_id, '') AS group_id,
               COALESCE(campaign_id, '') AS campaign_id,
               COALESCE(campaign_session_id, '') AS campaign_session_id,
               COALESCE(status, '') AS status,
               COALESCE(error, '') AS error,
               COALESCE(message_preview, '') AS message_preview,
               attempt, scheduled_for
        FROM logs
        WHERE id > ?
        ORDER BY id ASC
        LIMIT ?
        "#,
    )
    .bind(last_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
