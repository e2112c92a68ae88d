//! Group operations.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::Group;

/// Insert or update a group discovered for an account.
///
/// Sync must never lose operator state: on conflict only the owning account
/// and the name are updated, and an empty incoming name preserves the stored
/// one. Enablement, risk score and last_sent_at are untouched.
pub async fn upsert_group(
    pool: &SqlitePool,
    account_id: &str,
    group_id: &str,
    name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO groups (id, account_id, name, enabled)
        VALUES (?, ?, ?, 0)
        ON CONFLICT(id) DO UPDATE SET
            account_id = excluded.account_id,
            name = COALESCE(NULLIF(excluded.name, ''), groups.name)
        "#,
    )
    .bind(group_id)
    .bind(account_id)
    .bind(name)
    .execute(pool)
    .await?;

    Ok(())
}

/// List groups, optionally scoped to one account, ordered by name.
pub async fn list_groups(pool: &SqlitePool, account_id: Option<&str>) -> Result<Vec<Group>> {
    let groups = match account_id {
        Some(account_id) => {
            sqlx::query_as::<_, Group>(
                r#"
                SELECT id, account_id, name, enabled, last_sent_at, risk_score, created_at
                FROM groups
                WHERE account_id = ?
                ORDER BY name
                "#,
            )
            .bind(account_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Group>(
                r#"
                SELECT id, account_id, name, enabled, last_sent_at, risk_score, created_at
                FROM groups
                ORDER BY name
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(groups)
}

/// Enable or disable a group for scheduled sends. Returns rows affected.
pub async fn toggle_group(pool: &SqlitePool, group_id: &str, enabled: bool) -> Result<u64> {
    let result = sqlx::query("UPDATE groups SET enabled = ? WHERE id = ?")
        .bind(enabled)
        .bind(group_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Stored name of a group, if known.
pub async fn group_name(pool: &SqlitePool, group_id: &str) -> Result<Option<String>> {
    let name = sqlx::query_scalar::<_, String>("SELECT name FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_optional(pool)
        .await?;
    Ok(name)
}

/// Count groups currently eligible for a scheduled send.
pub async fn count_eligible_groups(
    pool: &SqlitePool,
    account_id: &str,
    cooldown_hours: i64,
    risk_threshold: i64,
) -> Result<i64> {
    let modifier = format!("-{} hours", cooldown_hours);
    let n = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM groups
        WHERE account_id = ? AND enabled = 1
          AND (last_sent_at IS NULL OR last_sent_at < datetime('now', ?))
          AND risk_score < ?
        "#,
    )
    .bind(account_id)
    .bind(&modifier)
    .bind(risk_threshold)
    .fetch_one(pool)
    .await?;

    Ok(n)
}

/// Pick one eligible group uniformly at random, or None when the account has
/// no group that is enabled, off cooldown and under the risk threshold.
pub async fn pick_eligible_group(
    pool: &SqlitePool,
    account_id: &str,
    cooldown_hours: i64,
    risk_threshold: i64,
) -> Result<Option<String>> {
    let modifier = format!("-{} hours", cooldown_hours);
    let id = sqlx::query_scalar::<_, String>(
        r#"
        SELECT id
        FROM groups
        WHERE account_id = ? AND enabled = 1
          AND (last_sent_at IS NULL OR last_sent_at < datetime('now', ?))
          AND risk_score < ?
        ORDER BY RANDOM()
        LIMIT 1
        "#,
    )
    .bind(account_id)
    .bind(&modifier)
    .bind(risk_threshold)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Stamp a successful delivery, starting the group's cooldown.
pub async fn mark_sent(pool: &SqlitePool, group_id: &str) -> Result<()> {
    sqlx::query("UPDATE groups SET last_sent_at = datetime('now') WHERE id = ?")
        .bind(group_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Increment the group's risk score; auto-pause once it reaches the threshold.
pub async fn bump_risk_and_maybe_pause(
    pool: &SqlitePool,
    group_id: &str,
    risk_threshold: i64,
) -> Result<()> {
    sqlx::query("UPDATE groups SET risk_score = risk_score + 1 WHERE id = ?")
        .bind(group_id)
        .execute(pool)
        .await?;
    sqlx::query("UPDATE groups SET enabled = 0 WHERE id = ? AND risk_score >= ?")
        .bind(group_id)
        .bind(risk_threshold)
        .execute(pool)
        .await?;
    Ok(())
}
