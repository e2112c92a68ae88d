//! Group participant cache: a TTL memoization over the platform's group-info
//! RPC, keyed by group id.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::CachedParticipant;

/// Replace the cached participant list for a group. Invalidate and reinsert
/// happen in one transaction so readers never see a partial set.
pub async fn cache_participants(
    pool: &SqlitePool,
    group_id: &str,
    participants: &[CachedParticipant],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM group_participants WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    for p in participants {
        sqlx::query(
            r#"
            INSERT INTO group_participants (group_id, jid, number, is_admin, is_superadmin)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(group_id)
        .bind(&p.jid)
        .bind(&p.number)
        .bind(p.is_admin)
        .bind(p.is_superadmin)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Fetch the cached participant list if one exists and is younger than
/// `max_age_minutes`. The bool is false on a miss or expiry.
pub async fn get_cached_participants(
    pool: &SqlitePool,
    group_id: &str,
    max_age_minutes: i64,
) -> Result<(Vec<CachedParticipant>, bool)> {
    let fresh = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM group_participants
        WHERE group_id = ? AND cached_at > datetime('now', '-' || ? || ' minutes')
        "#,
    )
    .bind(group_id)
    .bind(max_age_minutes)
    .fetch_one(pool)
    .await?;

    if fresh == 0 {
        return Ok((Vec::new(), false));
    }

    let rows = sqlx::query_as::<_, CachedParticipant>(
        r#"
        SELECT jid, number, is_admin, is_superadmin
        FROM group_participants
        WHERE group_id = ?
        ORDER BY number
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok((rows, true))
}

/// Drop the cached participant list for a group.
pub async fn invalidate_participants_cache(pool: &SqlitePool, group_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM group_participants WHERE group_id = ?")
        .bind(group_id)
        .execute(pool)
        .await?;
    Ok(())
}
