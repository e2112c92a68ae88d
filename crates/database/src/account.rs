//! Account operations.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{Account, AccountStatus};

/// Default per-account daily send quota.
pub const DEFAULT_DAILY_LIMIT: i64 = 100;
/// Upper bound on the per-account daily send quota.
pub const MAX_DAILY_LIMIT: i64 = 1000;

fn clamp_daily_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_DAILY_LIMIT
    } else {
        limit.min(MAX_DAILY_LIMIT)
    }
}

/// Create a new account and return its generated id.
///
/// A non-positive `daily_limit` falls back to the default; anything above the
/// hard cap is clamped down to it.
pub async fn create_account(
    pool: &SqlitePool,
    label: &str,
    msisdn: &str,
    enabled: bool,
    daily_limit: i64,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO accounts (id, label, msisdn, enabled, daily_limit, status, last_error)
        VALUES (?, ?, ?, ?, ?, 'inactive', '')
        "#,
    )
    .bind(&id)
    .bind(label)
    .bind(msisdn)
    .bind(enabled)
    .bind(clamp_daily_limit(daily_limit))
    .execute(pool)
    .await?;

    Ok(id)
}

/// Get an account by id.
pub async fn get_account(pool: &SqlitePool, id: &str) -> Result<Account> {
    sqlx::query_as::<_, Account>(
        r#"
        SELECT id, label, msisdn, enabled, daily_limit, status, last_error, created_at, updated_at
        FROM accounts
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Account",
        id: id.to_string(),
    })
}

/// List all accounts, newest first.
pub async fn list_accounts(pool: &SqlitePool) -> Result<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, label, msisdn, enabled, daily_limit, status, last_error, created_at, updated_at
        FROM accounts
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(accounts)
}

/// List (id, daily_limit) for all enabled accounts.
pub async fn list_enabled_accounts(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT id, daily_limit FROM accounts WHERE enabled = 1",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn account_exists(pool: &SqlitePool, id: &str) -> Result<bool> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(n > 0)
}

/// Update label, msisdn, enabled flag and daily limit.
pub async fn update_account(
    pool: &SqlitePool,
    id: &str,
    label: &str,
    msisdn: &str,
    enabled: bool,
    daily_limit: i64,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET label = ?, msisdn = ?, enabled = ?, daily_limit = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(label)
    .bind(msisdn)
    .bind(enabled)
    .bind(clamp_daily_limit(daily_limit))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Account",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Delete an account. Groups, auto-join settings and auto-join logs cascade.
pub async fn delete_account(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM accounts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a status transition.
///
/// When `msisdn` is supplied and non-empty it overwrites the stored number;
/// otherwise the stored number is preserved.
pub async fn update_account_status(
    pool: &SqlitePool,
    id: &str,
    status: AccountStatus,
    last_error: &str,
    msisdn: Option<&str>,
) -> Result<()> {
    match msisdn {
        Some(number) => {
            sqlx::query(
                r#"
                UPDATE accounts
                SET status = ?, last_error = ?,
                    msisdn = COALESCE(NULLIF(?, ''), msisdn),
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(status.as_str())
            .bind(last_error)
            .bind(number)
            .bind(id)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                UPDATE accounts
                SET status = ?, last_error = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(status.as_str())
            .bind(last_error)
            .bind(id)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}
