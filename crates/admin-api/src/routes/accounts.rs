//! Account and pairing routes.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use database::models::CachedParticipant;
use database::{account, Account, AccountStatus};

use crate::error::{AdminError, Result};
use crate::state::AppState;

/// Caller-side bound for pairing and participant lookups.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(90);

async fn require_account(state: &AppState, id: &str) -> Result<()> {
    if account::account_exists(state.db.pool(), id).await? {
        Ok(())
    } else {
        Err(AdminError::NotFound("account"))
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Account>>> {
    let accounts = account::list_accounts(state.db.pool()).await?;
    Ok(Json(accounts))
}

#[derive(Deserialize)]
pub struct CreateAccountReq {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub msisdn: String,
    #[serde(default)]
    pub daily_limit: i64,
    pub enabled: Option<bool>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountReq>,
) -> Result<impl IntoResponse> {
    if req.label.is_empty() {
        return Err(AdminError::BadRequest("label required".into()));
    }
    let enabled = req.enabled.unwrap_or(true);
    let id = account::create_account(
        state.db.pool(),
        &req.label,
        &req.msisdn,
        enabled,
        req.daily_limit,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

#[derive(Deserialize)]
pub struct UpdateAccountReq {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub msisdn: String,
    #[serde(default)]
    pub daily_limit: i64,
    pub enabled: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAccountReq>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;
    let enabled = req.enabled.unwrap_or(true);
    account::update_account(
        state.db.pool(),
        &id,
        &req.label,
        &req.msisdn,
        enabled,
        req.daily_limit,
    )
    .await?;
    Ok(Json(serde_json::json!({ "updated": 1 })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;

    // Best effort: end the device session and forget the cached handle so no
    // session lingers for the deleted account.
    if let Err(err) = state.sessions.logout(&id).await {
        tracing::warn!(account = %id, error = %err, "pre-delete logout failed");
    }
    state.sessions.drop_account(&id).await;

    account::delete_account(state.db.pool(), &id).await?;
    Ok(Json(serde_json::json!({ "deleted": 1 })))
}

pub async fn pair_qr(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    require_account(&state, &id).await?;

    let png = tokio::time::timeout(OPERATION_TIMEOUT, state.sessions.start_pairing(&id))
        .await
        .map_err(|_| AdminError::BadRequest("pairing timed out waiting for QR code".into()))??;

    account::update_account_status(state.db.pool(), &id, AccountStatus::Pairing, "", None).await?;

    // Expired QR codes must never come from a cache.
    let headers = [
        (header::CONTENT_TYPE, "image/png"),
        (
            header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, max-age=0",
        ),
        (header::PRAGMA, "no-cache"),
        (header::EXPIRES, "0"),
    ];
    Ok((headers, png))
}

#[derive(Deserialize)]
pub struct PairByNumberReq {
    #[serde(default)]
    pub msisdn: String,
}

pub async fn pair_number(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PairByNumberReq>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;
    if req.msisdn.is_empty() {
        return Err(AdminError::BadRequest("msisdn required".into()));
    }

    let code = tokio::time::timeout(
        OPERATION_TIMEOUT,
        state.sessions.request_pairing_code(&id, &req.msisdn),
    )
    .await
    .map_err(|_| AdminError::BadRequest("pairing code request timed out".into()))??;

    if code.is_empty() {
        return Err(AdminError::BadRequest("empty pairing code".into()));
    }
    Ok(Json(serde_json::json!({ "code": code })))
}

pub async fn connect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;
    state.sessions.connect_if_paired(&id).await?;
    account::update_account_status(state.db.pool(), &id, AccountStatus::Online, "", None).await?;
    Ok(Json(serde_json::json!({ "status": "online" })))
}

pub async fn logout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;
    state.sessions.logout(&id).await?;
    state.sessions.drop_account(&id).await;
    Ok(Json(serde_json::json!({ "status": "logged_out" })))
}

pub async fn refresh_groups(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;
    let refreshed = state.sessions.fetch_and_sync_groups(&id).await?;
    info!(account = %id, refreshed, "groups refreshed");
    Ok(Json(serde_json::json!({ "refreshed": refreshed })))
}

pub async fn participants(
    State(state): State<AppState>,
    Path((id, gid)): Path<(String, String)>,
) -> Result<Json<Vec<CachedParticipant>>> {
    require_account(&state, &id).await?;
    let members = tokio::time::timeout(
        OPERATION_TIMEOUT,
        state.sessions.get_group_participants(&id, &gid),
    )
    .await
    .map_err(|_| AdminError::BadRequest("participant lookup timed out".into()))??;
    Ok(Json(members))
}

pub async fn participants_csv(
    State(state): State<AppState>,
    Path((id, gid)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    require_account(&state, &id).await?;
    let members = tokio::time::timeout(
        OPERATION_TIMEOUT,
        state.sessions.get_group_participants(&id, &gid),
    )
    .await
    .map_err(|_| AdminError::BadRequest("participant lookup timed out".into()))??;

    let mut csv = String::from("number,jid,is_admin,is_superadmin\n");
    for member in &members {
        csv.push_str(&format!(
            "{},{},{},{}\n",
            member.number, member.jid, member.is_admin, member.is_superadmin
        ));
    }

    let headers = [
        (header::CONTENT_TYPE, "text/csv"),
        (header::CACHE_CONTROL, "no-cache"),
        (
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"participants.csv\"",
        ),
    ];
    Ok((headers, csv))
}
