//! Auto-join settings, audit logs, and manual joins.

use autojoin::detector;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use database::autojoin as join_store;
use database::{account, AutoJoinSettings};

use crate::error::{AdminError, Result};
use crate::state::AppState;

async fn require_account(state: &AppState, id: &str) -> Result<()> {
    if account::account_exists(state.db.pool(), id).await? {
        Ok(())
    } else {
        Err(AdminError::NotFound("account"))
    }
}

pub async fn get_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AutoJoinSettings>> {
    require_account(&state, &id).await?;
    let settings = join_store::get_settings(state.db.pool(), &id).await?;
    Ok(Json(settings))
}

#[derive(Deserialize)]
pub struct SettingsReq {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,
    #[serde(default = "default_preview")]
    pub preview_before_join: bool,
    #[serde(default)]
    pub whitelist_contacts: Vec<String>,
    #[serde(default)]
    pub blacklist_keywords: Vec<String>,
}

fn default_daily_limit() -> i64 {
    join_store::DEFAULT_JOIN_LIMIT
}

fn default_preview() -> bool {
    true
}

pub async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SettingsReq>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;

    let settings = AutoJoinSettings {
        enabled: req.enabled,
        daily_limit: req.daily_limit,
        preview_before_join: req.preview_before_join,
        whitelist_contacts: req.whitelist_contacts,
        blacklist_keywords: req.blacklist_keywords,
    };
    join_store::upsert_settings(state.db.pool(), &id, &settings).await?;

    Ok(Json(serde_json::json!({ "updated": true })))
}

#[derive(Deserialize)]
pub struct ToggleReq {
    #[serde(default)]
    pub enabled: bool,
}

pub async fn toggle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleReq>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;
    join_store::set_enabled(state.db.pool(), &id, req.enabled).await?;

    let status = if req.enabled { "enabled" } else { "disabled" };
    Ok(Json(serde_json::json!({ "updated": true, "status": status })))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>> {
    require_account(&state, &id).await?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let status = query.status.as_deref().filter(|s| !s.is_empty());
    let logs = join_store::list_join_logs(state.db.pool(), &id, limit, status).await?;
    let stats = join_store::join_stats(state.db.pool(), &id).await?;

    Ok(Json(serde_json::json!({ "logs": logs, "stats": stats })))
}

#[derive(Deserialize)]
pub struct ManualJoinReq {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub invite_code: String,
    #[serde(default)]
    pub invite_link: String,
}

/// Operator-initiated join. Runs the full auto-join pipeline (filters
/// included) in the background; the audit log carries the outcome.
pub async fn manual(
    State(state): State<AppState>,
    Json(req): Json<ManualJoinReq>,
) -> Result<Json<serde_json::Value>> {
    if req.account_id.is_empty() {
        return Err(AdminError::BadRequest("account_id required".into()));
    }

    let mut invite_code = req.invite_code;
    if invite_code.is_empty() && !req.invite_link.is_empty() {
        invite_code = detector::extract_invite_codes(&req.invite_link)
            .into_iter()
            .next()
            .unwrap_or_else(|| {
                // Fall back to everything after the last slash.
                req.invite_link
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            });
    }
    if invite_code.is_empty() {
        return Err(AdminError::BadRequest(
            "invite_code or invite_link required".into(),
        ));
    }

    require_account(&state, &req.account_id).await?;

    let joiner = state.joiner.clone();
    let account_id = req.account_id.clone();
    tokio::spawn(async move {
        joiner
            .process_invite_code(&account_id, &invite_code, "manual", "manual")
            .await;
    });

    Ok(Json(serde_json::json!({
        "status": "processing",
        "message": "join request submitted; check the auto-join logs for the outcome",
    })))
}
