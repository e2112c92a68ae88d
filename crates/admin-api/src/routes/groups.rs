//! Group routes.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use database::{group, Group};

use crate::error::{AdminError, Result};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListGroupsQuery {
    pub account_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Vec<Group>>> {
    let groups = group::list_groups(state.db.pool(), query.account_id.as_deref()).await?;
    Ok(Json(groups))
}

#[derive(Deserialize)]
pub struct ToggleGroupReq {
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub enabled: bool,
}

pub async fn toggle(
    State(state): State<AppState>,
    Json(req): Json<ToggleGroupReq>,
) -> Result<Json<serde_json::Value>> {
    if req.group_id.is_empty() {
        return Err(AdminError::BadRequest("group_id required".into()));
    }
    let updated = group::toggle_group(state.db.pool(), &req.group_id, req.enabled).await?;
    if updated == 0 {
        return Err(AdminError::NotFound("group"));
    }
    Ok(Json(serde_json::json!({ "updated": updated })))
}
