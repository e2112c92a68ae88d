//! Template routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use database::template::{self, NewTemplate};
use database::Template;

use crate::error::{AdminError, Result};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TemplateReq {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text_only: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub images_caption: String,
    #[serde(default)]
    pub video_urls: Vec<String>,
    #[serde(default)]
    pub videos_caption: String,
    #[serde(default)]
    pub audio_urls: Vec<String>,
    #[serde(default)]
    pub sticker_urls: Vec<String>,
    #[serde(default)]
    pub doc_urls: Vec<String>,
    #[serde(default)]
    pub docs_caption: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TemplateReq {
    fn into_new_template(self) -> NewTemplate {
        NewTemplate {
            name: self.name,
            text_only: self.text_only,
            image_urls: self.image_urls,
            images_caption: self.images_caption,
            video_urls: self.video_urls,
            videos_caption: self.videos_caption,
            audio_urls: self.audio_urls,
            sticker_urls: self.sticker_urls,
            doc_urls: self.doc_urls,
            docs_caption: self.docs_caption,
            enabled: self.enabled,
        }
    }
}

/// Template as presented over the API: JSON columns parsed into arrays.
#[derive(Serialize)]
pub struct TemplateView {
    pub id: String,
    pub name: String,
    pub text_only: String,
    pub image_urls: Vec<String>,
    pub images_caption: String,
    pub video_urls: Vec<String>,
    pub videos_caption: String,
    pub audio_urls: Vec<String>,
    pub sticker_urls: Vec<String>,
    pub doc_urls: Vec<String>,
    pub docs_caption: String,
    pub enabled: bool,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<Template> for TemplateView {
    fn from(t: Template) -> Self {
        Self {
            image_urls: t.image_urls(),
            video_urls: t.video_urls(),
            audio_urls: t.audio_urls(),
            sticker_urls: t.sticker_urls(),
            doc_urls: t.doc_urls(),
            id: t.id,
            name: t.name,
            text_only: t.text_only,
            images_caption: t.images_caption,
            videos_caption: t.videos_caption,
            docs_caption: t.docs_caption,
            enabled: t.enabled,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<TemplateView>>> {
    let templates = template::list_templates(state.db.pool()).await?;
    Ok(Json(templates.into_iter().map(TemplateView::from).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<TemplateReq>,
) -> Result<impl IntoResponse> {
    if req.name.is_empty() {
        return Err(AdminError::BadRequest("name required".into()));
    }
    let id = template::create_template(state.db.pool(), &req.into_new_template()).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TemplateReq>,
) -> Result<Json<serde_json::Value>> {
    let updated = template::update_template(state.db.pool(), &id, &req.into_new_template()).await?;
    if updated == 0 {
        return Err(AdminError::NotFound("template"));
    }
    Ok(Json(serde_json::json!({ "updated": 1 })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let deleted = template::delete_template(state.db.pool(), &id).await?;
    if deleted == 0 {
        return Err(AdminError::NotFound("template"));
    }
    Ok(Json(serde_json::json!({ "deleted": 1 })))
}

#[derive(Deserialize)]
pub struct ToggleTemplateReq {
    #[serde(default)]
    pub enabled: bool,
}

pub async fn toggle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleTemplateReq>,
) -> Result<Json<serde_json::Value>> {
    let updated = template::toggle_template(state.db.pool(), &id, req.enabled).await?;
    if updated == 0 {
        return Err(AdminError::NotFound("template"));
    }
    Ok(Json(serde_json::json!({ "updated": 1 })))
}
