//! Operator-initiated test sends.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use sender::MessageContent;

use crate::error::{AdminError, Result};
use crate::state::AppState;

const SEND_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Deserialize)]
pub struct SendTestReq {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub image_caption: String,
    #[serde(default)]
    pub video_urls: Vec<String>,
    #[serde(default)]
    pub video_caption: String,
    #[serde(default)]
    pub audio_urls: Vec<String>,
    #[serde(default)]
    pub sticker_urls: Vec<String>,
    #[serde(default)]
    pub doc_urls: Vec<String>,
    #[serde(default)]
    pub doc_caption: String,
}

/// Manual delivery through the same pipeline the scheduler uses. The
/// cooldown does not gate operator sends, but failures still bump risk.
pub async fn send_test(
    State(state): State<AppState>,
    Json(req): Json<SendTestReq>,
) -> Result<Json<serde_json::Value>> {
    if req.account_id.is_empty() || req.group_id.is_empty() {
        return Err(AdminError::BadRequest(
            "account_id and group_id required".into(),
        ));
    }

    let content = MessageContent {
        text_only: req.text,
        image_urls: req.image_urls,
        image_caption: req.image_caption,
        video_urls: req.video_urls,
        video_caption: req.video_caption,
        audio_urls: req.audio_urls,
        sticker_urls: req.sticker_urls,
        doc_urls: req.doc_urls,
        doc_caption: req.doc_caption,
    };

    tokio::time::timeout(
        SEND_TIMEOUT,
        state
            .sender
            .send_to_group(&req.account_id, &req.group_id, &content),
    )
    .await
    .map_err(|_| AdminError::BadRequest("send timed out".into()))??;

    Ok(Json(serde_json::json!({ "status": "sent" })))
}
