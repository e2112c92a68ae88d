//! Route handlers for the control plane.

pub mod accounts;
pub mod autojoin;
pub mod groups;
pub mod logs;
pub mod send;
pub mod templates;
pub mod upload;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use self::autojoin as autojoin_api;
use crate::state::AppState;

/// Multipart upload cap.
const UPLOAD_LIMIT_BYTES: usize = 50 * 1024 * 1024;

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Accounts & pairing
        .route("/api/accounts", get(accounts::list).post(accounts::create))
        .route(
            "/api/accounts/{id}",
            put(accounts::update).delete(accounts::remove),
        )
        .route("/api/accounts/{id}/pair/qr", get(accounts::pair_qr))
        .route("/api/accounts/{id}/pair/number", post(accounts::pair_number))
        .route("/api/accounts/{id}/connect", post(accounts::connect))
        .route("/api/accounts/{id}/logout", post(accounts::logout))
        .route(
            "/api/accounts/{id}/groups/refresh",
            post(accounts::refresh_groups),
        )
        .route(
            "/api/accounts/{id}/groups/{gid}/participants",
            get(accounts::participants),
        )
        .route(
            "/api/accounts/{id}/groups/{gid}/participants.csv",
            get(accounts::participants_csv),
        )
        // Groups
        .route("/api/groups", get(groups::list))
        .route("/api/groups/toggle", post(groups::toggle))
        // Templates
        .route("/api/templates", get(templates::list).post(templates::create))
        .route(
            "/api/templates/{id}",
            put(templates::update).delete(templates::remove),
        )
        .route("/api/templates/{id}/toggle", post(templates::toggle))
        // Sends, stats, log stream
        .route("/api/send/test", post(send::send_test))
        .route("/api/stats", get(logs::stats))
        .route("/api/logs/stream", get(logs::stream))
        // Auto-join
        .route(
            "/api/accounts/{id}/autojoin/settings",
            get(autojoin_api::get_settings).put(autojoin_api::update_settings),
        )
        .route(
            "/api/accounts/{id}/autojoin/enable",
            post(autojoin_api::toggle),
        )
        .route("/api/accounts/{id}/autojoin/logs", get(autojoin_api::logs))
        .route("/api/autojoin/manual", post(autojoin_api::manual))
        // Uploads
        .route(
            "/api/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .nest_service("/uploads", ServeDir::new(&state.uploads_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}
