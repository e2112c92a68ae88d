//! Stats and the live log stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};

use database::log;

use crate::error::Result;
use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const BATCH_LIMIT: i64 = 100;

pub async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let (total, success, failed) = log::stats_today(state.db.pool()).await?;
    Ok(Json(serde_json::json!({
        "total": total,
        "success": success,
        "failed": failed,
    })))
}

/// Server-sent events: every two seconds, emit any log rows with id greater
/// than the last one this client has seen, oldest first. Query errors are
/// swallowed and retried at the next poll.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let events = stream::unfold((state.db.clone(), 0i64), |(db, last_id)| async move {
        tokio::time::sleep(POLL_INTERVAL).await;

        let rows = log::logs_after(db.pool(), last_id, BATCH_LIMIT)
            .await
            .unwrap_or_default();
        let next_id = rows.last().map(|row| row.id).unwrap_or(last_id);

        let batch: Vec<std::result::Result<Event, Infallible>> = rows
            .iter()
            .filter_map(|row| serde_json::to_string(row).ok())
            .map(|json| Ok(Event::default().data(json)))
            .collect();

        Some((stream::iter(batch), (db, next_id)))
    })
    .flatten();

    Sse::new(events).keep_alive(KeepAlive::default())
}
