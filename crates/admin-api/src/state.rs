//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::Arc;

use autojoin::AutoJoiner;
use database::Database;
use sender::Sender;
use session::SessionManager;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: Arc<SessionManager>,
    pub sender: Arc<Sender>,
    pub joiner: Arc<AutoJoiner>,
    pub uploads_dir: PathBuf,
}
