//! Process entry point: wires the store, session manager, auto-join engine,
//! sender and scheduler together, then serves the HTTP control plane.

mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use tracing::info;

use autojoin::AutoJoiner;
use chat_core::ChatPlatform;
use database::Database;
use scheduler::{Scheduler, SchedulerConfig};
use sender::{Sender, Zone};
use session::SessionManager;
use wa_bridge::{BridgeConfig, BridgePlatform};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    // Fatal on failure: without the store nothing else can run.
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let platform: Arc<dyn ChatPlatform> =
        Arc::new(BridgePlatform::new(BridgeConfig::new(&config.bridge_url)));
    let sessions = SessionManager::new(db.clone(), platform, config.database_url.clone());

    let joiner = AutoJoiner::new(db.clone(), sessions.clone());
    sessions.add_message_handler(joiner.clone());
    info!("auto-join handler registered");

    let scheduler_config = SchedulerConfig::from_env();
    let zone = Zone::resolve(&scheduler_config.tz_name);
    let sender = Arc::new(Sender::new(
        db.clone(),
        sessions.clone(),
        config.uploads_dir.clone(),
        zone,
        scheduler_config.risk_threshold,
    )?);

    // Anti-spam scheduler runs for the whole process lifetime.
    let scheduler = Scheduler::new(db.clone(), sessions.clone(), sender.clone(), scheduler_config);
    let _scheduler_handle = scheduler.start();

    let state = AppState {
        db,
        sessions,
        sender,
        joiner,
        uploads_dir: config.uploads_dir.clone(),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "HTTP listening");
    axum::serve(listener, app).await?;

    Ok(())
}
