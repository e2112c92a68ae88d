//! Anti-spam broadcast scheduler.
//!
//! A single background loop ticks every 30 seconds. Inside a safe window it
//! performs at most one send: shuffled enabled accounts are probed for one
//! that is paired, under its daily quota, and has an eligible group; the
//! winning (account, group) pair gets a random enabled template, then the
//! loop idles for a 45–120 s jitter before the tick ends. Outside the
//! windows, ticks are quiet no-ops (unless `SCHEDULER_ALWAYS_ON` is set)
//! that log when the next window opens.

pub mod config;
pub mod window;

pub use config::SchedulerConfig;

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use database::{account, group, log, Database};
use sender::{Sender, Zone};
use session::SessionManager;

const TICK_INTERVAL: Duration = Duration::from_secs(30);
const SEND_TIMEOUT: Duration = Duration::from_secs(90);

/// The periodic control loop driving scheduled sends.
pub struct Scheduler {
    db: Database,
    sessions: Arc<SessionManager>,
    sender: Arc<Sender>,
    config: SchedulerConfig,
    zone: Zone,
}

/// Handle to a started scheduler loop.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop at its next suspension point.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}

impl Scheduler {
    pub fn new(
        db: Database,
        sessions: Arc<SessionManager>,
        sender: Arc<Sender>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let zone = Zone::resolve(&config.tz_name);
        Arc::new(Self {
            db,
            sessions,
            sender,
            config,
            zone,
        })
    }

    /// Spawn the tick loop.
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        info!(
            tz = %self.zone.label(),
            now = %self.zone.now_local().format("%Y-%m-%d %H:%M:%S"),
            windows = ?self.config.windows,
            always_on = self.config.always_on,
            cooldown_hours = self.config.cooldown_hours,
            min_delay = self.config.min_delay_secs,
            max_delay = self.config.max_delay_secs,
            risk_threshold = self.config.risk_threshold,
            "scheduler started"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let scheduler = self.clone();
        let task = tokio::spawn(scheduler.run(stop_rx));
        SchedulerHandle { stop_tx, task }
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval_at(
            tokio::time::Instant::now() + TICK_INTERVAL,
            TICK_INTERVAL,
        );
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    // A dropped handle counts as a stop signal.
                    if changed.is_err() || *stop.borrow() {
                        info!("scheduler stopped");
                        return;
                    }
                }
                _ = tick.tick() => {
                    self.tick(&mut stop).await;
                }
            }
        }
    }

    async fn tick(&self, stop: &mut watch::Receiver<bool>) {
        let now = self.zone.now_local();
        let minute = now.hour() * 60 + now.minute();
        let in_window = window::in_window(minute, &self.config.windows);

        if !in_window {
            let (start, end, until_min) = window::next_window(minute, &self.config.windows);
            info!(
                now = %now.format("%Y-%m-%d %H:%M:%S"),
                next_window = %format!("{:02}:{:02}-{:02}:{:02}", start / 60, start % 60, end / 60, end % 60),
                wait = ?Duration::from_secs(u64::from(until_min) * 60),
                always_on = self.config.always_on,
                "tick outside safe window"
            );
            if !self.config.always_on {
                return;
            }
        } else {
            debug!(now = %now.format("%Y-%m-%d %H:%M:%S"), "tick inside safe window");
        }

        if let Err(err) = self.process_one_send(stop).await {
            warn!(error = %err, "tick processing error");
        }
    }

    /// One tick's worth of work: at most one (account, group) send.
    async fn process_one_send(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> database::Result<()> {
        let mut accounts = account::list_enabled_accounts(self.db.pool()).await?;
        debug!(enabled_accounts = accounts.len(), "tick: probing accounts");
        if accounts.is_empty() {
            return Ok(());
        }

        {
            let mut rng = rand::thread_rng();
            accounts.shuffle(&mut rng);
        }

        for (account_id, daily_limit) in accounts {
            if let Err(err) = self.sessions.connect_if_paired(&account_id).await {
                debug!(account = %account_id, error = %err, "skipping account");
                continue;
            }

            let sent_today = match log::count_sent_today(self.db.pool(), &account_id).await {
                Ok(n) => n,
                Err(err) => {
                    warn!(account = %account_id, error = %err, "daily count query failed");
                    continue;
                }
            };
            let limit = if daily_limit <= 0 {
                account::DEFAULT_DAILY_LIMIT
            } else {
                daily_limit
            };
            if sent_today >= limit {
                debug!(account = %account_id, sent_today, limit, "daily quota reached");
                continue;
            }

            if let Ok(eligible) = group::count_eligible_groups(
                self.db.pool(),
                &account_id,
                self.config.cooldown_hours,
                self.config.risk_threshold,
            )
            .await
            {
                debug!(account = %account_id, eligible, "eligible groups");
            }

            let Some(group_id) = group::pick_eligible_group(
                self.db.pool(),
                &account_id,
                self.config.cooldown_hours,
                self.config.risk_threshold,
            )
            .await?
            else {
                debug!(account = %account_id, "no eligible group");
                continue;
            };

            info!(account = %account_id, group = %group_id, "sending with random template");
            let outcome = tokio::time::timeout(
                SEND_TIMEOUT,
                self.sender.send_random_template(&account_id, &group_id),
            )
            .await;
            match outcome {
                Ok(Ok(())) => {
                    info!(account = %account_id, group = %group_id, "send succeeded")
                }
                Ok(Err(err)) => {
                    // The sender has already risk-bumped and possibly paused
                    // the group.
                    warn!(account = %account_id, group = %group_id, error = %err, "send failed")
                }
                Err(_) => {
                    warn!(account = %account_id, group = %group_id, "send timed out")
                }
            }

            // Natural pause before anything else happens, success or not.
            self.sleep_jitter(stop).await;
            return Ok(());
        }

        Ok(())
    }

    async fn sleep_jitter(&self, stop: &mut watch::Receiver<bool>) {
        let (min, max) = if self.config.max_delay_secs < self.config.min_delay_secs {
            (self.config.max_delay_secs, self.config.min_delay_secs)
        } else {
            (self.config.min_delay_secs, self.config.max_delay_secs)
        };
        let wait = {
            let mut rng = rand::thread_rng();
            Duration::from_secs(rng.gen_range(min..=max))
        };
        debug!(wait = ?wait, "post-send jitter");
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = stop.changed() => {}
        }
    }
}
