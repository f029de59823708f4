use std::{env, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::info;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    blocklist::BlockedAppStore,
    db::Database,
    enforcement::Enforcer,
    platform::Clock,
    sensing::ForegroundDetector,
    settings::SettingsStore,
};

use super::{
    commands::{MonitorHandle, TOGGLE_TOKEN},
    force_stop::FORCE_STOP_HOLD,
    worker::MonitorWorker,
    Monitor, MonitorSnapshot,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(4);

const COMMAND_QUEUE_DEPTH: usize = 32;
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    pub force_stop_hold: Duration,
    pub toggle_token: String,
    /// Log every tick's sample and decision.
    pub verbose_ticks: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            force_stop_hold: FORCE_STOP_HOLD,
            toggle_token: TOGGLE_TOKEN.to_string(),
            verbose_ticks: false,
        }
    }
}

impl MonitorOptions {
    /// Defaults overridden by `TAPBLOK_POLL_MS` and `TAPBLOK_DEBUG`.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Some(ms) = env::var("TAPBLOK_POLL_MS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            options = options.with_poll_interval(Duration::from_millis(ms));
        }

        options.verbose_ticks = env::var("TAPBLOK_DEBUG")
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        options
    }

    /// Out-of-range intervals are clamped so a switch into a blocked app is
    /// always caught within a few seconds.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }

    pub fn with_force_stop_hold(mut self, hold: Duration) -> Self {
        self.force_stop_hold = hold;
        self
    }

    pub fn with_toggle_token(mut self, token: impl Into<String>) -> Self {
        self.toggle_token = token.into();
        self
    }
}

/// Everything the monitor task owns for its lifetime.
pub struct MonitorDeps {
    pub db: Database,
    pub blocklist: BlockedAppStore,
    pub settings: Arc<SettingsStore>,
    pub detector: ForegroundDetector,
    pub enforcer: Enforcer,
    pub clock: Arc<dyn Clock>,
}

pub struct MonitorController {
    handle: MonitorHandle,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorController {
    /// Spawns the monitor task. `snapshot_tx` must already hold the snapshot
    /// of `monitor` so readers created before the spawn see consistent state.
    pub fn spawn(
        deps: MonitorDeps,
        monitor: Monitor,
        session_id: Option<String>,
        options: MonitorOptions,
        snapshot_tx: watch::Sender<MonitorSnapshot>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let cancel_token = CancellationToken::new();

        let handle = MonitorHandle::new(
            command_tx,
            snapshot_tx.subscribe(),
            event_tx.clone(),
            options.force_stop_hold,
        );

        info!(
            "Starting monitor task (poll every {:?}, state {})",
            options.poll_interval,
            monitor.state().as_str()
        );

        let worker = MonitorWorker::new(deps, monitor, session_id, options, snapshot_tx, event_tx);
        let task = tokio::spawn(worker.run(command_rx, cancel_token.clone()));

        Self {
            handle,
            cancel_token,
            task: Some(task),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Stops the task and waits for it. The session itself is left as-is so
    /// it can be resumed on the next launch.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel_token.cancel();

        if let Some(task) = self.task.take() {
            task.await.context("monitor task failed to join")?;
        }
        Ok(())
    }
}

impl Drop for MonitorController {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
