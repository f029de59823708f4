//! Control surface: the only way to mutate the monitor from outside its task.
//!
//! Every call becomes a message on the monitor's queue, so transitions are
//! applied strictly in arrival order by a single writer.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::{
    error::{MonitorError, MonitorResult},
    models::EndReason,
};

use super::{ForceStopHold, MonitorEvent, MonitorSnapshot};

/// Token an external code (printed QR code or written tag) must carry to
/// toggle monitoring.
pub const TOGGLE_TOKEN: &str = "tapblok://toggle-monitoring";

type Reply<T> = oneshot::Sender<MonitorResult<T>>;

pub(crate) enum Command {
    Start { reply: Reply<MonitorSnapshot> },
    Stop { reason: EndReason, reply: Reply<MonitorSnapshot> },
    RequestBreak { reply: Reply<MonitorSnapshot> },
    ToggleCode { token: String, reply: Reply<ToggleOutcome> },
    Refresh { reply: Reply<MonitorSnapshot> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    /// Empty or cancelled scan; nothing happened.
    Ignored,
    Started(MonitorSnapshot),
    Stopped(MonitorSnapshot),
}

#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<MonitorSnapshot>,
    events: broadcast::Sender<MonitorEvent>,
    force_stop_hold: Duration,
}

impl MonitorHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshot: watch::Receiver<MonitorSnapshot>,
        events: broadcast::Sender<MonitorEvent>,
        force_stop_hold: Duration,
    ) -> Self {
        Self {
            commands,
            snapshot,
            events,
            force_stop_hold,
        }
    }

    pub async fn start(&self) -> MonitorResult<MonitorSnapshot> {
        self.request(|reply| Command::Start { reply }).await
    }

    pub async fn stop(&self) -> MonitorResult<MonitorSnapshot> {
        self.stop_with(EndReason::Manual).await
    }

    pub(crate) async fn stop_with(&self, reason: EndReason) -> MonitorResult<MonitorSnapshot> {
        self.request(|reply| Command::Stop { reason, reply }).await
    }

    /// Starts the hold-to-stop gesture. The session stops only if the hold is
    /// not released before the full duration elapses.
    pub fn begin_force_stop(&self) -> ForceStopHold {
        ForceStopHold::begin(self.clone(), self.force_stop_hold)
    }

    pub async fn request_break(&self) -> MonitorResult<MonitorSnapshot> {
        self.request(|reply| Command::RequestBreak { reply }).await
    }

    /// Toggle monitoring with a scanned code. Empty input (a cancelled scan)
    /// is ignored without touching the queue; anything else must match the
    /// configured token exactly.
    pub async fn toggle_external_code(&self, token: &str) -> MonitorResult<ToggleOutcome> {
        if token.is_empty() {
            return Ok(ToggleOutcome::Ignored);
        }
        let token = token.to_string();
        self.request(|reply| Command::ToggleCode { token, reply })
            .await
    }

    /// Runs an evaluation tick now and returns the resulting snapshot.
    pub async fn refresh(&self) -> MonitorResult<MonitorSnapshot> {
        self.request(|reply| Command::Refresh { reply }).await
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> MonitorResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| MonitorError::EngineUnavailable)?;
        reply_rx
            .await
            .map_err(|_| MonitorError::EngineUnavailable)?
    }
}
