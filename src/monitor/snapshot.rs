//! Read-only view of the engine for the display layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::{models::SessionState, platform::Capability};

/// Atomic snapshot of state, counter and timers, published by the monitor
/// task after every command and every tick. Remaining times are derived here
/// so presentation code never does session arithmetic itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub state: SessionState,
    pub attempt_count: u64,
    pub session_deadline: Option<DateTime<Utc>>,
    pub resume_at: Option<DateTime<Utc>>,
    pub session_remaining_ms: Option<i64>,
    pub break_remaining_ms: Option<i64>,
    pub overlay_visible: bool,
    pub missing_capabilities: Vec<Capability>,
    pub captured_at: DateTime<Utc>,
}

impl MonitorSnapshot {
    pub fn needs_permission(&self) -> bool {
        !self.missing_capabilities.is_empty()
    }

    /// Whole minutes left before auto-stop, rounded down.
    pub fn session_remaining_minutes(&self) -> Option<i64> {
        self.session_remaining_ms.map(|ms| ms / 60_000)
    }
}

/// Answers "is a session active right now?" for stores whose writes are
/// frozen during a session.
#[derive(Debug, Clone)]
pub struct SessionGate {
    snapshot: watch::Receiver<MonitorSnapshot>,
}

impl SessionGate {
    pub fn new(snapshot: watch::Receiver<MonitorSnapshot>) -> Self {
        Self { snapshot }
    }

    /// A gate that never locks, for stores used without a monitor.
    pub fn unlocked() -> Self {
        let (_tx, rx) = watch::channel(MonitorSnapshot {
            state: SessionState::Stopped,
            attempt_count: 0,
            session_deadline: None,
            resume_at: None,
            session_remaining_ms: None,
            break_remaining_ms: None,
            overlay_visible: false,
            missing_capabilities: Vec::new(),
            captured_at: Utc::now(),
        });
        Self { snapshot: rx }
    }

    pub fn is_locked(&self) -> bool {
        self.snapshot.borrow().state.is_active()
    }
}
