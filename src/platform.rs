//! Contracts for the platform collaborators the engine consumes.
//!
//! The host application implements these over the OS APIs (usage stats,
//! overlay windows). The engine never touches the platform directly.

use std::{fmt, sync::Mutex};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AppId;

/// A system-level grant the engine depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    UsageAccess,
    Overlay,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::UsageAccess => f.write_str("Usage access"),
            Capability::Overlay => f.write_str("Overlay"),
        }
    }
}

/// Foreground-focus capability.
pub trait ForegroundSource: Send + Sync {
    /// Whether the usage-tracking grant is currently held.
    fn has_usage_access(&self) -> bool;

    /// The app that most recently moved to the foreground since the last
    /// call, or `None` when nothing changed.
    fn foreground_app(&self) -> Result<Option<AppId>>;
}

/// Overlay-draw capability.
pub trait OverlaySurface: Send + Sync {
    fn can_draw_overlays(&self) -> bool;

    /// Raise the opaque, input-consuming surface. Idempotent.
    fn show(&self);

    /// Remove the surface. Idempotent.
    fn hide(&self);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used for simulations and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, value: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = value;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
