use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    models::{AppId, EndReason},
    platform::Capability,
};

use super::MonitorSnapshot;

/// Short user-facing messages the display layer shows as toasts or banners.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Notice {
    MonitoringStarted,
    MonitoringStopped { reason: EndReason },
    BreakStarted { resume_at: DateTime<Utc> },
    BreakEnded,
    IncorrectCode,
    NeedsPermission { capability: Capability },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::MonitoringStarted => "Monitoring started.".into(),
            Notice::MonitoringStopped {
                reason: EndReason::Expired,
            } => "Session time is up. Monitoring stopped.".into(),
            Notice::MonitoringStopped {
                reason: EndReason::CapabilityLost,
            } => "Monitoring stopped: a required permission was revoked.".into(),
            Notice::MonitoringStopped { .. } => "Monitoring stopped.".into(),
            Notice::BreakStarted { resume_at } => {
                format!("Break started. Blocking resumes at {}.", resume_at.format("%H:%M"))
            }
            Notice::BreakEnded => "Break over. Blocking resumed.".into(),
            Notice::IncorrectCode => "Incorrect code.".into(),
            Notice::NeedsPermission { capability } => {
                format!("{capability} permission is required for blocking.")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum MonitorEvent {
    /// Emitted after transitions and attempts, not on quiet ticks.
    StateChanged(MonitorSnapshot),
    AttemptRecorded { app_id: AppId, attempt_count: u64 },
    Notice(Notice),
}
