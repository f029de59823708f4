//! Session data models.
//!
//! `SessionState` is the runtime status of the monitoring engine; exactly one
//! exists per process and it is persisted together with the attempt counter.
//! `SessionRecord` is the history row written for every started session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(
    tag = "status",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum SessionState {
    #[default]
    Stopped,
    Running {
        started_at: DateTime<Utc>,
        /// Fixed at start from the auto-stop setting; never recomputed.
        session_deadline: Option<DateTime<Utc>>,
    },
    OnBreak {
        started_at: DateTime<Utc>,
        session_deadline: Option<DateTime<Utc>>,
        resume_at: DateTime<Utc>,
    },
}

impl SessionState {
    /// True while a session is `Running` or `OnBreak`.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running { .. })
    }

    pub fn is_on_break(&self) -> bool {
        matches!(self, SessionState::OnBreak { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Stopped => None,
            SessionState::Running { started_at, .. } | SessionState::OnBreak { started_at, .. } => {
                Some(*started_at)
            }
        }
    }

    pub fn session_deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Stopped => None,
            SessionState::Running {
                session_deadline, ..
            }
            | SessionState::OnBreak {
                session_deadline, ..
            } => *session_deadline,
        }
    }

    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::OnBreak { resume_at, .. } => Some(*resume_at),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Stopped => "Stopped",
            SessionState::Running { .. } => "Running",
            SessionState::OnBreak { .. } => "OnBreak",
        }
    }
}

/// Why a session left the active states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Manual,
    ForceStopped,
    Expired,
    ExternalCode,
    CapabilityLost,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Manual => "Manual",
            EndReason::ForceStopped => "ForceStopped",
            EndReason::Expired => "Expired",
            EndReason::ExternalCode => "ExternalCode",
            EndReason::CapabilityLost => "CapabilityLost",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub session_deadline: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub attempt_count: u64,
    pub breaks_taken: u32,
}

impl SessionRecord {
    pub fn begin(
        id: String,
        started_at: DateTime<Utc>,
        session_deadline: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            started_at,
            session_deadline,
            ended_at: None,
            end_reason: None,
            attempt_count: 0,
            breaks_taken: 0,
        }
    }
}
