//! Error taxonomy for the monitoring engine.
//!
//! Every failure here is local and recoverable. Commands that are rejected
//! leave the session state untouched.

use thiserror::Error;

use crate::platform::Capability;

#[derive(Error, Debug)]
pub enum MonitorError {
    /// A platform grant (usage access or overlay drawing) is missing.
    #[error("{0} permission is not granted")]
    CapabilityUnavailable(Capability),

    /// Attempted change of a setting that is frozen while a session is active.
    #[error("Stop monitoring to change {0}")]
    ConfigLocked(&'static str),

    /// Value outside the enumerated options for a setting.
    #[error("{value} is not a valid option for {field}")]
    InvalidOption { field: &'static str, value: u32 },

    /// External toggle token did not match.
    #[error("Incorrect toggle code")]
    RejectedToggle,

    #[error("Code control is disabled")]
    CodeControlDisabled,

    #[error("Breaks are disabled")]
    BreaksDisabled,

    #[error("Monitoring is already active")]
    AlreadyActive,

    #[error("Monitoring is not running")]
    NotRunning,

    #[error("App identifier must not be empty")]
    EmptyAppId,

    /// The monitor task has shut down and no longer accepts commands.
    #[error("Monitor task is not running")]
    EngineUnavailable,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
