//! Durable session tunables.
//!
//! Stored as JSON next to the database. Duration fields only accept the
//! enumerated options and are frozen while a session is active; the
//! code-control switch may change at any time.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::{error::MonitorError, monitor::SessionGate};

/// Allowed auto-stop durations in minutes; 0 means the session never expires.
pub const AUTO_STOP_OPTIONS: [u32; 4] = [0, 15, 30, 60];

/// Allowed break durations in minutes; 0 disables breaks.
pub const BREAK_OPTIONS: [u32; 4] = [0, 5, 15, 30];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub auto_stop_minutes: u32,
    pub break_minutes: u32,
    pub code_control_enabled: bool,
}

impl SessionConfig {
    pub fn breaks_enabled(&self) -> bool {
        self.break_minutes > 0
    }

    /// Replaces persisted values that are no longer valid options.
    fn sanitized(mut self) -> Self {
        if !AUTO_STOP_OPTIONS.contains(&self.auto_stop_minutes) {
            warn!(
                "Persisted auto-stop of {} minutes is not an option; resetting",
                self.auto_stop_minutes
            );
            self.auto_stop_minutes = 0;
        }
        if !BREAK_OPTIONS.contains(&self.break_minutes) {
            warn!(
                "Persisted break of {} minutes is not an option; resetting",
                self.break_minutes
            );
            self.break_minutes = 0;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigUpdate {
    AutoStopMinutes(u32),
    BreakMinutes(u32),
    CodeControlEnabled(bool),
}

impl ConfigUpdate {
    fn validate(&self) -> Result<(), MonitorError> {
        match *self {
            ConfigUpdate::AutoStopMinutes(value) if !AUTO_STOP_OPTIONS.contains(&value) => {
                Err(MonitorError::InvalidOption {
                    field: "auto-stop duration",
                    value,
                })
            }
            ConfigUpdate::BreakMinutes(value) if !BREAK_OPTIONS.contains(&value) => {
                Err(MonitorError::InvalidOption {
                    field: "break duration",
                    value,
                })
            }
            _ => Ok(()),
        }
    }

    fn locked_label(&self) -> Option<&'static str> {
        match self {
            ConfigUpdate::AutoStopMinutes(_) => Some("session duration"),
            ConfigUpdate::BreakMinutes(_) => Some("break settings"),
            ConfigUpdate::CodeControlEnabled(_) => None,
        }
    }

    fn apply(&self, config: &mut SessionConfig) {
        match *self {
            ConfigUpdate::AutoStopMinutes(value) => config.auto_stop_minutes = value,
            ConfigUpdate::BreakMinutes(value) => config.break_minutes = value,
            ConfigUpdate::CodeControlEnabled(value) => config.code_control_enabled = value,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SessionConfig>,
    gate: SessionGate,
}

impl SettingsStore {
    pub fn new(path: PathBuf, gate: SessionGate) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<SessionConfig>(&contents)
                .unwrap_or_else(|err| {
                    warn!("Ignoring unreadable settings at {}: {err}", path.display());
                    SessionConfig::default()
                })
                .sanitized()
        } else {
            SessionConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            gate,
        })
    }

    pub fn load(&self) -> SessionConfig {
        *self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validates, checks the session lock, then persists before returning.
    pub fn set(&self, update: ConfigUpdate) -> Result<SessionConfig, MonitorError> {
        update.validate()?;

        if let Some(label) = update.locked_label() {
            if self.gate.is_locked() {
                return Err(MonitorError::ConfigLocked(label));
            }
        }

        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = *guard;
        update.apply(&mut next);
        self.persist(&next)?;
        *guard = next;

        info!("Settings updated: {update:?}");
        Ok(next)
    }

    fn persist(&self, data: &SessionConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("Failed to write settings to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace settings at {}", self.path.display()))
    }
}
