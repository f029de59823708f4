//! Foreground app sampling.
//!
//! Wraps the platform's usage-tracking source and fails soft: a missing grant
//! or a failing query yields `None` so the monitor degrades to no enforcement
//! instead of erroring.

use std::sync::Arc;

use crate::{models::AppId, platform::ForegroundSource};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub struct ForegroundDetector {
    source: Arc<dyn ForegroundSource>,
    last_observed: Option<AppId>,
}

impl ForegroundDetector {
    pub fn new(source: Arc<dyn ForegroundSource>) -> Self {
        Self {
            source,
            last_observed: None,
        }
    }

    pub fn has_access(&self) -> bool {
        self.source.has_usage_access()
    }

    /// The most recently observed foreground app, or `None` when unknown.
    ///
    /// The source only reports changes, so a quiet poll keeps the previous
    /// observation. System surfaces report an empty id and count as no app.
    pub fn sample(&mut self) -> Option<AppId> {
        if !self.source.has_usage_access() {
            if self.last_observed.take().is_some() {
                log_warn!("Usage access revoked; foreground app unknown");
            }
            return None;
        }

        match self.source.foreground_app() {
            Ok(Some(app)) if app.is_empty() => {
                log_debug!("System surface in foreground");
                self.last_observed = None;
                None
            }
            Ok(Some(app)) => {
                if self.last_observed.as_ref() != Some(&app) {
                    log_debug!("Foreground changed to {}", app);
                }
                self.last_observed = Some(app.clone());
                Some(app)
            }
            Ok(None) => self.last_observed.clone(),
            Err(err) => {
                log_warn!("Foreground query failed: {err:#}");
                self.last_observed = None;
                None
            }
        }
    }

    /// Forget the last observation, e.g. when a new session starts.
    pub fn reset(&mut self) {
        self.last_observed = None;
    }
}
