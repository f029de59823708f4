//! The monitoring session state machine.
//!
//! Pure and synchronous: every transition takes `now` explicitly and returns a
//! `Step` describing the side effects (overlay, persistence, notices) for the
//! controller to carry out. Time limits are evaluated against the clock on
//! every tick, so there are no timers to schedule or cancel.

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::MonitorError,
    models::{AppId, EndReason, SessionState},
    platform::Capability,
    settings::SessionConfig,
};

use super::MonitorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayAction {
    Show,
    Hide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    BreakStarted,
    BreakEnded,
    Stopped(EndReason),
}

/// Effects produced by one transition or tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub overlay: Option<OverlayAction>,
    /// Set when this step counted a new blocked-app attempt.
    pub attempt: Option<AppId>,
    pub transition: Option<Transition>,
}

impl Step {
    fn hide(transition: Transition) -> Self {
        Self {
            overlay: Some(OverlayAction::Hide),
            attempt: None,
            transition: Some(transition),
        }
    }

    /// Whether the persisted state/counter pair changed.
    pub fn is_durable_change(&self) -> bool {
        self.attempt.is_some() || self.transition.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Monitor {
    state: SessionState,
    attempt_count: u64,
    overlay_visible: bool,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted state. A block screen that was up stays up, so
    /// the app still in front is not counted again.
    pub fn restore(state: SessionState, attempt_count: u64, overlay_visible: bool) -> Self {
        Self {
            state,
            attempt_count,
            overlay_visible: overlay_visible && state.is_running(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempt_count
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn start(
        &mut self,
        now: DateTime<Utc>,
        config: &SessionConfig,
    ) -> Result<Step, MonitorError> {
        if self.state.is_active() {
            return Err(MonitorError::AlreadyActive);
        }

        let session_deadline = (config.auto_stop_minutes > 0)
            .then(|| now + Duration::minutes(i64::from(config.auto_stop_minutes)));

        self.state = SessionState::Running {
            started_at: now,
            session_deadline,
        };
        self.attempt_count = 0;
        self.overlay_visible = false;

        Ok(Step::hide(Transition::Started))
    }

    /// Ends the session from `Running` or `OnBreak`. The counter is kept for
    /// display until the next start.
    pub fn stop(&mut self, reason: EndReason) -> Result<Step, MonitorError> {
        if !self.state.is_active() {
            return Err(MonitorError::NotRunning);
        }
        Ok(self.end(reason))
    }

    pub fn request_break(
        &mut self,
        now: DateTime<Utc>,
        config: &SessionConfig,
    ) -> Result<Step, MonitorError> {
        let SessionState::Running {
            started_at,
            session_deadline,
        } = self.state
        else {
            return Err(MonitorError::NotRunning);
        };

        if !config.breaks_enabled() {
            return Err(MonitorError::BreaksDisabled);
        }

        self.state = SessionState::OnBreak {
            started_at,
            session_deadline,
            resume_at: now + Duration::minutes(i64::from(config.break_minutes)),
        };
        self.overlay_visible = false;

        Ok(Step::hide(Transition::BreakStarted))
    }

    /// One polling round. Deadlines are checked before the foreground app, and
    /// neither the detector nor the block-list is consulted unless the session
    /// is `Running` after that check.
    pub fn tick<S, B>(&mut self, now: DateTime<Utc>, sample: S, is_blocked: B) -> Step
    where
        S: FnOnce() -> Option<AppId>,
        B: Fn(&AppId) -> bool,
    {
        match self.state {
            SessionState::Stopped => Step::default(),
            SessionState::OnBreak {
                started_at,
                session_deadline,
                resume_at,
            } => {
                if deadline_passed(session_deadline, now) {
                    return self.end(EndReason::Expired);
                }
                if now < resume_at {
                    return Step::default();
                }

                self.state = SessionState::Running {
                    started_at,
                    session_deadline,
                };
                let mut step = self.evaluate(sample(), is_blocked);
                step.transition = Some(Transition::BreakEnded);
                step
            }
            SessionState::Running {
                session_deadline, ..
            } => {
                if deadline_passed(session_deadline, now) {
                    return self.end(EndReason::Expired);
                }
                self.evaluate(sample(), is_blocked)
            }
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>, missing: &[Capability]) -> MonitorSnapshot {
        let session_deadline = self.state.session_deadline();
        let resume_at = self.state.resume_at();

        MonitorSnapshot {
            state: self.state,
            attempt_count: self.attempt_count,
            session_deadline,
            resume_at,
            session_remaining_ms: session_deadline.map(|deadline| remaining_ms(deadline, now)),
            break_remaining_ms: resume_at.map(|resume| remaining_ms(resume, now)),
            overlay_visible: self.overlay_visible,
            missing_capabilities: missing.to_vec(),
            captured_at: now,
        }
    }

    fn end(&mut self, reason: EndReason) -> Step {
        self.state = SessionState::Stopped;
        self.overlay_visible = false;
        Step::hide(Transition::Stopped(reason))
    }

    /// Counts an attempt only on the transition into a blocked app, never
    /// while the overlay is already up.
    fn evaluate<B>(&mut self, sample: Option<AppId>, is_blocked: B) -> Step
    where
        B: Fn(&AppId) -> bool,
    {
        match sample.filter(|app| is_blocked(app)) {
            Some(app) if !self.overlay_visible => {
                self.overlay_visible = true;
                self.attempt_count = self.attempt_count.saturating_add(1);
                Step {
                    overlay: Some(OverlayAction::Show),
                    attempt: Some(app),
                    transition: None,
                }
            }
            Some(_) => Step::default(),
            None => {
                self.overlay_visible = false;
                Step {
                    overlay: Some(OverlayAction::Hide),
                    attempt: None,
                    transition: None,
                }
            }
        }
    }
}

fn deadline_passed(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    deadline.is_some_and(|deadline| now >= deadline)
}

fn remaining_ms(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (until - now).num_milliseconds().max(0)
}
