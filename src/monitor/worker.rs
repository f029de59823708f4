use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    blocklist::BlockedAppStore,
    db::{Database, PersistedMonitor},
    enforcement::Enforcer,
    error::{MonitorError, MonitorResult},
    models::{EndReason, SessionRecord},
    platform::{Capability, Clock},
    sensing::ForegroundDetector,
    settings::SettingsStore,
};

use super::{
    commands::{Command, ToggleOutcome},
    controller::{MonitorDeps, MonitorOptions},
    state::{OverlayAction, Transition},
    Monitor, MonitorEvent, MonitorSnapshot, Notice, Step,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Single owner of the session state. Commands and ticks are handled one at a
/// time, so every transition sees the result of the one before it.
pub(crate) struct MonitorWorker {
    monitor: Monitor,
    session_id: Option<String>,
    missing: Vec<Capability>,
    /// Overlay visibility as last written to the state row.
    persisted_overlay: bool,
    db: Database,
    blocklist: BlockedAppStore,
    settings: Arc<SettingsStore>,
    detector: ForegroundDetector,
    enforcer: Enforcer,
    clock: Arc<dyn Clock>,
    options: MonitorOptions,
    snapshot_tx: watch::Sender<MonitorSnapshot>,
    events: broadcast::Sender<MonitorEvent>,
}

impl MonitorWorker {
    pub(crate) fn new(
        deps: MonitorDeps,
        monitor: Monitor,
        session_id: Option<String>,
        options: MonitorOptions,
        snapshot_tx: watch::Sender<MonitorSnapshot>,
        events: broadcast::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            persisted_overlay: monitor.overlay_visible(),
            monitor,
            session_id,
            missing: Vec::new(),
            db: deps.db,
            blocklist: deps.blocklist,
            settings: deps.settings,
            detector: deps.detector,
            enforcer: deps.enforcer,
            clock: deps.clock,
            options,
            snapshot_tx,
            events,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        cancel_token: CancellationToken,
    ) {
        let period = self.options.poll_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.missing = self.missing_capabilities();
        if self.monitor.overlay_visible() {
            log_info!("Restoring block screen from previous run");
            self.enforcer.show();
        }
        self.publish();

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    log_info!("monitor loop shutting down");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        log_info!("all monitor handles dropped; shutting down");
                        break;
                    }
                },
                _ = ticker.tick() => self.on_tick().await,
            }
        }

        self.enforcer.hide();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { reply } => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::Stop { reason, reply } => {
                let result = self.stop(reason).await;
                let _ = reply.send(result);
            }
            Command::RequestBreak { reply } => {
                let result = self.request_break().await;
                let _ = reply.send(result);
            }
            Command::ToggleCode { token, reply } => {
                let result = self.toggle(&token).await;
                let _ = reply.send(result);
            }
            Command::Refresh { reply } => {
                self.on_tick().await;
                let _ = reply.send(Ok(self.current_snapshot()));
            }
        }
    }

    async fn start(&mut self) -> MonitorResult<MonitorSnapshot> {
        self.missing = self.missing_capabilities();
        if let Some(capability) = self.missing.first().copied() {
            log_warn!("Refusing to start monitoring: {capability} permission missing");
            self.notify(Notice::NeedsPermission { capability });
            self.publish();
            return Err(MonitorError::CapabilityUnavailable(capability));
        }

        let config = self.settings.load();
        let now = self.clock.now();
        let step = self.monitor.start(now, &config)?;

        let session_id = Uuid::new_v4().to_string();
        let record = SessionRecord::begin(
            session_id.clone(),
            now,
            self.monitor.state().session_deadline(),
        );
        if let Err(err) = self.db.insert_session(&record).await {
            log_error!("Failed to record session {session_id}: {err:#}");
        }

        log_info!(
            "Monitoring started: session {session_id}, auto-stop {} min, {} blocked apps",
            config.auto_stop_minutes,
            self.blocklist.all().len()
        );
        self.session_id = Some(session_id);
        self.detector.reset();

        self.apply(step, now).await;
        Ok(self.current_snapshot())
    }

    async fn stop(&mut self, reason: EndReason) -> MonitorResult<MonitorSnapshot> {
        let step = self.monitor.stop(reason)?;
        let now = self.clock.now();
        self.apply(step, now).await;
        Ok(self.current_snapshot())
    }

    async fn request_break(&mut self) -> MonitorResult<MonitorSnapshot> {
        let config = self.settings.load();
        let now = self.clock.now();
        let step = self.monitor.request_break(now, &config)?;
        self.apply(step, now).await;
        Ok(self.current_snapshot())
    }

    async fn toggle(&mut self, token: &str) -> MonitorResult<ToggleOutcome> {
        if token.is_empty() {
            return Ok(ToggleOutcome::Ignored);
        }

        if !self.settings.load().code_control_enabled {
            log_warn!("Ignoring toggle code: code control is disabled");
            return Err(MonitorError::CodeControlDisabled);
        }

        // Exact match only; padding or case differences are a wrong code.
        if token != self.options.toggle_token {
            log_warn!("Rejected toggle code");
            self.notify(Notice::IncorrectCode);
            return Err(MonitorError::RejectedToggle);
        }

        if self.monitor.state().is_active() {
            self.stop(EndReason::ExternalCode)
                .await
                .map(ToggleOutcome::Stopped)
        } else {
            self.start().await.map(ToggleOutcome::Started)
        }
    }

    async fn on_tick(&mut self) {
        let now = self.clock.now();

        let missing = self.missing_capabilities();
        for capability in missing.iter().filter(|c| !self.missing.contains(c)) {
            log_warn!("{capability} permission is missing");
            self.notify(Notice::NeedsPermission {
                capability: *capability,
            });
        }
        self.missing = missing;

        if self.monitor.state().is_active() {
            if let Some(capability) = self.missing.first().copied() {
                log_warn!("{capability} permission lost mid-session; stopping monitoring");
                if let Ok(step) = self.monitor.stop(EndReason::CapabilityLost) {
                    self.apply(step, now).await;
                }
                return;
            }
        }

        let detector = &mut self.detector;
        let blocklist = &self.blocklist;
        let step = self.monitor.tick(
            now,
            || detector.sample(),
            |app_id| blocklist.contains(app_id),
        );

        if self.options.verbose_ticks {
            log_debug!(
                "tick: state={} overlay={:?} attempt={:?}",
                self.monitor.state().as_str(),
                step.overlay,
                step.attempt
            );
        }

        self.apply(step, now).await;
    }

    /// Carries out a step's effects, then publishes the new snapshot.
    async fn apply(&mut self, step: Step, now: DateTime<Utc>) {
        match step.overlay {
            Some(OverlayAction::Show) => self.enforcer.show(),
            Some(OverlayAction::Hide) => self.enforcer.hide(),
            None => {}
        }

        let durable = step.is_durable_change();
        let finished_session = match step.transition {
            Some(Transition::Stopped(_)) => self.session_id.take(),
            _ => None,
        };

        if durable || self.monitor.overlay_visible() != self.persisted_overlay {
            self.persist().await;
        }

        if let Some(app_id) = step.attempt {
            let attempt_count = self.monitor.attempt_count();
            log_info!("Blocked {app_id} (attempt #{attempt_count})");
            self.emit(MonitorEvent::AttemptRecorded {
                app_id,
                attempt_count,
            });
        }

        match step.transition {
            Some(Transition::Started) => self.notify(Notice::MonitoringStarted),
            Some(Transition::BreakStarted) => {
                if let Some(session_id) = &self.session_id {
                    if let Err(err) = self.db.record_session_break(session_id).await {
                        log_error!("Failed to record break for session {session_id}: {err:#}");
                    }
                }
                if let Some(resume_at) = self.monitor.state().resume_at() {
                    log_info!("Break started; blocking resumes at {resume_at}");
                    self.notify(Notice::BreakStarted { resume_at });
                }
            }
            Some(Transition::BreakEnded) => {
                log_info!("Break over; blocking resumed");
                self.notify(Notice::BreakEnded);
            }
            Some(Transition::Stopped(reason)) => {
                log_info!(
                    "Monitoring stopped ({}) after {} attempts",
                    reason.as_str(),
                    self.monitor.attempt_count()
                );
                if let Some(session_id) = finished_session {
                    if let Err(err) = self
                        .db
                        .finish_session(&session_id, now, reason, self.monitor.attempt_count())
                        .await
                    {
                        log_error!("Failed to close session {session_id}: {err:#}");
                    }
                }
                self.detector.reset();
                self.notify(Notice::MonitoringStopped { reason });
            }
            None => {}
        }

        let snapshot = self.publish();
        if durable {
            self.emit(MonitorEvent::StateChanged(snapshot));
        }
    }

    /// Write failures are logged; the in-memory state stays authoritative.
    async fn persist(&mut self) {
        let record = PersistedMonitor {
            session_id: self.session_id.clone(),
            state: self.monitor.state(),
            attempt_count: self.monitor.attempt_count(),
            overlay_visible: self.monitor.overlay_visible(),
        };
        match self.db.save_monitor_state(&record).await {
            Ok(()) => self.persisted_overlay = record.overlay_visible,
            Err(err) => log_error!("Failed to persist monitor state: {err:#}"),
        }
    }

    fn missing_capabilities(&self) -> Vec<Capability> {
        let mut missing = Vec::new();
        if !self.detector.has_access() {
            missing.push(Capability::UsageAccess);
        }
        if !self.enforcer.can_draw() {
            missing.push(Capability::Overlay);
        }
        missing
    }

    fn current_snapshot(&self) -> MonitorSnapshot {
        self.monitor.snapshot(self.clock.now(), &self.missing)
    }

    fn publish(&self) -> MonitorSnapshot {
        let snapshot = self.current_snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }

    fn notify(&self, notice: Notice) {
        self.emit(MonitorEvent::Notice(notice));
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
