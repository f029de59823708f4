//! Hold-to-force-stop.
//!
//! A single timed command: it reports progress from 0.0 to 1.0 while held and
//! dispatches the stop only once the full duration has elapsed. Releasing at
//! any point before that leaves the session untouched.

use std::time::Duration;

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{MonitorError, MonitorResult},
    models::EndReason,
};

use super::{MonitorHandle, MonitorSnapshot};

/// Hold duration the emergency stop requires.
pub const FORCE_STOP_HOLD: Duration = Duration::from_secs(60);

const PROGRESS_STEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum HoldOutcome {
    Completed(MonitorSnapshot),
    Released,
}

pub struct ForceStopHold {
    started: Instant,
    duration: Duration,
    progress: watch::Receiver<f32>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<MonitorResult<HoldOutcome>>>,
}

impl ForceStopHold {
    pub(crate) fn begin(handle: MonitorHandle, duration: Duration) -> Self {
        let started = Instant::now();
        let cancel_token = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(0.0_f32);

        let task = tokio::spawn(hold_loop(
            handle,
            started,
            duration,
            cancel_token.clone(),
            progress_tx,
        ));

        Self {
            started,
            duration,
            progress: progress_rx,
            cancel_token,
            task: Some(task),
        }
    }

    pub fn progress(&self) -> f32 {
        progress_at(self.started.elapsed(), self.duration)
    }

    /// Progress updates for a progress bar; drops back to 0.0 on release.
    pub fn progress_updates(&self) -> watch::Receiver<f32> {
        self.progress.clone()
    }

    pub fn release(&self) {
        self.cancel_token.cancel();
    }

    /// Waits for the hold to either complete or be released.
    pub async fn finish(mut self) -> MonitorResult<HoldOutcome> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|err| MonitorError::Storage(anyhow::anyhow!("force-stop task failed: {err}")))?,
            None => Ok(HoldOutcome::Released),
        }
    }
}

impl Drop for ForceStopHold {
    // Dropping the gesture handle is a release.
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel_token.cancel();
        }
    }
}

async fn hold_loop(
    handle: MonitorHandle,
    started: Instant,
    duration: Duration,
    cancel_token: CancellationToken,
    progress_tx: watch::Sender<f32>,
) -> MonitorResult<HoldOutcome> {
    let mut ticker = time::interval(PROGRESS_STEP);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                progress_tx.send_replace(0.0);
                return Ok(HoldOutcome::Released);
            }
            _ = ticker.tick() => {
                let progress = progress_at(started.elapsed(), duration);
                progress_tx.send_replace(progress);
                if progress >= 1.0 {
                    break;
                }
            }
        }
    }

    log::info!("Force-stop hold completed after {:?}", duration);
    handle
        .stop_with(EndReason::ForceStopped)
        .await
        .map(HoldOutcome::Completed)
}

fn progress_at(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / duration.as_secs_f32()).min(1.0)
}
