#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tapblok::{
    models::AppId,
    monitor::{MonitorEvent, MonitorOptions},
    platform::{ForegroundSource, ManualClock, OverlaySurface},
    Platform, TapBlok,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const SOCIAL: &str = "com.example.social";
pub const NOTES: &str = "com.example.notes";

/// Reports whatever app the test last put in the foreground.
#[derive(Default)]
pub struct FakeForeground {
    current: Mutex<Option<AppId>>,
    revoked: AtomicBool,
}

impl FakeForeground {
    pub fn switch_to(&self, app: &str) {
        *self.current.lock().unwrap() = Some(AppId::from(app));
    }

    pub fn set_access(&self, granted: bool) {
        self.revoked.store(!granted, Ordering::SeqCst);
    }
}

impl ForegroundSource for FakeForeground {
    fn has_usage_access(&self) -> bool {
        !self.revoked.load(Ordering::SeqCst)
    }

    fn foreground_app(&self) -> Result<Option<AppId>> {
        Ok(self.current.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingOverlay {
    denied: AtomicBool,
    visible: AtomicBool,
    shows: AtomicUsize,
}

impl RecordingOverlay {
    pub fn set_permission(&self, granted: bool) {
        self.denied.store(!granted, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn shows(&self) -> usize {
        self.shows.load(Ordering::SeqCst)
    }
}

impl OverlaySurface for RecordingOverlay {
    fn can_draw_overlays(&self) -> bool {
        !self.denied.load(Ordering::SeqCst)
    }

    fn show(&self) {
        self.shows.fetch_add(1, Ordering::SeqCst);
        self.visible.store(true, Ordering::SeqCst);
    }

    fn hide(&self) {
        self.visible.store(false, Ordering::SeqCst);
    }
}

pub struct TestEnv {
    pub tmp: TempDir,
    pub clock: Arc<ManualClock>,
    pub foreground: Arc<FakeForeground>,
    pub overlay: Arc<RecordingOverlay>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            tmp: TempDir::new().expect("create temp dir"),
            clock: Arc::new(ManualClock::new(start_time())),
            foreground: Arc::new(FakeForeground::default()),
            overlay: Arc::new(RecordingOverlay::default()),
        }
    }

    /// Slow background polling keeps ticks under the test's control via
    /// `refresh()`.
    pub fn options(&self) -> MonitorOptions {
        MonitorOptions::default().with_poll_interval(Duration::from_secs(4))
    }

    pub async fn open(&self) -> TapBlok {
        self.open_with(self.options()).await
    }

    pub async fn open_with(&self, options: MonitorOptions) -> TapBlok {
        let platform = Platform::new(self.foreground.clone(), self.overlay.clone())
            .with_clock(self.clock.clone());
        TapBlok::open(self.tmp.path(), platform, options)
            .await
            .expect("open engine")
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

pub fn drain(events: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

pub fn notices(events: &[MonitorEvent]) -> Vec<tapblok::monitor::Notice> {
    events
        .iter()
        .filter_map(|event| match event {
            MonitorEvent::Notice(notice) => Some(notice.clone()),
            _ => None,
        })
        .collect()
}
