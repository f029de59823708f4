pub mod blocklist;
pub mod db;
pub mod enforcement;
pub mod error;
pub mod models;
pub mod monitor;
pub mod platform;
pub mod sensing;
pub mod settings;
mod utils;

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::watch;

use blocklist::BlockedAppStore;
use db::Database;
use enforcement::Enforcer;
use error::MonitorResult;
use models::{AppId, SessionRecord};
use monitor::{Monitor, MonitorController, MonitorDeps, MonitorHandle, MonitorOptions, SessionGate};
use platform::{Clock, ForegroundSource, OverlaySurface, SystemClock};
use sensing::ForegroundDetector;
use settings::{ConfigUpdate, SessionConfig, SettingsStore};

pub use error::MonitorError;

const DB_FILE: &str = "tapblok.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

/// Initialize logging (reads RUST_LOG). Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// The host-provided collaborators.
#[derive(Clone)]
pub struct Platform {
    pub foreground: Arc<dyn ForegroundSource>,
    pub overlay: Arc<dyn OverlaySurface>,
    pub clock: Arc<dyn Clock>,
}

impl Platform {
    pub fn new(foreground: Arc<dyn ForegroundSource>, overlay: Arc<dyn OverlaySurface>) -> Self {
        Self {
            foreground,
            overlay,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// A running engine: storage, configuration and the monitor task.
pub struct TapBlok {
    data_dir: PathBuf,
    db: Database,
    blocklist: BlockedAppStore,
    settings: Arc<SettingsStore>,
    controller: MonitorController,
}

impl TapBlok {
    /// Opens (or creates) the engine state under `data_dir` and starts the
    /// monitor task. A session that was active when the process last exited
    /// is resumed with its counter intact.
    pub async fn open(
        data_dir: impl AsRef<Path>,
        platform: Platform,
        options: MonitorOptions,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DB_FILE))?;

        let persisted = db.load_monitor_state().await?.unwrap_or_default();
        if persisted.state.is_active() {
            match &persisted.session_id {
                Some(id) => info!(
                    "Resuming {} session {id} with {} attempts",
                    persisted.state.as_str(),
                    persisted.attempt_count
                ),
                None => warn!("Resuming active session with no history record"),
            }
        }

        let monitor = Monitor::restore(
            persisted.state,
            persisted.attempt_count,
            persisted.overlay_visible,
        );
        let (snapshot_tx, snapshot_rx) =
            watch::channel(monitor.snapshot(platform.clock.now(), &[]));
        let gate = SessionGate::new(snapshot_rx);

        let settings = Arc::new(SettingsStore::new(data_dir.join(SETTINGS_FILE), gate.clone())?);
        let blocklist = BlockedAppStore::load(db.clone(), gate).await?;

        let deps = MonitorDeps {
            db: db.clone(),
            blocklist: blocklist.clone(),
            settings: settings.clone(),
            detector: ForegroundDetector::new(platform.foreground),
            enforcer: Enforcer::new(platform.overlay),
            clock: platform.clock,
        };
        let controller =
            MonitorController::spawn(deps, monitor, persisted.session_id, options, snapshot_tx);

        info!("TapBlok ready at {}", data_dir.display());

        Ok(Self {
            data_dir,
            db,
            blocklist,
            settings,
            controller,
        })
    }

    pub fn monitor(&self) -> MonitorHandle {
        self.controller.handle()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> SessionConfig {
        self.settings.load()
    }

    pub fn update_config(&self, update: ConfigUpdate) -> MonitorResult<SessionConfig> {
        self.settings.set(update)
    }

    pub fn blocked_apps(&self) -> BTreeSet<AppId> {
        self.blocklist.all()
    }

    pub async fn block_app(&self, app_id: impl Into<AppId>) -> MonitorResult<()> {
        self.blocklist.add(app_id.into()).await
    }

    pub async fn unblock_app(&self, app_id: impl Into<AppId>) -> MonitorResult<()> {
        self.blocklist.remove(&app_id.into()).await
    }

    pub async fn recent_sessions(&self, limit: u32) -> Result<Vec<SessionRecord>> {
        self.db.list_sessions(limit).await
    }

    pub async fn shutdown(self) -> Result<()> {
        info!("TapBlok shutting down");
        self.controller.shutdown().await
    }
}
