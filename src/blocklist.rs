//! The user's block-list.
//!
//! Membership is cached in memory so the monitor can check it every tick
//! without a database round trip. Writes go to SQLite first and only touch the
//! cache once they are durable.

use std::{
    collections::{BTreeSet, HashSet},
    sync::{Arc, RwLock},
};

use anyhow::Result;
use log::info;

use crate::{db::Database, error::MonitorError, models::AppId, monitor::SessionGate};

#[derive(Clone)]
pub struct BlockedAppStore {
    db: Database,
    cache: Arc<RwLock<HashSet<AppId>>>,
    gate: SessionGate,
}

impl BlockedAppStore {
    pub async fn load(db: Database, gate: SessionGate) -> Result<Self> {
        let apps = db.list_blocked_apps().await?;
        info!("Loaded {} blocked apps", apps.len());

        Ok(Self {
            db,
            cache: Arc::new(RwLock::new(apps.into_iter().collect())),
            gate,
        })
    }

    pub async fn add(&self, app_id: AppId) -> Result<(), MonitorError> {
        self.ensure_writable(&app_id)?;
        self.db.insert_blocked_app(&app_id).await?;
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(app_id);
        Ok(())
    }

    pub async fn remove(&self, app_id: &AppId) -> Result<(), MonitorError> {
        self.ensure_writable(app_id)?;
        self.db.delete_blocked_app(app_id).await?;
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(app_id);
        Ok(())
    }

    pub fn contains(&self, app_id: &AppId) -> bool {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(app_id)
    }

    pub fn all(&self) -> BTreeSet<AppId> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn ensure_writable(&self, app_id: &AppId) -> Result<(), MonitorError> {
        if app_id.is_empty() {
            return Err(MonitorError::EmptyAppId);
        }
        if self.gate.is_locked() {
            return Err(MonitorError::ConfigLocked("blocked apps"));
        }
        Ok(())
    }
}
