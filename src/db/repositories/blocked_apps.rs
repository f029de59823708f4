use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use crate::{db::Database, models::AppId};

impl Database {
    /// Insert the id if absent. Re-inserting an existing id is a no-op.
    pub async fn insert_blocked_app(&self, app_id: &AppId) -> Result<()> {
        let app_id = app_id.as_str().to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO blocked_apps (app_id, added_at)
                 VALUES (?1, ?2)
                 ON CONFLICT(app_id) DO NOTHING",
                params![app_id, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    /// Delete the id if present. Unknown ids are not an error.
    pub async fn delete_blocked_app(&self, app_id: &AppId) -> Result<()> {
        let app_id = app_id.as_str().to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM blocked_apps WHERE app_id = ?1", params![app_id])?;
            Ok(())
        })
        .await
    }

    pub async fn list_blocked_apps(&self) -> Result<Vec<AppId>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT app_id FROM blocked_apps ORDER BY app_id")?;
            let apps = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|id| id.map(AppId::from))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(apps)
        })
        .await
    }
}
