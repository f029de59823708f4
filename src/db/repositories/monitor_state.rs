//! Live session state and attempt counter, stored as one row so every
//! write and read covers both together.

use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::{
    db::{
        helpers::{parse_datetime, parse_optional_datetime, to_i64, to_u64},
        Database,
    },
    models::SessionState,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedMonitor {
    pub session_id: Option<String>,
    pub state: SessionState,
    pub attempt_count: u64,
    pub overlay_visible: bool,
}

fn row_to_monitor(row: &Row) -> Result<PersistedMonitor> {
    let status: String = row.get("status")?;
    let session_id: Option<String> = row.get("session_id")?;
    let started_at = parse_optional_datetime(row.get("started_at")?, "started_at")?;
    let session_deadline =
        parse_optional_datetime(row.get("session_deadline")?, "session_deadline")?;
    let resume_at: Option<String> = row.get("resume_at")?;
    let attempt_count: i64 = row.get("attempt_count")?;
    let overlay_visible: bool = row.get("overlay_visible")?;

    let state = match (status.as_str(), started_at) {
        ("Stopped", _) => SessionState::Stopped,
        ("Running", Some(started_at)) => SessionState::Running {
            started_at,
            session_deadline,
        },
        ("OnBreak", Some(started_at)) => match resume_at {
            Some(raw) => SessionState::OnBreak {
                started_at,
                session_deadline,
                resume_at: parse_datetime(&raw, "resume_at")?,
            },
            None => bail!("OnBreak state without resume_at"),
        },
        (other, _) => bail!("invalid persisted monitor status {other}"),
    };

    Ok(PersistedMonitor {
        session_id,
        state,
        attempt_count: to_u64(attempt_count, "attempt_count")?,
        overlay_visible,
    })
}

impl Database {
    pub async fn load_monitor_state(&self) -> Result<Option<PersistedMonitor>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, session_id, started_at, session_deadline, resume_at, attempt_count, overlay_visible
                 FROM monitor_state
                 WHERE id = 1",
            )?;

            let monitor = stmt
                .query_row([], |row| Ok(row_to_monitor(row)))
                .optional()?;
            monitor.transpose()
        })
        .await
    }

    pub async fn save_monitor_state(&self, monitor: &PersistedMonitor) -> Result<()> {
        let record = monitor.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO monitor_state
                     (id, status, session_id, started_at, session_deadline, resume_at, attempt_count, overlay_visible, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     session_id = excluded.session_id,
                     started_at = excluded.started_at,
                     session_deadline = excluded.session_deadline,
                     resume_at = excluded.resume_at,
                     attempt_count = excluded.attempt_count,
                     overlay_visible = excluded.overlay_visible,
                     updated_at = excluded.updated_at",
                params![
                    record.state.as_str(),
                    record.session_id,
                    record.state.started_at().map(|dt| dt.to_rfc3339()),
                    record.state.session_deadline().map(|dt| dt.to_rfc3339()),
                    record.state.resume_at().map(|dt| dt.to_rfc3339()),
                    to_i64(record.attempt_count)?,
                    record.overlay_visible,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }
}
