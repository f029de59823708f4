use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::{
    db::{
        helpers::{parse_datetime, parse_end_reason, parse_optional_datetime, to_i64, to_u64},
        Database,
    },
    models::{EndReason, SessionRecord},
};

fn row_to_session(row: &Row) -> Result<SessionRecord> {
    let started_at: String = row.get("started_at")?;
    let end_reason: Option<String> = row.get("end_reason")?;
    let attempt_count: i64 = row.get("attempt_count")?;
    let breaks_taken: u32 = row.get("breaks_taken")?;

    Ok(SessionRecord {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        session_deadline: parse_optional_datetime(row.get("session_deadline")?, "session_deadline")?,
        ended_at: parse_optional_datetime(row.get("ended_at")?, "ended_at")?,
        end_reason: end_reason.as_deref().map(parse_end_reason).transpose()?,
        attempt_count: to_u64(attempt_count, "attempt_count")?,
        breaks_taken,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, started_at, session_deadline, ended_at, end_reason, attempt_count, breaks_taken)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.session_deadline.map(|dt| dt.to_rfc3339()),
                    record.ended_at.map(|dt| dt.to_rfc3339()),
                    record.end_reason.map(|reason| reason.as_str()),
                    to_i64(record.attempt_count)?,
                    record.breaks_taken,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn record_session_break(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions SET breaks_taken = breaks_taken + 1 WHERE id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn finish_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
        reason: EndReason,
        attempt_count: u64,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET ended_at = ?1,
                     end_reason = ?2,
                     attempt_count = ?3
                 WHERE id = ?4",
                params![
                    ended_at.to_rfc3339(),
                    reason.as_str(),
                    to_i64(attempt_count)?,
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent sessions first.
    pub async fn list_sessions(&self, limit: u32) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, started_at, session_deadline, ended_at, end_reason, attempt_count, breaks_taken
                 FROM sessions
                 ORDER BY started_at DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::db::PersistedMonitor;
    use crate::models::{AppId, SessionState};

    fn open_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("test.sqlite3")).unwrap();
        assert_eq!(db.path(), dir.path().join("test.sqlite3").as_path());
        (db, dir)
    }

    #[tokio::test]
    async fn session_history_lists_newest_first() {
        let (db, _dir) = open_db();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        db.insert_session(&SessionRecord::begin("a".into(), base, None))
            .await
            .unwrap();
        db.insert_session(&SessionRecord::begin(
            "b".into(),
            base + Duration::hours(1),
            Some(base + Duration::hours(2)),
        ))
        .await
        .unwrap();
        db.record_session_break("b").await.unwrap();
        db.finish_session("b", base + Duration::minutes(90), EndReason::Expired, 4)
            .await
            .unwrap();

        let sessions = db.list_sessions(10).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "b");
        assert_eq!(sessions[0].end_reason, Some(EndReason::Expired));
        assert_eq!(sessions[0].attempt_count, 4);
        assert_eq!(sessions[0].breaks_taken, 1);
        assert_eq!(sessions[1].id, "a");
        assert!(sessions[1].ended_at.is_none());
    }

    #[tokio::test]
    async fn monitor_state_round_trips_through_single_row() {
        let (db, _dir) = open_db();
        assert!(db.load_monitor_state().await.unwrap().is_none());

        let started_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let on_break = PersistedMonitor {
            session_id: Some("s1".into()),
            state: SessionState::OnBreak {
                started_at,
                session_deadline: Some(started_at + Duration::minutes(30)),
                resume_at: started_at + Duration::minutes(10),
            },
            attempt_count: 3,
            overlay_visible: false,
        };
        db.save_monitor_state(&on_break).await.unwrap();
        assert_eq!(db.load_monitor_state().await.unwrap(), Some(on_break));

        let stopped = PersistedMonitor {
            session_id: None,
            state: SessionState::Stopped,
            attempt_count: 3,
            overlay_visible: false,
        };
        db.save_monitor_state(&stopped).await.unwrap();
        assert_eq!(db.load_monitor_state().await.unwrap(), Some(stopped));

        let blocking = PersistedMonitor {
            session_id: Some("s2".into()),
            state: SessionState::Running {
                started_at,
                session_deadline: None,
            },
            attempt_count: 1,
            overlay_visible: true,
        };
        db.save_monitor_state(&blocking).await.unwrap();
        assert_eq!(db.load_monitor_state().await.unwrap(), Some(blocking));
    }

    #[tokio::test]
    async fn blocked_app_writes_are_idempotent() {
        let (db, _dir) = open_db();
        let app = AppId::from("com.example.feed");

        db.insert_blocked_app(&app).await.unwrap();
        db.insert_blocked_app(&app).await.unwrap();
        assert_eq!(db.list_blocked_apps().await.unwrap(), vec![app.clone()]);

        db.delete_blocked_app(&app).await.unwrap();
        db.delete_blocked_app(&app).await.unwrap();
        assert!(db.list_blocked_apps().await.unwrap().is_empty());
    }
}
