use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::{
    error::{Result, SchedulerError},
    types::{RunRecord, RunStatus},
};

/// Initialise the run-history schema in `conn`.
///
/// Creates the `runs` table (idempotent) and an index on `started_at` so the
/// "most recent runs" query stays cheap as history grows.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id           TEXT    NOT NULL PRIMARY KEY,
            job          TEXT    NOT NULL,
            started_at   TEXT    NOT NULL,   -- ISO-8601
            finished_at  TEXT    NOT NULL,   -- ISO-8601
            status       TEXT    NOT NULL,
            error_count  INTEGER NOT NULL DEFAULT 0
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs (started_at);
        ",
    )?;
    Ok(())
}

/// Append-only record of finished runs.
pub struct RunHistory {
    conn: Mutex<Connection>,
}

impl RunHistory {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (creating if needed) the history database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        info!(path = %path.display(), "opening run history database");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    pub fn record(&self, run: &RunRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO runs (id, job, started_at, finished_at, status, error_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                run.id,
                run.job,
                run.started_at,
                run.finished_at,
                run.status.to_string(),
                run.error_count,
            ],
        )?;
        debug!(run_id = %run.id, job = %run.job, "run recorded");
        Ok(())
    }

    /// Most recent runs first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, job, started_at, finished_at, status, error_count
             FROM runs ORDER BY started_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?, // id
                    row.get::<_, String>(1)?, // job
                    row.get::<_, String>(2)?, // started_at
                    row.get::<_, String>(3)?, // finished_at
                    row.get::<_, String>(4)?, // status
                    row.get::<_, u32>(5)?,    // error_count
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, job, started_at, finished_at, status, error_count)| {
                let status: RunStatus = status.parse().map_err(SchedulerError::InvalidRecord)?;
                Ok(RunRecord {
                    id,
                    job,
                    started_at,
                    finished_at,
                    status,
                    error_count,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, job: &str, started_at: &str, status: RunStatus) -> RunRecord {
        RunRecord {
            id: id.to_string(),
            job: job.to_string(),
            started_at: started_at.to_string(),
            finished_at: started_at.to_string(),
            status,
            error_count: if status == RunStatus::Succeeded { 0 } else { 2 },
        }
    }

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }

    #[test]
    fn recent_returns_newest_first() {
        let history = RunHistory::new(Connection::open_in_memory().unwrap()).unwrap();
        history
            .record(&record("1", "photos", "2026-03-01T02:30:00+00:00", RunStatus::Succeeded))
            .unwrap();
        history
            .record(&record("2", "docs", "2026-03-02T02:30:00+00:00", RunStatus::Failed))
            .unwrap();
        history
            .record(&record("3", "photos", "2026-03-03T02:30:00+00:00", RunStatus::Aborted))
            .unwrap();

        let runs = history.recent(2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, "3");
        assert_eq!(runs[0].status, RunStatus::Aborted);
        assert_eq!(runs[1].job, "docs");
        assert_eq!(runs[1].error_count, 2);
    }

    #[test]
    fn unknown_status_is_reported() {
        let history = RunHistory::new(Connection::open_in_memory().unwrap()).unwrap();
        {
            let conn = history.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO runs (id, job, started_at, finished_at, status, error_count)
                 VALUES ('x', 'j', 't', 't', 'exploded', 0)",
                [],
            )
            .unwrap();
        }
        assert!(matches!(
            history.recent(1),
            Err(SchedulerError::InvalidRecord(_))
        ));
    }
}
