//! Audit persistence: one upserted row per terminal job outcome, plus
//! the aggregate query external consumers poll.
//!
//! WAL pragmas, `with_retry`, and the lock-error detection exist because
//! this store is the one resource in the pipeline with concurrent
//! writers.

use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::{PipelineError, Result};
use crate::models::{DetectedEntity, JobStatus, ProcessResult};

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 100;

/// `rusqlite::Connection` is `Send` but not `Sync`; the pipeline holds
/// this store behind an `Arc` and calls into it from `spawn_blocking`
/// tasks on the blocking pool, so the connection needs a `Mutex` around
/// it rather than bare interior access.
pub struct AuditStore {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone)]
pub struct AuditStats {
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub total_entities: i64,
    pub avg_duration_s: f64,
}

impl AuditStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = connect(db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                status TEXT NOT NULL,
                entity_count INTEGER NOT NULL DEFAULT 0,
                entities TEXT NOT NULL DEFAULT '[]',
                output_path TEXT,
                error TEXT,
                duration_s REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| PipelineError::AuditWrite(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Upserts the final record for a job. Every terminal outcome calls
    /// this exactly once.
    pub fn log(&self, result: &ProcessResult) -> Result<()> {
        let entities_json = serde_json::to_string(&result.entities)
            .map_err(|e| PipelineError::AuditWrite(e.to_string()))?;
        with_retry(|| {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                r#"
                INSERT INTO jobs (job_id, filename, status, entity_count, entities, output_path, error, duration_s, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(job_id) DO UPDATE SET
                    filename = excluded.filename,
                    status = excluded.status,
                    entity_count = excluded.entity_count,
                    entities = excluded.entities,
                    output_path = excluded.output_path,
                    error = excluded.error,
                    duration_s = excluded.duration_s,
                    created_at = excluded.created_at
                "#,
                params![
                    result.job_id,
                    result.filename,
                    result.status.as_str(),
                    result.entity_count as i64,
                    entities_json,
                    result.output_path,
                    result.error,
                    result.duration_s,
                    result.created_at.to_rfc3339(),
                ],
            )
        })
        .map_err(|e| PipelineError::AuditWrite(e.to_string()))?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<ProcessResult>> {
        let conn = self.conn.lock().unwrap();
        let row = conn.query_row(
            "SELECT job_id, filename, status, entity_count, entities, output_path, error, duration_s, created_at \
             FROM jobs WHERE job_id = ?1",
            params![job_id],
            row_to_result,
        );
        match row {
            Ok(result) => Ok(Some(result)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PipelineError::AuditWrite(e.to_string())),
        }
    }

    pub fn get_stats(&self) -> Result<AuditStats> {
        let conn = self.conn.lock().unwrap();
        conn
            .query_row(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(entity_count), 0),
                    COALESCE(AVG(duration_s), 0.0)
                FROM jobs
                "#,
                [],
                |row| {
                    Ok(AuditStats {
                        total_jobs: row.get(0)?,
                        completed_jobs: row.get(1)?,
                        failed_jobs: row.get(2)?,
                        total_entities: row.get(3)?,
                        avg_duration_s: row.get(4)?,
                    })
                },
            )
            .map_err(|e| PipelineError::AuditWrite(e.to_string()))
    }
}

fn row_to_result(row: &rusqlite::Row) -> rusqlite::Result<ProcessResult> {
    let status_str: String = row.get(2)?;
    let status = match status_str.as_str() {
        "completed" => JobStatus::Completed,
        _ => JobStatus::Failed,
    };
    let entities_json: String = row.get(4)?;
    let entities: Vec<DetectedEntity> = serde_json::from_str(&entities_json).unwrap_or_default();
    let created_at_str: String = row.get(8)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH);

    Ok(ProcessResult {
        job_id: row.get(0)?,
        filename: row.get(1)?,
        status,
        entity_count: row.get::<_, i64>(3)? as usize,
        entities,
        output_path: row.get(5)?,
        error: row.get(6)?,
        duration_s: row.get(7)?,
        created_at,
    })
}

fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path).map_err(|e| PipelineError::AuditWrite(e.to_string()))?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 30000;
        "#,
    )
    .map_err(|e| PipelineError::AuditWrite(e.to_string()))?;
    Ok(conn)
}

/// Retries up to `MAX_RETRIES` times with exponential backoff when the
/// database is locked by a concurrent writer.
fn with_retry<T, F>(mut operation: F) -> rusqlite::Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    let mut delay_ms = INITIAL_BACKOFF_MS;
    for attempt in 0..MAX_RETRIES {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) => {
                let is_lock_error = e.to_string().contains("database is locked")
                    || e.to_string().contains("SQLITE_BUSY");
                if is_lock_error && attempt < MAX_RETRIES - 1 {
                    tracing::debug!(attempt, delay_ms, "audit store locked, retrying");
                    thread::sleep(Duration::from_millis(delay_ms));
                    delay_ms *= 2;
                    continue;
                }
                return Err(e);
            }
        }
    }
    operation()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntitySource;

    #[test]
    fn log_then_get_job_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuditStore::open(&dir.path().join("audit.db")).unwrap();

        let entity = DetectedEntity::new("SSN", "123-45-6789", 5, 16, 1.0, 0, EntitySource::Regex);
        let result = ProcessResult::completed("job-1", "input.pdf", vec![entity], "/signed/job-1.pdf", 1.25);
        store.log(&result).unwrap();

        let fetched = store.get_job("job-1").unwrap().unwrap();
        assert_eq!(fetched.entity_count, 1);
        assert_eq!(fetched.status, JobStatus::Completed);
    }

    #[test]
    fn upsert_replaces_prior_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuditStore::open(&dir.path().join("audit.db")).unwrap();

        store
            .log(&ProcessResult::failed("job-1", "input.pdf", "boom", 0.1))
            .unwrap();
        store
            .log(&ProcessResult::completed("job-1", "input.pdf", vec![], "/signed/job-1.pdf", 2.0))
            .unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 0);
    }

    #[test]
    fn stats_aggregate_across_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuditStore::open(&dir.path().join("audit.db")).unwrap();
        store
            .log(&ProcessResult::completed("job-1", "a.pdf", vec![], "/s/a.pdf", 1.0))
            .unwrap();
        store
            .log(&ProcessResult::failed("job-2", "b.pdf", "bad", 0.5))
            .unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 1);
    }
}
