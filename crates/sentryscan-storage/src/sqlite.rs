//! SQLite-backed `ScanStore`: connection setup (WAL mode, busy timeout,
//! `create_if_missing`) and schema-on-first-use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentryscan_core::error::{Error, Result};
use sentryscan_core::types::{AuditRecord, ScanTask, TaskState};
use sentryscan_core::ScanStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub struct SqliteScanStore {
    pool: SqlitePool,
}

impl SqliteScanStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::Storage(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("failed to connect: {e}")))?;

        info!(database_url, "connected to sqlite scan store");

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        debug!("initializing sentryscan-storage schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_tasks (
                task_id TEXT PRIMARY KEY,
                scan_id TEXT NOT NULL UNIQUE,
                user_id TEXT,
                target TEXT NOT NULL,
                ports TEXT NOT NULL,
                state TEXT NOT NULL,
                progress REAL NOT NULL,
                submitted_at TIMESTAMP NOT NULL,
                completed_at TIMESTAMP,
                cached INTEGER NOT NULL,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to create scan_tasks table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_tasks_user ON scan_tasks(user_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("failed to create index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TIMESTAMP NOT NULL,
                target TEXT NOT NULL,
                resolved_ip TEXT,
                original_command TEXT NOT NULL,
                client_host TEXT,
                consent INTEGER NOT NULL,
                note TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to create audit_log table: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ScanStore for SqliteScanStore {
    async fn save(&self, task: &ScanTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_tasks
                (task_id, scan_id, user_id, target, ports, state, progress, submitted_at, completed_at, cached, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(scan_id) DO UPDATE SET
                state = excluded.state,
                progress = excluded.progress,
                completed_at = excluded.completed_at,
                cached = excluded.cached,
                error = excluded.error
            "#,
        )
        .bind(task.task_id.to_string())
        .bind(task.scan_id.to_string())
        .bind(&task.user_id)
        .bind(&task.target)
        .bind(&task.ports)
        .bind(state_to_str(task.state))
        .bind(task.progress)
        .bind(task.submitted_at)
        .bind(task.completed_at)
        .bind(task.cached)
        .bind(&task.error)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to save task: {e}")))?;

        Ok(())
    }

    async fn get(&self, scan_id: Uuid, user_id: Option<&str>) -> Result<Option<ScanTask>> {
        let row = sqlx::query_as::<_, ScanTaskRow>(
            "SELECT * FROM scan_tasks WHERE scan_id = ? AND (? IS NULL OR user_id = ?)",
        )
        .bind(scan_id.to_string())
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to query task: {e}")))?;

        row.map(ScanTaskRow::try_into).transpose()
    }

    async fn list(&self, user_id: Option<&str>, limit: usize, offset: usize) -> Result<Vec<ScanTask>> {
        let rows = sqlx::query_as::<_, ScanTaskRow>(
            "SELECT * FROM scan_tasks WHERE (? IS NULL OR user_id = ?) ORDER BY submitted_at DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to list tasks: {e}")))?;

        rows.into_iter().map(ScanTaskRow::try_into).collect()
    }

    async fn delete(&self, scan_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM scan_tasks WHERE scan_id = ?")
            .bind(scan_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("failed to delete task: {e}")))?;
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scan_tasks WHERE submitted_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("failed to sweep expired tasks: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (timestamp, target, resolved_ip, original_command, client_host, consent, note)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.timestamp)
        .bind(&record.target)
        .bind(record.resolved_ip.map(|ip| ip.to_string()))
        .bind(&record.original_command)
        .bind(&record.client_host)
        .bind(record.consent)
        .bind(&record.note)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to append audit record: {e}")))?;
        Ok(())
    }
}

fn state_to_str(state: TaskState) -> &'static str {
    match state {
        TaskState::Pending => "PENDING",
        TaskState::Progress => "PROGRESS",
        TaskState::Success => "SUCCESS",
        TaskState::Failure => "FAILURE",
    }
}

fn state_from_str(s: &str) -> Result<TaskState> {
    match s {
        "PENDING" => Ok(TaskState::Pending),
        "PROGRESS" => Ok(TaskState::Progress),
        "SUCCESS" => Ok(TaskState::Success),
        "FAILURE" => Ok(TaskState::Failure),
        other => Err(Error::Storage(format!("unknown task state in database: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct ScanTaskRow {
    task_id: String,
    scan_id: String,
    user_id: Option<String>,
    target: String,
    ports: String,
    state: String,
    progress: f64,
    submitted_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    cached: bool,
    error: Option<String>,
}

impl TryFrom<ScanTaskRow> for ScanTask {
    type Error = Error;

    fn try_from(row: ScanTaskRow) -> Result<Self> {
        Ok(ScanTask {
            task_id: Uuid::parse_str(&row.task_id).map_err(|e| Error::Storage(e.to_string()))?,
            scan_id: Uuid::parse_str(&row.scan_id).map_err(|e| Error::Storage(e.to_string()))?,
            user_id: row.user_id,
            target: row.target,
            ports: row.ports,
            state: state_from_str(&row.state)?,
            progress: row.progress as f32,
            submitted_at: row.submitted_at,
            completed_at: row.completed_at,
            cached: row.cached,
            error: row.error,
        })
    }
}
