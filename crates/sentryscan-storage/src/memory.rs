//! In-memory `ScanStore`, used in tests and single-process deployments
//! without a configured database path: a `HashMap` stand-in for the
//! SQLite backend behind the same trait boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentryscan_core::error::Result;
use sentryscan_core::types::{AuditRecord, ScanTask};
use sentryscan_core::ScanStore;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryScanStore {
    tasks: Mutex<HashMap<Uuid, ScanTask>>,
    audit: Mutex<Vec<AuditRecord>>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn save(&self, task: &ScanTask) -> Result<()> {
        self.tasks.lock().insert(task.scan_id, task.clone());
        Ok(())
    }

    async fn get(&self, scan_id: Uuid, user_id: Option<&str>) -> Result<Option<ScanTask>> {
        let tasks = self.tasks.lock();
        Ok(tasks.get(&scan_id).filter(|t| matches_user(t, user_id)).cloned())
    }

    async fn list(&self, user_id: Option<&str>, limit: usize, offset: usize) -> Result<Vec<ScanTask>> {
        let tasks = self.tasks.lock();
        let mut matched: Vec<ScanTask> = tasks
            .values()
            .filter(|t| matches_user(t, user_id))
            .cloned()
            .collect();
        matched.sort_by_key(|t| std::cmp::Reverse(t.submitted_at));
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, scan_id: Uuid) -> Result<()> {
        self.tasks.lock().remove(&scan_id);
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|_, t| t.submitted_at >= cutoff);
        Ok((before - tasks.len()) as u64)
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        self.audit.lock().push(record.clone());
        Ok(())
    }
}

fn matches_user(task: &ScanTask, user_id: Option<&str>) -> bool {
    match user_id {
        Some(uid) => task.user_id.as_deref() == Some(uid),
        None => true,
    }
}
