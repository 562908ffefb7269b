//! Task Registry — assigns task IDs, tracks in-memory state for fast
//! status polling, and persists through the pluggable `ScanStore`: a hot
//! in-memory index backed by a durable store.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use sentryscan_core::{Result, ScanStore, ScanTask};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct TaskRegistry {
    store: Arc<dyn ScanStore>,
    hot: DashMap<Uuid, ScanTask>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn ScanStore>) -> Self {
        Self {
            store,
            hot: DashMap::new(),
        }
    }

    /// Deletes tasks older than `retention_days`. Intended to run once at
    /// process startup.
    pub async fn enforce_retention(&self, retention_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days);
        let deleted = self.store.delete_older_than(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "retention sweep removed expired tasks");
        }
        Ok(deleted)
    }

    pub fn submit(&self, task: ScanTask) -> Uuid {
        let task_id = task.task_id;
        self.hot.insert(task_id, task);
        task_id
    }

    pub fn update<F: FnOnce(&mut ScanTask)>(&self, task_id: Uuid, f: F) {
        if let Some(mut entry) = self.hot.get_mut(&task_id) {
            f(&mut entry);
        }
    }

    pub async fn persist(&self, task_id: Uuid) -> Result<()> {
        if let Some(task) = self.hot.get(&task_id) {
            self.store.save(&task).await?;
        }
        Ok(())
    }

    pub async fn status(&self, task_id: Uuid, user_id: Option<&str>) -> Result<Option<ScanTask>> {
        if let Some(task) = self.hot.get(&task_id) {
            return Ok(Some(task.clone()));
        }
        self.store.get(task_id, user_id).await
    }

    pub fn evict_from_memory(&self, task_id: Uuid) {
        self.hot.remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentryscan_core::AuditRecord;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        tasks: Mutex<Vec<ScanTask>>,
    }

    #[async_trait::async_trait]
    impl ScanStore for InMemoryStore {
        async fn save(&self, task: &ScanTask) -> Result<()> {
            self.tasks.lock().unwrap().push(task.clone());
            Ok(())
        }
        async fn get(&self, scan_id: Uuid, _user_id: Option<&str>) -> Result<Option<ScanTask>> {
            Ok(self.tasks.lock().unwrap().iter().find(|t| t.scan_id == scan_id).cloned())
        }
        async fn list(&self, _user_id: Option<&str>, _limit: usize, _offset: usize) -> Result<Vec<ScanTask>> {
            Ok(self.tasks.lock().unwrap().clone())
        }
        async fn delete(&self, scan_id: Uuid) -> Result<()> {
            self.tasks.lock().unwrap().retain(|t| t.scan_id != scan_id);
            Ok(())
        }
        async fn delete_older_than(&self, cutoff: chrono::DateTime<Utc>) -> Result<u64> {
            let mut tasks = self.tasks.lock().unwrap();
            let before = tasks.len();
            tasks.retain(|t| t.submitted_at >= cutoff);
            Ok((before - tasks.len()) as u64)
        }
        async fn append_audit(&self, _record: &AuditRecord) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn submit_then_status_reads_from_hot_map() {
        let registry = TaskRegistry::new(Arc::new(InMemoryStore::default()));
        let task = ScanTask::new(Uuid::new_v4(), "example.com".to_string(), "1-100".to_string(), None);
        let task_id = registry.submit(task);
        let status = registry.status(task_id, None).await.unwrap();
        assert!(status.is_some());
    }

    #[tokio::test]
    async fn status_falls_back_to_store_once_evicted_from_memory() {
        let registry = TaskRegistry::new(Arc::new(InMemoryStore::default()));
        let scan_id = Uuid::new_v4();
        let task = ScanTask::new(scan_id, "example.com".to_string(), "1-100".to_string(), None);
        let task_id = registry.submit(task);
        registry.persist(task_id).await.unwrap();
        registry.evict_from_memory(task_id);

        let status = registry.status(task_id, None).await.unwrap();
        assert!(status.is_none());
        let by_scan_id = registry.store.get(scan_id, None).await.unwrap();
        assert!(by_scan_id.is_some());
    }
}
