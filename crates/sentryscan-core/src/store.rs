//! `ScanStore` collaborator contract — the core consumes this trait
//! without knowing whether the backing store is SQLite or in-memory,
//! drawing a clean boundary between the scanning core and its
//! persistence collaborator.

use crate::error::Result;
use crate::types::{AuditRecord, ScanTask};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn save(&self, task: &ScanTask) -> Result<()>;
    async fn get(&self, scan_id: Uuid, user_id: Option<&str>) -> Result<Option<ScanTask>>;
    async fn list(&self, user_id: Option<&str>, limit: usize, offset: usize) -> Result<Vec<ScanTask>>;
    async fn delete(&self, scan_id: Uuid) -> Result<()>;
    async fn delete_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64>;
    async fn append_audit(&self, record: &AuditRecord) -> Result<()>;
}
