//! Shared application state threaded through every handler: no global
//! statics, everything flows through one `Arc<AppState>`.

use crate::policy::ListPaths;
use dashmap::DashMap;
use sentryscan_core::{Config, ScanEventBus, ScanStore};
use sentryscan_engine::{Coordinator, CveEnricher, ScanCache, TaskRegistry};
use std::sync::Arc;
use uuid::Uuid;

pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<Coordinator>,
    pub cache: Arc<ScanCache>,
    pub cve: Arc<CveEnricher>,
    pub registry: Arc<TaskRegistry>,
    pub store: Arc<dyn ScanStore>,
    pub buses: DashMap<Uuid, ScanEventBus>,
    pub list_paths: ListPaths,
    pub api_key: Option<String>,
    pub ws_token: Option<String>,
}

impl AppState {
    pub fn bus_for(&self, task_id: Uuid) -> ScanEventBus {
        self.buses.entry(task_id).or_default().clone()
    }

    pub fn drop_bus(&self, task_id: Uuid) {
        self.buses.remove(&task_id);
    }
}
