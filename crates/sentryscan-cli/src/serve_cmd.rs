//! `sentryscan serve` — wires up the collaborators (coordinator, cache,
//! CVE enricher, task registry, storage backend) into an `AppState` and
//! runs the HTTP/WebSocket/SSE server.

use anyhow::{Context, Result};
use dashmap::DashMap;
use sentryscan_core::Config;
use sentryscan_engine::{Coordinator, CoordinatorLimits, CveEnricher, ScanCache, TaskRegistry};
use sentryscan_server::policy::ListPaths;
use sentryscan_server::state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    listen: SocketAddr,
    config_path: Option<PathBuf>,
    database: Option<PathBuf>,
    denylist: PathBuf,
    allowlist: PathBuf,
    api_key: Option<String>,
    ws_token: Option<String>,
    retention_days: i64,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Config::load_from_str(&contents).context("parsing config file")?
        }
        None => Config::from_env(),
    };

    let coordinator = Coordinator::new(CoordinatorLimits {
        window: chrono::Duration::from_std(config.coordinator.window)
            .context("coordinator window duration out of range")?,
        requests_per_window: config.coordinator.rate_limit_per_minute,
        per_client_concurrency: config.coordinator.per_client_concurrency_limit,
        global_concurrency: config.coordinator.global_concurrency_limit,
    });

    let cache = ScanCache::new(config.cache.max_entries, config.cache.max_value_bytes);
    let cve = Arc::new(CveEnricher::new(cache.clone(), config.cve.cache_ttl.as_secs()));

    let store: Arc<dyn sentryscan_core::ScanStore> = match &database {
        Some(path) => Arc::new(
            sentryscan_storage::SqliteScanStore::connect(&format!("sqlite://{}", path.display()))
                .await
                .context("connecting to sqlite store")?,
        ),
        None => Arc::new(sentryscan_storage::MemoryScanStore::default()),
    };
    let registry = Arc::new(TaskRegistry::new(store.clone()));

    let state = Arc::new(AppState {
        config,
        coordinator,
        cache,
        cve,
        registry,
        store,
        buses: DashMap::new(),
        list_paths: ListPaths { denylist, allowlist },
        api_key,
        ws_token,
    });

    sentryscan_server::run(state, listen, retention_days)
        .await
        .context("server exited")?;
    Ok(())
}
