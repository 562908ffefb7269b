//! HTTP routes: scan submission, status polling, and SSE streaming.

use crate::auth::extract_bearer_token;
use crate::error_response::ApiError;
use crate::policy::{check_lists, is_reachable, ListVerdict};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::Stream;
use sentryscan_core::types::ScanTask;
use sentryscan_core::Error;
use sentryscan_engine::orchestrator::{run_scan, OrchestratorDeps};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

const PRE_SCAN_PORTS: [u16; 2] = [80, 443];
const PRE_SCAN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct SubmitScanRequest {
    pub target: String,
    pub ports: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub allow_private: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitScanResponse {
    pub task_id: Uuid,
    pub scan_id: Uuid,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowlist_notice: Option<String>,
}

fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(extract_bearer_token);
    match provided {
        Some(token) if crate::auth::constant_time_eq(token, expected) => Ok(()),
        _ => Err(ApiError(Error::Unauthorized("missing or invalid API key".to_string()))),
    }
}

pub async fn submit_scan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&state, &headers)?;

    let client_id = req.user_id.clone().unwrap_or_else(|| "anonymous".to_string());
    state.coordinator.admit(&client_id).await?;

    let target = sentryscan_probe::resolve(
        &req.target,
        req.allow_private,
        &state.config.probe.private_ip_whitelist,
    )
    .await?;

    let verdict = check_lists(&state.list_paths, &req.target, Some(target.resolved_ip)).await;
    if verdict == ListVerdict::Denied {
        return Err(ApiError(Error::Denied(format!("{} is deny-listed", req.target))));
    }

    if !req.force && !is_reachable(target.resolved_ip, &PRE_SCAN_PORTS, PRE_SCAN_TIMEOUT).await {
        return Err(ApiError(Error::Denied(
            "target did not respond on common web ports; resubmit with force=true to proceed".to_string(),
        )));
    }
    if req.force {
        state
            .store
            .append_audit(&sentryscan_core::types::AuditRecord {
                timestamp: chrono::Utc::now(),
                target: req.target.clone(),
                resolved_ip: Some(target.resolved_ip),
                original_command: format!("scan {} {}", req.target, req.ports),
                client_host: None,
                consent: true,
                note: Some("forced_via_http".to_string()),
            })
            .await?;
    }

    state.coordinator.begin_scan(&client_id).await?;

    let scan_id = Uuid::new_v4();
    let task = ScanTask::new(scan_id, req.target.clone(), req.ports.clone(), req.user_id.clone());
    let task_id = state.registry.submit(task);

    let raw_target = req.target.clone();
    let bus = state.bus_for(task_id);
    let state_for_task = state.clone();
    let cancel = CancellationToken::new();

    tokio::spawn(
        async move {
            let deps = OrchestratorDeps {
                coordinator: state_for_task.coordinator.clone(),
                cache: state_for_task.cache.clone(),
                cve: state_for_task.cve.clone(),
                allow_private: req.allow_private,
                whitelist: state_for_task.config.probe.private_ip_whitelist.clone(),
                initial_concurrency: state_for_task.config.adaptive.initial_concurrency,
                initial_timeout: state_for_task.config.adaptive.initial_timeout,
                cache_ttl_secs: state_for_task.config.cache.ttl.as_secs(),
            };

            let mut task_copy = ScanTask::new(scan_id, req.target.clone(), req.ports.clone(), req.user_id.clone());
            task_copy.task_id = task_id;
            let _ = run_scan(&deps, &mut task_copy, &bus, &client_id, cancel).await;

            state_for_task.registry.update(task_id, |t| {
                t.state = task_copy.state;
                t.error = task_copy.error.clone();
                t.completed_at = task_copy.completed_at;
                t.cached = task_copy.cached;
            });
            let _ = state_for_task.registry.persist(task_id).await;
            state_for_task.drop_bus(task_id);
        }
        .instrument(info_span!("scan", %scan_id, %task_id)),
    );

    let allowlist_notice = (verdict == ListVerdict::AllowlistNotice)
        .then(|| format!("{raw_target} is not in the allowlist; proceeding with caution"));

    Ok(Json(SubmitScanResponse {
        task_id,
        scan_id,
        state: "queued",
        allowlist_notice,
    }))
}

pub async fn get_scan_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&state, &headers)?;
    match state.registry.status(task_id, None).await? {
        Some(task) => Ok(Json(task)),
        None => Err(ApiError(Error::Internal("task not found".to_string()))),
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub task_id: Uuid,
}

pub async fn stream_scan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    require_api_key(&state, &headers)?;

    let rx = {
        let Some(bus) = state.buses.get(&query.task_id) else {
            return Err(ApiError(Error::Internal("scan is not currently streaming".to_string())));
        };
        bus.subscribe()
    };

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Some((Ok(Event::default().data(json)), rx))
    });

    Ok(Sse::new(stream))
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}
