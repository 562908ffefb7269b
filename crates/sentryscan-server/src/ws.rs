//! WebSocket command channel at `/ws/command?token=…`: a shared-secret
//! token gate, then a `{command, force?, consent?}` request/response loop
//! emitting `ScanEvent`s plus the control frames (`auth_error`,
//! `rate_limit`, `denied`, `allowlist_notice`, `pre_scan_warning`,
//! `pre_scan_confirmation_needed`).

use crate::auth::constant_time_eq;
use crate::policy::{check_lists, is_reachable, ListVerdict};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use sentryscan_core::types::{AuditRecord, ScanTask};
use sentryscan_engine::orchestrator::{run_scan, OrchestratorDeps};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

const PRE_SCAN_PORTS: [u16; 2] = [80, 443];
const PRE_SCAN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    pub token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsCommand {
    command: String,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    consent: bool,
}

pub async fn ws_command(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsConnectParams>,
) -> Response {
    let Some(expected) = state.ws_token.clone() else {
        return (StatusCode::FORBIDDEN, "websocket token not configured").into_response();
    };
    match &params.token {
        Some(token) if constant_time_eq(token, &expected) => {}
        _ => return (StatusCode::UNAUTHORIZED, "invalid or missing token").into_response(),
    }

    let client_id = params.user_id.unwrap_or_else(|| "anonymous".to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_id: String) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            if matches!(msg, Message::Close(_)) {
                break;
            }
            continue;
        };

        let cmd: WsCommand = match serde_json::from_str(&text) {
            Ok(cmd) => cmd,
            Err(_) => {
                send_control(&mut sender, "denied", "malformed command frame").await;
                continue;
            }
        };

        let Some((target, ports)) = parse_scan_command(&cmd.command) else {
            send_control(&mut sender, "denied", "expected `scan <target> <ports>`").await;
            continue;
        };

        let should_close = run_one_scan(&state, &client_id, &target, &ports, cmd.force, cmd.consent, &mut sender, &mut receiver).await;
        if should_close {
            break;
        }
    }
}

/// Parses `scan <target> <ports>`. Returns `None` for anything else.
fn parse_scan_command(command: &str) -> Option<(String, String)> {
    let mut parts = command.split_whitespace();
    if parts.next()?.eq_ignore_ascii_case("scan") {
        let target = parts.next()?.to_string();
        let ports = parts.next().unwrap_or("1-1024").to_string();
        Some((target, ports))
    } else {
        None
    }
}

async fn send_control(sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin), kind: &str, detail: &str) {
    let frame = json!({ "type": kind, "detail": detail });
    let _ = sender.send(Message::Text(frame.to_string())).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scan_with_explicit_ports() {
        assert_eq!(
            parse_scan_command("scan example.com 1-1024"),
            Some(("example.com".to_string(), "1-1024".to_string()))
        );
    }

    #[test]
    fn parses_scan_defaulting_ports() {
        assert_eq!(
            parse_scan_command("scan example.com"),
            Some(("example.com".to_string(), "1-1024".to_string()))
        );
    }

    #[test]
    fn is_case_insensitive_on_the_verb() {
        assert_eq!(
            parse_scan_command("SCAN example.com 80"),
            Some(("example.com".to_string(), "80".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_verb() {
        assert_eq!(parse_scan_command("stop example.com"), None);
    }

    #[test]
    fn rejects_empty_command() {
        assert_eq!(parse_scan_command(""), None);
        assert_eq!(parse_scan_command("scan"), None);
    }
}

/// Runs a single `scan` command to completion, forwarding `ScanEvent`s to
/// the socket as they're published. Returns `true` when the socket should
/// be closed (client disconnected mid-scan).
async fn run_one_scan(
    state: &Arc<AppState>,
    client_id: &str,
    target: &str,
    ports: &str,
    force: bool,
    consent: bool,
    sender: &mut (futures::stream::SplitSink<WebSocket, Message>),
    receiver: &mut futures::stream::SplitStream<WebSocket>,
) -> bool {
    if let Err(e) = state.coordinator.admit(client_id).await {
        send_control(sender, "rate_limit", &e.to_string()).await;
        return false;
    }

    let resolved = match sentryscan_probe::resolve(target, false, &state.config.probe.private_ip_whitelist).await {
        Ok(t) => t,
        Err(e) => {
            send_control(sender, "denied", &e.to_string()).await;
            return false;
        }
    };

    let verdict = check_lists(&state.list_paths, target, Some(resolved.resolved_ip)).await;
    if verdict == ListVerdict::Denied {
        send_control(sender, "denied", &format!("{target} is deny-listed")).await;
        return false;
    }
    if verdict == ListVerdict::AllowlistNotice {
        send_control(sender, "allowlist_notice", &format!("{target} is not in the allowlist")).await;
    }

    if !force && !is_reachable(resolved.resolved_ip, &PRE_SCAN_PORTS, PRE_SCAN_TIMEOUT).await {
        send_control(
            sender,
            "pre_scan_warning",
            "target did not respond on ports 80/443",
        )
        .await;
        send_control(
            sender,
            "pre_scan_confirmation_needed",
            "resend with force=true to proceed",
        )
        .await;
        return false;
    }
    if force {
        let _ = state
            .store
            .append_audit(&AuditRecord {
                timestamp: chrono::Utc::now(),
                target: target.to_string(),
                resolved_ip: Some(resolved.resolved_ip),
                original_command: format!("scan {target} {ports}"),
                client_host: None,
                consent,
                note: Some("forced_via_ws".to_string()),
            })
            .await;
    }

    if let Err(e) = state.coordinator.begin_scan(client_id).await {
        send_control(sender, "rate_limit", &e.to_string()).await;
        return false;
    }

    let scan_id = Uuid::new_v4();
    let mut task = ScanTask::new(scan_id, target.to_string(), ports.to_string(), Some(client_id.to_string()));
    let task_id = state.registry.submit(task.clone());
    let bus = state.bus_for(task_id);
    let mut events = bus.subscribe();
    let cancel = CancellationToken::new();

    let deps = OrchestratorDeps {
        coordinator: state.coordinator.clone(),
        cache: state.cache.clone(),
        cve: state.cve.clone(),
        allow_private: false,
        whitelist: state.config.probe.private_ip_whitelist.clone(),
        initial_concurrency: state.config.adaptive.initial_concurrency,
        initial_timeout: state.config.adaptive.initial_timeout,
        cache_ttl_secs: state.config.cache.ttl.as_secs(),
    };

    let run_handle = tokio::spawn({
        let bus = bus.clone();
        let cancel = cancel.clone();
        let client_id = client_id.to_string();
        async move {
            let _ = run_scan(&deps, &mut task, &bus, &client_id, cancel).await;
            task
        }
    });

    let disconnected = loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        let done = matches!(event, sentryscan_core::types::ScanEvent::ScanComplete | sentryscan_core::types::ScanEvent::Error { .. });
                        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                        if sender.send(Message::Text(json)).await.is_err() {
                            break true;
                        }
                        if done {
                            break false;
                        }
                    }
                    None => break false,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break true,
                    Some(Err(_)) => break true,
                    _ => {}
                }
            }
        }
    };

    if disconnected {
        cancel.cancel();
    }

    match run_handle.await {
        Ok(completed_task) => state.registry.update(task_id, |t| {
            t.state = completed_task.state;
            t.error = completed_task.error.clone();
            t.completed_at = completed_task.completed_at;
            t.cached = completed_task.cached;
        }),
        Err(e) => warn!(%task_id, error = %e, "ws scan task panicked"),
    }
    let _ = state.registry.persist(task_id).await;
    state.drop_bus(task_id);

    disconnected
}
