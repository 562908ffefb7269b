//! Probe Worker Pool — bounded-parallel TCP-connect probes with a
//! per-port timeout, mapped onto a four-state outcome table. No retries
//! here — retries are the Adaptive Controller's job via timeout/
//! concurrency tuning, not the worker's.

use sentryscan_core::types::{PortResult, PortState, Protocol};
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Observes the outcome of every probe attempt so the Adaptive Controller
/// can tune `max_concurrent`/timeout mid-scan. Implemented as a trait
/// rather than a concrete type so the worker pool has no dependency on
/// the controller's internals.
pub trait ProbeObserver: Send + Sync {
    fn record(&self, state: PortState, elapsed: Duration);
}

pub struct NullObserver;
impl ProbeObserver for NullObserver {
    fn record(&self, _state: PortState, _elapsed: Duration) {}
}

/// Live, controller-owned knobs the worker pool reads per probe instead
/// of capturing a fixed timeout/concurrency at construction time (spec
/// §4.H: "F never reads configuration directly during the scan").
pub struct LiveParams {
    max_concurrent: AtomicUsize,
    timeout_millis: AtomicUsize,
}

impl LiveParams {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            max_concurrent: AtomicUsize::new(max_concurrent),
            timeout_millis: AtomicUsize::new(timeout.as_millis() as usize),
        }
    }

    pub fn set_max_concurrent(&self, v: usize) {
        self.max_concurrent.store(v, Ordering::Relaxed);
    }

    pub fn set_timeout(&self, d: Duration) {
        self.timeout_millis.store(d.as_millis() as usize, Ordering::Relaxed);
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::Relaxed)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis.load(Ordering::Relaxed) as u64)
    }
}

/// Given a set of ports on `target_ip`, probe each with bounded
/// parallelism honoring `params`'s live concurrency/timeout, cancellable
/// via `cancel`. Returns one `PortResult` per port, in arbitrary order.
pub async fn probe_ports(
    target_ip: IpAddr,
    ports: &[u16],
    params: Arc<LiveParams>,
    observer: Arc<dyn ProbeObserver>,
    cancel: tokio_util::sync::CancellationToken,
) -> Vec<PortResult> {
    let semaphore = Arc::new(Semaphore::new(params.max_concurrent().max(1)));
    let mut handles = Vec::with_capacity(ports.len());

    for &port in ports {
        let semaphore = semaphore.clone();
        let params = params.clone();
        let observer = observer.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return PortResult::new(port, PortState::Filtered);
            };
            if cancel.is_cancelled() {
                return PortResult::new(port, PortState::Filtered);
            }
            probe_one(target_ip, port, &params, observer.as_ref(), &cancel).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(result) = handle.await {
            results.push(result);
        }
    }
    results
}

async fn probe_one(
    target_ip: IpAddr,
    port: u16,
    params: &LiveParams,
    observer: &dyn ProbeObserver,
    cancel: &tokio_util::sync::CancellationToken,
) -> PortResult {
    let addr = SocketAddr::new(target_ip, port);
    let probe_timeout = params.timeout();
    let start = Instant::now();

    let outcome = tokio::select! {
        res = timeout(probe_timeout, TcpStream::connect(addr)) => res,
        _ = cancel.cancelled() => {
            return PortResult::new(port, PortState::Filtered);
        }
    };

    let (state, reason) = match outcome {
        Ok(Ok(_stream)) => {
            debug!(port, "open");
            (PortState::Open, None)
        }
        Ok(Err(e)) => match e.kind() {
            ErrorKind::ConnectionRefused => (PortState::Closed, None),
            ErrorKind::TimedOut | ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => {
                (PortState::Filtered, Some(e.to_string()))
            }
            _ => (PortState::Closed, Some(e.to_string())),
        },
        Err(_elapsed) => {
            trace!(port, "timeout");
            (PortState::Filtered, None)
        }
    };

    let elapsed = start.elapsed();
    observer.record(state, elapsed);

    let mut result = PortResult::new(port, state);
    result.protocol = Protocol::Tcp;
    result.reason = reason;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_detected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let params = Arc::new(LiveParams::new(4, Duration::from_millis(300)));
        let results = probe_ports(
            "127.0.0.1".parse().unwrap(),
            &[port],
            params,
            Arc::new(NullObserver),
            tokio_util::sync::CancellationToken::new(),
        )
        .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, PortState::Open);
    }

    #[tokio::test]
    async fn closed_port_detected() {
        // Bind then immediately drop to free the port but make a refusal likely.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let params = Arc::new(LiveParams::new(4, Duration::from_millis(300)));
        let results = probe_ports(
            "127.0.0.1".parse().unwrap(),
            &[port],
            params,
            Arc::new(NullObserver),
            tokio_util::sync::CancellationToken::new(),
        )
        .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, PortState::Closed);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_pending_probes() {
        let params = Arc::new(LiveParams::new(1, Duration::from_secs(5)));
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();

        let results = probe_ports(
            "127.0.0.1".parse().unwrap(),
            &[1, 2, 3],
            params,
            Arc::new(NullObserver),
            cancel,
        )
        .await;

        assert!(results.iter().all(|r| r.state == PortState::Filtered));
    }
}
