//! Adaptive Controller — tunes the worker pool's `max_concurrent` and
//! per-probe timeout from a sliding window of success/failure outcomes,
//! using a circular buffer, periodic adjustment, and floor/ceiling
//! clamps, driven by a success ratio against fixed thresholds.

use parking_lot::Mutex;
use sentryscan_probe::{LiveParams, ProbeObserver};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_WINDOW: usize = 50;
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

const MIN_CONCURRENCY: usize = 1;
const MAX_CONCURRENCY: usize = 2000;
const MIN_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_TIMEOUT: Duration = Duration::from_secs(10);

struct Window {
    outcomes: VecDeque<bool>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, success: bool) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn success_ratio(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let successes = self.outcomes.iter().filter(|o| **o).count();
        Some(successes as f64 / self.outcomes.len() as f64)
    }

    fn is_full(&self) -> bool {
        self.outcomes.len() == self.capacity
    }
}

/// Observes probe outcomes and periodically retunes `params`. `Open` and
/// `Closed` count as success (the connection attempt completed); `Filtered`
/// counts as failure (timeout or unreachable).
pub struct AdaptiveController {
    params: Arc<LiveParams>,
    window: Mutex<Window>,
    last_adjust: Mutex<Instant>,
    min_interval: Duration,
}

impl AdaptiveController {
    pub fn new(params: Arc<LiveParams>) -> Self {
        Self::with_window(params, DEFAULT_WINDOW, DEFAULT_MIN_INTERVAL)
    }

    pub fn with_window(params: Arc<LiveParams>, window_size: usize, min_interval: Duration) -> Self {
        Self {
            params,
            window: Mutex::new(Window::new(window_size)),
            last_adjust: Mutex::new(Instant::now() - min_interval),
            min_interval,
        }
    }

    fn record_outcome(&self, success: bool) {
        self.window.lock().push(success);
        self.maybe_adjust();
    }

    fn maybe_adjust(&self) {
        let mut last = self.last_adjust.lock();
        if last.elapsed() < self.min_interval {
            return;
        }

        let window = self.window.lock();
        let Some(ratio) = window.success_ratio() else {
            return;
        };
        let window_full = window.is_full();
        drop(window);

        let current_concurrency = self.params.max_concurrent();
        let current_timeout = self.params.timeout();

        let (new_concurrency, new_timeout) = if ratio > 0.85 {
            let bumped = ((current_concurrency as f64) * 1.10).round() as usize;
            let shrunk = current_timeout.mul_f64(0.95);
            (
                bumped.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
                shrunk.clamp(MIN_TIMEOUT, MAX_TIMEOUT),
            )
        } else if ratio < 0.5 {
            let dropped = ((current_concurrency as f64) * 0.8).round() as usize;
            let stretched = current_timeout.mul_f64(1.20);
            let floor_concurrency = if window_full && ratio == 0.0 {
                MIN_CONCURRENCY
            } else {
                dropped.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
            };
            let ceiling_timeout = if window_full && ratio == 0.0 {
                MAX_TIMEOUT
            } else {
                stretched.clamp(MIN_TIMEOUT, MAX_TIMEOUT)
            };
            (floor_concurrency, ceiling_timeout)
        } else {
            (current_concurrency, current_timeout)
        };

        if new_concurrency != current_concurrency || new_timeout != current_timeout {
            debug!(
                ratio,
                current_concurrency, new_concurrency, ?current_timeout, ?new_timeout, "adaptive tuning"
            );
            self.params.set_max_concurrent(new_concurrency);
            self.params.set_timeout(new_timeout);
        }

        *last = Instant::now();
    }
}

impl ProbeObserver for AdaptiveController {
    fn record(&self, state: sentryscan_core::types::PortState, _elapsed: Duration) {
        use sentryscan_core::types::PortState;
        let success = matches!(state, PortState::Open | PortState::Closed);
        self.record_outcome(success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (Arc<LiveParams>, AdaptiveController) {
        let params = Arc::new(LiveParams::new(100, Duration::from_secs(1)));
        let controller = AdaptiveController::with_window(params.clone(), 10, Duration::ZERO);
        (params, controller)
    }

    #[test]
    fn high_success_ratio_raises_concurrency_and_lowers_timeout() {
        let (params, controller) = controller();
        for _ in 0..10 {
            controller.record_outcome(true);
        }
        assert!(params.max_concurrent() > 100);
        assert!(params.timeout() < Duration::from_secs(1));
    }

    #[test]
    fn low_success_ratio_drops_concurrency_and_raises_timeout() {
        let (params, controller) = controller();
        for _ in 0..10 {
            controller.record_outcome(false);
        }
        assert_eq!(params.max_concurrent(), MIN_CONCURRENCY);
        assert_eq!(params.timeout(), MAX_TIMEOUT);
    }

    #[test]
    fn mid_range_ratio_holds_steady() {
        let (params, controller) = controller();
        for i in 0..10 {
            controller.record_outcome(i % 2 == 0);
        }
        assert_eq!(params.max_concurrent(), 100);
        assert_eq!(params.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn adjustment_respects_minimum_interval() {
        let params = Arc::new(LiveParams::new(100, Duration::from_secs(1)));
        let controller = AdaptiveController::with_window(params.clone(), 2, Duration::from_secs(60));
        controller.record_outcome(false);
        controller.record_outcome(false);
        // First adjustment happens immediately because `last_adjust` starts
        // in the past by `min_interval`; the very next call is rate-limited.
        let after_first = params.max_concurrent();
        controller.record_outcome(false);
        assert_eq!(params.max_concurrent(), after_first);
    }
}
