//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests go straight to the fallback
//! - Half-Open: a bounded number of probes test whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first admission attempt after open_duration
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (open timer restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per route entry, shared by all of that route's requests
//! - Every transition happens under the breaker's own lock
//! - Admission returns a permit; outcomes are reported through it, and a
//!   permit dropped without an outcome (cancelled request) frees its probe slot

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub open_duration: Duration,
    pub half_open_probes: u32,
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            open_duration: Duration::from_millis(config.open_duration_ms),
            half_open_probes: config.half_open_probes.max(1),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probes_in_flight: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The guarded data is plain counters; a panic mid-update cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask to call the upstream. `None` means short-circuit to the fallback.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BreakerPermit> {
        let mut inner = self.lock();

        let probe = match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.settings.open_duration);
                if !cooled_down {
                    return None;
                }
                self.transition(&mut inner, BreakerState::HalfOpen);
                inner.probes_in_flight = 1;
                true
            }
            BreakerState::HalfOpen => {
                if inner.probes_in_flight >= self.settings.half_open_probes {
                    return None;
                }
                inner.probes_in_flight += 1;
                true
            }
        };

        Some(BreakerPermit {
            breaker: self.clone(),
            probe,
            reported: false,
        })
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }

        match inner.state {
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::HalfOpen if probe => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.transition(&mut inner, BreakerState::Closed);
            }
            // Late results from calls admitted before the circuit opened.
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }

        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.settings.failure_threshold {
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen if probe => {
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, BreakerState::Open);
            }
            _ => {}
        }
    }

    fn on_abandoned(&self, probe: bool) {
        if probe {
            let mut inner = self.lock();
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        match to {
            BreakerState::Open => tracing::warn!(
                breaker = %self.name,
                from = from.as_str(),
                failures = inner.consecutive_failures,
                "Circuit opened"
            ),
            _ => tracing::info!(
                breaker = %self.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit state changed"
            ),
        }
        metrics::record_breaker_transition(&self.name, to.as_str());
    }
}

/// Admission to call the upstream once. Report the outcome with
/// [`BreakerPermit::success`] or [`BreakerPermit::failure`].
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    reported: bool,
}

impl BreakerPermit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.probe);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.on_abandoned(self.probe);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "testCircuitBreaker",
            BreakerSettings {
                failure_threshold: threshold,
                open_duration: Duration::from_secs(10),
                half_open_probes: 1,
            },
        ))
    }

    fn trip(cb: &Arc<CircuitBreaker>, times: u32) {
        for _ in 0..times {
            cb.try_acquire().unwrap().failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_short_circuits() {
        let cb = breaker(3);
        trip(&cb, 2);
        assert_eq!(cb.state(), BreakerState::Closed);

        trip(&cb, 1);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3);
        trip(&cb, 2);
        cb.try_acquire().unwrap().success();
        assert_eq!(cb.consecutive_failures(), 0);

        trip(&cb, 2);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_after_cool_down() {
        let cb = breaker(1);
        trip(&cb, 1);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cb.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        let probe = cb.try_acquire().expect("probe admitted after cool-down");
        assert!(probe.is_probe());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.try_acquire().is_none(), "only one probe at a time");

        probe.success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(!cb.try_acquire().unwrap().is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens_with_fresh_timer() {
        let cb = breaker(1);
        trip(&cb, 1);
        tokio::time::advance(Duration::from_secs(10)).await;

        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cb.try_acquire().is_none());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_frees_slot() {
        let cb = breaker(1);
        trip(&cb, 1);
        tokio::time::advance(Duration::from_secs(10)).await;

        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_does_not_extend_open_state() {
        let cb = breaker(1);
        let early = cb.try_acquire().unwrap();
        trip(&cb, 1);
        early.failure();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.try_acquire().is_some());
    }

    #[test]
    fn test_concurrent_failures_are_all_counted() {
        let cb = Arc::new(CircuitBreaker::new(
            "concurrent",
            BreakerSettings {
                failure_threshold: 1_000,
                open_duration: Duration::from_secs(10),
                half_open_probes: 1,
            },
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = cb.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cb.try_acquire().unwrap().failure();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cb.consecutive_failures(), 400);
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
