//! Single-flight health probing.
//!
//! At most one check runs per upstream at any time. A check that fails keeps
//! retrying with a growing delay until it succeeds, and every trigger that
//! arrives meanwhile (timer tick or failed query) is dropped.

use ferrous_forward_domain::DomainError;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type CheckFuture = Pin<Box<dyn Future<Output = Result<(), DomainError>> + Send>>;

/// A health check that can be started any number of times.
pub type CheckFn = Arc<dyn Fn() -> CheckFuture + Send + Sync>;

const MAX_BACKOFF_MULTIPLIER: u32 = 4;
const FAILURES_PER_STEP: u32 = 3;

/// Retry delay schedule: 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, ... times the interval.
#[derive(Debug, Clone)]
struct Backoff {
    multiplier: u32,
    attempt: u32,
}

impl Backoff {
    fn new() -> Self {
        Self {
            multiplier: 1,
            attempt: 1,
        }
    }

    fn next_delay(&mut self, interval: Duration) -> Duration {
        let delay = interval * self.multiplier;
        self.attempt += 1;
        if self.attempt % FAILURES_PER_STEP == 0 {
            self.multiplier = (self.multiplier + 1).min(MAX_BACKOFF_MULTIPLIER);
        }
        delay
    }
}

struct ProbeState {
    in_progress: Mutex<bool>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ProbeState {
    fn finish(&self) {
        *self.in_progress.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn do_check(self: &Arc<Self>, check: CheckFn) -> bool {
        {
            let mut guard = self.in_progress.lock().unwrap_or_else(PoisonError::into_inner);
            if *guard {
                return false;
            }
            *guard = true;
        }

        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut backoff = Backoff::new();
            while !state.shutdown.is_cancelled() {
                match check().await {
                    Ok(()) => break,
                    Err(e) => {
                        let delay = backoff.next_delay(state.interval);
                        debug!(error = %e, retry_in_ms = delay.as_millis() as u64, "Health check failed");
                        tokio::select! {
                            _ = state.shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
            state.finish();
        });

        true
    }
}

pub struct Probe {
    state: Arc<ProbeState>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Probe {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Arc::new(ProbeState {
                in_progress: Mutex::new(false),
                interval,
                shutdown: CancellationToken::new(),
            }),
            ticker: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.state.interval
    }

    pub fn is_in_progress(&self) -> bool {
        *self
            .state
            .in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `check` unless one is already in flight. Returns whether it was accepted.
    pub fn do_check(&self, check: CheckFn) -> bool {
        if self.state.shutdown.is_cancelled() {
            return false;
        }
        self.state.do_check(check)
    }

    /// Trigger `check` once per interval until [`stop`](Self::stop).
    pub fn start(&self, check: CheckFn) {
        let state = Arc::clone(&self.state);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(state.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = state.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        state.do_check(Arc::clone(&check));
                    }
                }
            }
        });

        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = ticker.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the timer loop and any retrying check, waiting for the loop to exit.
    pub async fn stop(&self) {
        self.state.shutdown.cancel();

        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
