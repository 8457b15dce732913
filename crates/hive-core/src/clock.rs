//! Injected clock (spec §4.8, §6.2): the runtime must never call wall-clock
//! `now` for ordering decisions, only for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now_nanoseconds(&self) -> u64;
    /// Cancellable sleep; returns early (without error) if `cancel` fires.
    async fn sleep(&self, nanoseconds: u64, cancel: &CancellationToken);
}

/// Real-time clock backed by `tokio::time::sleep`.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_nanoseconds(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }

    async fn sleep(&self, nanoseconds: u64, cancel: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_nanos(nanoseconds)) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

/// Deterministic clock for retry-determinism tests (spec §8.2 scenario 5):
/// records every requested sleep duration without actually sleeping, and
/// advances a monotonic counter callers can read back.
#[derive(Debug, Default)]
pub struct RecordingClock {
    recorded: std::sync::Mutex<Vec<u64>>,
    now: AtomicU64,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded_sleeps(&self) -> Vec<u64> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    fn now_nanoseconds(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, nanoseconds: u64, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        self.recorded.lock().unwrap().push(nanoseconds);
        self.now.fetch_add(nanoseconds, Ordering::SeqCst);
    }
}
