//! Time source used by the token window and the pacing loop.
//!
//! Timestamps are fractional seconds since the Unix epoch so they survive a
//! process restart and can be written to the tracker snapshot as-is.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Source of wall-clock time and suspension.
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> f64;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by `SystemTime` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock for tests. Sleeping advances time instantly.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::sync::Mutex<f64>,
}

#[cfg(test)]
impl ManualClock {
    pub fn at(start: f64) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            now: std::sync::Mutex::new(start),
        })
    }

    pub fn set(&self, secs: f64) {
        *self.now.lock().expect("clock lock") = secs;
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().expect("clock lock") += secs;
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().expect("clock lock")
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_epoch_seconds() {
        let now = SystemClock.now();
        // 2020-01-01T00:00:00Z
        assert!(now > 1_577_836_800.0);
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::at(100.0);
        clock.sleep(Duration::from_millis(2_500)).await;
        assert!((clock.now() - 102.5).abs() < 1e-9);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }
}
