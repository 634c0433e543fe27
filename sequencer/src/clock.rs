//! Time source abstraction
//!
//! Instructions read the current instant and suspend between polls through a
//! [`Clock`], so tests can substitute a clock that does not really sleep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often a pending wait checks the cancellation flag
pub const CANCELLATION_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);

    /// Resolve once `token` is set, checking it every [`CANCELLATION_CHECK_INTERVAL`]
    async fn wait_for_cancellation(&self, token: &AtomicBool) {
        while !token.load(Ordering::Relaxed) {
            tokio::time::sleep(CANCELLATION_CHECK_INTERVAL).await;
        }
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Clock frozen at a fixed instant that records requested sleeps instead of sleeping.
    ///
    /// Sleeps return after a single yield, or never when `hold_sleeps` is set.
    /// Cancellation is noticed on the next yield without any time passing.
    pub struct FixedClock {
        pub instant: DateTime<Utc>,
        pub sleeps: Mutex<Vec<Duration>>,
        pub hold_sleeps: bool,
    }

    impl FixedClock {
        pub fn new(instant: DateTime<Utc>) -> Self {
            Self {
                instant,
                sleeps: Mutex::new(Vec::new()),
                hold_sleeps: false,
            }
        }

        /// Sleeps never complete, so only cancellation ends a wait
        pub fn holding_sleeps(mut self) -> Self {
            self.hold_sleeps = true;
            self
        }

        pub fn sleep_count(&self) -> usize {
            self.sleeps.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.instant
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            if self.hold_sleeps {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
        }

        async fn wait_for_cancellation(&self, token: &AtomicBool) {
            while !token.load(Ordering::Relaxed) {
                tokio::task::yield_now().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_sleep_advances_tokio_time() {
        let start = tokio::time::Instant::now();
        SystemClock.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_notices_cancellation_within_one_check() {
        let token = Arc::new(AtomicBool::new(false));
        let setter = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            setter.store(true, Ordering::Relaxed);
        });

        let start = tokio::time::Instant::now();
        SystemClock.wait_for_cancellation(&token).await;
        assert!(start.elapsed() <= Duration::from_millis(250) + CANCELLATION_CHECK_INTERVAL);
    }

    #[test]
    fn test_system_clock_now_is_recent() {
        let now = SystemClock.now();
        assert!((Utc::now() - now).num_seconds().abs() < 5);
    }
}
