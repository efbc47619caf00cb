//! Sliding-window rate limiter shared by every outbound provider call.
//!
//! Call timestamps are kept for one window (60 seconds by default). Bursts are
//! admitted up to the window limit; after that a caller waits until the
//! oldest call leaves the window.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_calls_per_minute == 0` disables limiting.
    pub fn new(max_calls_per_minute: usize) -> Self {
        Self::with_window(max_calls_per_minute, DEFAULT_WINDOW)
    }

    pub fn with_window(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// How long the caller must wait before it may call. Zero means go now.
    pub fn admit(&self) -> Duration {
        self.admit_at(Instant::now())
    }

    pub fn admit_at(&self, now: Instant) -> Duration {
        let mut calls = self.lock();
        self.wait_time(&mut calls, now)
    }

    /// Record a call; invoke immediately before dispatching the request.
    pub fn record_call(&self) {
        self.record_call_at(Instant::now());
    }

    pub fn record_call_at(&self, now: Instant) {
        if self.max_calls == 0 {
            return;
        }
        self.lock().push_back(now);
    }

    /// Admit and record in one step if the window has room, otherwise report
    /// the wait. Concurrent callers cannot both take the last free slot.
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        if self.max_calls == 0 {
            return Ok(());
        }
        let mut calls = self.lock();
        let wait = self.wait_time(&mut calls, now);
        if wait.is_zero() {
            calls.push_back(now);
            Ok(())
        } else {
            Err(wait)
        }
    }

    /// Wait until a slot is free and take it. The lock is released before
    /// sleeping.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire_at(Instant::now()) {
                Ok(()) => return,
                Err(wait) => {
                    debug!("Rate limit reached, waiting {:?}", wait);
                    sleep(wait).await;
                }
            }
        }
    }

    fn wait_time(&self, calls: &mut VecDeque<Instant>, now: Instant) -> Duration {
        if self.max_calls == 0 {
            return Duration::ZERO;
        }

        // Evict calls that have left the window
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() < self.max_calls {
            return Duration::ZERO;
        }

        // Wait for enough of the oldest calls to expire to free one slot
        let blocking = calls[calls.len() - self.max_calls];
        (blocking + self.window).saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    /// Drive `requests` calls through the limiter using a synthetic clock,
    /// honoring every wait, and return the recorded timestamps.
    fn simulate(limiter: &RateLimiter, start: Instant, gaps: &[Duration]) -> Vec<Instant> {
        let mut now = start;
        let mut recorded = Vec::new();
        for gap in gaps {
            now += *gap;
            loop {
                let wait = limiter.admit_at(now);
                if wait.is_zero() {
                    limiter.record_call_at(now);
                    recorded.push(now);
                    break;
                }
                now += wait;
            }
        }
        recorded
    }

    fn max_in_any_window(times: &[Instant], window: Duration) -> usize {
        times
            .iter()
            .map(|&start| {
                times
                    .iter()
                    .filter(|&&t| t >= start && t.duration_since(start) < window)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    // ==================== Admission Tests ====================

    #[test]
    fn test_burst_up_to_limit_is_admitted() {
        let limiter = RateLimiter::new(5);
        let now = Instant::now();
        for _ in 0..5 {
            assert_eq!(limiter.admit_at(now), Duration::ZERO);
            limiter.record_call_at(now);
        }
        assert_eq!(limiter.admit_at(now), DEFAULT_WINDOW);
    }

    #[test]
    fn test_wait_is_time_until_oldest_leaves_window() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        limiter.record_call_at(start);
        limiter.record_call_at(start + Duration::from_secs(10));

        let now = start + Duration::from_secs(15);
        assert_eq!(limiter.admit_at(now), Duration::from_secs(45));

        // Once the oldest call has expired there is room again
        assert_eq!(limiter.admit_at(start + DEFAULT_WINDOW), Duration::ZERO);
    }

    #[test]
    fn test_zero_limit_disables_limiting() {
        let limiter = RateLimiter::new(0);
        let now = Instant::now();
        for _ in 0..100 {
            limiter.record_call_at(now);
        }
        assert_eq!(limiter.admit_at(now), Duration::ZERO);
    }

    #[test]
    fn test_zero_limit_keeps_no_history() {
        let limiter = RateLimiter::new(0);
        let now = Instant::now();
        for _ in 0..100 {
            assert!(limiter.try_acquire_at(now).is_ok());
            limiter.record_call_at(now);
        }
        assert!(limiter.lock().is_empty());
    }

    #[test]
    fn test_try_acquire_takes_slot_atomically() {
        let limiter = RateLimiter::new(1);
        let now = Instant::now();
        assert!(limiter.try_acquire_at(now).is_ok());
        assert_eq!(limiter.try_acquire_at(now), Err(DEFAULT_WINDOW));
    }

    // ==================== Window Bound Tests ====================

    #[test]
    fn test_twenty_rapid_calls_never_exceed_five_per_window() {
        let limiter = RateLimiter::new(5);
        let gaps = vec![Duration::ZERO; 20];
        let times = simulate(&limiter, Instant::now(), &gaps);

        assert_eq!(times.len(), 20);
        assert!(max_in_any_window(&times, DEFAULT_WINDOW) <= 5);
        // 20 calls at 5/minute span at least three full windows
        let span = times[19].duration_since(times[0]);
        assert!(span >= Duration::from_secs(180), "span was {:?}", span);
    }

    proptest! {
        #[test]
        fn prop_window_never_exceeds_limit(
            limit in 1usize..8,
            gaps_ms in proptest::collection::vec(0u64..30_000, 1..40),
        ) {
            let limiter = RateLimiter::new(limit);
            let gaps: Vec<Duration> = gaps_ms.into_iter().map(Duration::from_millis).collect();
            let times = simulate(&limiter, Instant::now(), &gaps);
            prop_assert_eq!(times.len(), gaps.len());
            prop_assert!(max_in_any_window(&times, DEFAULT_WINDOW) <= limit);
        }
    }

    // ==================== Async Acquire Tests ====================

    #[tokio::test]
    async fn test_acquire_waits_for_window() {
        let limiter = RateLimiter::with_window(2, Duration::from_millis(100));
        let start = std::time::Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert!(
            start.elapsed() >= Duration::from_millis(90),
            "third call should have waited, took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_acquire_shared_across_tasks() {
        let limiter = Arc::new(RateLimiter::with_window(3, Duration::from_millis(200)));
        let start = std::time::Instant::now();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(180));
    }
}
