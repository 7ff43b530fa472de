//! Core sliding-window rate limiter.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::config::RateLimitingConfig;

use super::clock::{Clock, SystemClock};
use super::key::RateLimitKey;
use super::rules::RateLimitRule;
use super::window::{RateLimitResult, SlidingWindow};

/// How often idle windows are swept out of the table.
pub const DEFAULT_SWEEP_INTERVAL_MS: i64 = 5 * 60 * 1000;

/// The process-local rate limiter.
///
/// One instance is built at startup and shared (behind an `Arc`) with every
/// request handler. Each key's window is guarded by its map shard, so a
/// check-and-record on one key is atomic with respect to other checks.
/// Limits are enforced per process; separate instances do not share state.
pub struct RateLimiter {
    /// Sliding windows indexed by composite key
    windows: DashMap<String, SlidingWindow>,
    /// When the last sweep ran, in ms since epoch
    last_sweep_ms: Mutex<i64>,
    /// Minimum time between sweeps
    sweep_interval_ms: i64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter on the system clock with default settings.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_SWEEP_INTERVAL_MS)
    }

    /// Create a rate limiter from configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self::with_clock(Arc::new(SystemClock), config.sweep_interval_ms)
    }

    /// Create a rate limiter on an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>, sweep_interval_ms: i64) -> Self {
        let now = clock.now_ms();
        Self {
            windows: DashMap::new(),
            last_sweep_ms: Mutex::new(now),
            sweep_interval_ms,
            clock,
        }
    }

    /// Check whether `key` may make another request.
    ///
    /// Allowed requests are recorded; denied ones are not, so a key never
    /// tracks more than `max_requests` timestamps. A non-positive
    /// `window_ms` is treated as 1 ms.
    pub fn check_rate_limit(
        &self,
        key: &str,
        max_requests: u32,
        window_ms: i64,
    ) -> RateLimitResult {
        let now = self.clock.now_ms();
        let window_ms = window_ms.max(1);

        // Must run before taking the entry below: the sweep locks every shard.
        self.maybe_sweep(now);

        let result = {
            let mut window = self.windows.entry(key.to_string()).or_insert_with(|| {
                debug!(
                    key = %key,
                    max_requests = max_requests,
                    window_ms = window_ms,
                    "Creating new rate limit window"
                );
                SlidingWindow::new(window_ms)
            });
            window.set_window(window_ms);
            window.try_acquire(now, max_requests)
        };

        if result.allowed {
            trace!(key = %key, remaining = result.remaining, "Request allowed");
        } else {
            debug!(
                key = %key,
                retry_after_ms = ?result.retry_after_ms,
                "Rate limit exceeded"
            );
        }

        result
    }

    /// Check a typed key against a rule.
    pub fn check(&self, key: &RateLimitKey, rule: &RateLimitRule) -> RateLimitResult {
        self.check_rate_limit(&key.to_string_key(), rule.requests_per_unit, rule.window_ms())
    }

    /// Run the sweep if at least one interval has passed since the last one.
    ///
    /// The timestamp is claimed under the lock so two callers crossing the
    /// interval together do not both sweep.
    fn maybe_sweep(&self, now: i64) {
        {
            let mut last = self.last_sweep_ms.lock();
            if now - *last < self.sweep_interval_ms {
                return;
            }
            *last = now;
        }
        self.sweep_at(now);
    }

    /// Evict expired timestamps from every key and drop empty windows.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        *self.last_sweep_ms.lock() = now;
        self.sweep_at(now)
    }

    fn sweep_at(&self, now: i64) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            window.evict_expired(now);
            if window.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            info!(
                removed = removed,
                tracked = self.windows.len(),
                "Swept idle rate limit windows"
            );
        }
        removed
    }

    /// Number of timestamps currently held for a key.
    ///
    /// Returns `None` if the key is not tracked.
    pub fn tracked_len(&self, key: &str) -> Option<usize> {
        self.windows.get(key).map(|w| w.len())
    }

    /// Get the number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Clear all windows.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::rules::{ActionClass, TimeUnit};

    fn limiter_at(start_ms: i64) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let limiter = RateLimiter::with_clock(clock.clone(), DEFAULT_SWEEP_INTERVAL_MS);
        (clock, limiter)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_exact_window_boundary() {
        let (clock, limiter) = limiter_at(0);

        for t in [0, 100, 200] {
            clock.set(t);
            assert!(limiter.check_rate_limit("post:alice", 3, 1000).allowed);
        }

        clock.set(300);
        let denied = limiter.check_rate_limit("post:alice", 3, 1000);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        // The entry from t=0 has aged out
        clock.set(1001);
        let result = limiter.check_rate_limit("post:alice", 3, 1000);
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[test]
    fn test_remaining_counts_down() {
        let (_clock, limiter) = limiter_at(0);

        assert_eq!(limiter.check_rate_limit("k", 3, 1000).remaining, 2);
        assert_eq!(limiter.check_rate_limit("k", 3, 1000).remaining, 1);
        assert_eq!(limiter.check_rate_limit("k", 3, 1000).remaining, 0);
    }

    #[test]
    fn test_retry_after_accuracy() {
        let (clock, limiter) = limiter_at(10_000);

        limiter.check_rate_limit("report:bob", 2, 5_000);
        clock.advance(1_200);
        limiter.check_rate_limit("report:bob", 2, 5_000);
        clock.advance(800);

        let result = limiter.check_rate_limit("report:bob", 2, 5_000);
        assert!(!result.allowed);
        // oldest (10_000) + window (5_000) - now (12_000)
        assert_eq!(result.retry_after_ms, Some(3_000));
    }

    #[test]
    fn test_key_isolation() {
        let (_clock, limiter) = limiter_at(0);

        for _ in 0..5 {
            limiter.check_rate_limit("post:userA", 2, 60_000);
        }
        assert!(!limiter.check_rate_limit("post:userA", 2, 60_000).allowed);

        let result = limiter.check_rate_limit("post:userB", 2, 60_000);
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
    }

    #[test]
    fn test_denied_attempts_do_not_grow_memory() {
        let (clock, limiter) = limiter_at(0);

        for i in 0..10_000 {
            clock.set(i);
            limiter.check_rate_limit("search:flooder", 30, 60_000);
            assert!(limiter.tracked_len("search:flooder").unwrap() <= 30);
        }
        assert_eq!(limiter.tracked_len("search:flooder"), Some(30));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_periodic_sweep_bounds_table_size() {
        let (clock, limiter) = limiter_at(0);

        // One burst of distinct actors, each making a single request
        for i in 0..1_000 {
            limiter.check_rate_limit(&format!("search:{}", i), 30, 60_000);
        }
        assert_eq!(limiter.tracked_keys(), 1_000);

        // Sustained load from one actor who is mostly denied. Once the sweep
        // interval passes, the idle actors are dropped and the table shrinks.
        for step in 1..=400 {
            clock.set(step * 1_000);
            limiter.check_rate_limit("search:flooder", 30, 60_000);
            assert!(limiter.tracked_keys() <= 1_001);
        }
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_sweep_uses_each_keys_own_window() {
        let (clock, limiter) = limiter_at(0);

        limiter.check_rate_limit("search:a", 30, 60_000);
        limiter.check_rate_limit("post:a", 20, 3_600_000);

        clock.set(120_000);
        let removed = limiter.sweep();

        // The minute window has expired, the hour window has not
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_len("search:a"), None);
        assert_eq!(limiter.tracked_len("post:a"), Some(1));
    }

    #[test]
    fn test_sweep_is_throttled() {
        let (clock, limiter) = limiter_at(0);

        limiter.check_rate_limit("search:a", 30, 1_000);
        clock.set(500);
        limiter.check_rate_limit("search:b", 30, 1_000);
        clock.set(DEFAULT_SWEEP_INTERVAL_MS - 1);
        limiter.check_rate_limit("search:c", 30, 1_000);

        // Interval not reached yet: the stale keys survive
        assert_eq!(limiter.tracked_keys(), 3);

        clock.set(DEFAULT_SWEEP_INTERVAL_MS);
        limiter.check_rate_limit("search:d", 30, 1_000);
        assert_eq!(limiter.tracked_len("search:a"), None);
        assert_eq!(limiter.tracked_len("search:b"), None);
        assert_eq!(limiter.tracked_len("search:c"), Some(1));
        assert_eq!(limiter.tracked_len("search:d"), Some(1));
    }

    #[test]
    fn test_check_with_typed_key_and_rule() {
        let (_clock, limiter) = limiter_at(0);
        let key = RateLimitKey::new(ActionClass::PasswordChange, "carol");
        let rule = RateLimitRule::new(1, TimeUnit::Hour);

        assert!(limiter.check(&key, &rule).allowed);
        let result = limiter.check(&key, &rule);
        assert!(!result.allowed);
        assert_eq!(result.retry_after_ms, Some(3_600_000));
        assert_eq!(limiter.tracked_len("password_change:carol"), Some(1));
    }

    #[test]
    fn test_clear_windows() {
        let (_clock, limiter) = limiter_at(0);

        limiter.check_rate_limit("k", 1, 1000);
        assert_eq!(limiter.tracked_keys(), 1);

        limiter.clear();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_budget() {
        let (_clock, limiter) = limiter_at(0);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|_| limiter.check_rate_limit("thread:shared", 50, 60_000).allowed)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }

    #[test]
    fn test_unbounded_window_does_not_panic() {
        let (clock, limiter) = limiter_at(1_700_000_000_000);

        assert!(limiter.check_rate_limit("k", 1, i64::MAX).allowed);
        clock.advance(1);
        let result = limiter.check_rate_limit("k", 1, i64::MAX);
        assert!(!result.allowed);
        assert!(result.retry_after_ms.unwrap() > 0);
    }

    #[test]
    fn test_non_positive_window_is_one_millisecond() {
        let (clock, limiter) = limiter_at(0);

        assert!(limiter.check_rate_limit("k", 1, 0).allowed);
        assert!(!limiter.check_rate_limit("k", 1, -5).allowed);
        clock.advance(1);
        assert!(limiter.check_rate_limit("k", 1, 0).allowed);
    }
}
