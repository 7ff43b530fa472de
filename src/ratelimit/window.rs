//! Sliding window of request timestamps for a single key.

use serde::Serialize;
use std::collections::VecDeque;

/// Outcome of a rate limit check.
///
/// Exhaustion is an ordinary value here, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// Milliseconds until the oldest request ages out, set only on denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<i64>,
}

impl RateLimitResult {
    pub fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_ms: None,
        }
    }

    pub fn deny(retry_after_ms: Option<i64>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_ms,
        }
    }

    /// User-facing text for a denied request.
    ///
    /// The message never mentions the key, only how long to wait.
    pub fn retry_message(&self) -> Option<String> {
        if self.allowed {
            return None;
        }

        let wait = match self.retry_after_ms {
            Some(ms) => format_wait(ms),
            None => return Some("You're doing that too much. Please try again later.".into()),
        };
        Some(format!(
            "You're doing that too much. Please try again in {}.",
            wait
        ))
    }
}

fn format_wait(ms: i64) -> String {
    let secs = ms.max(0).saturating_add(999) / 1000;
    if secs < 60 {
        let secs = secs.max(1);
        return format!("{} second{}", secs, if secs == 1 { "" } else { "s" });
    }
    let mins = secs.saturating_add(59) / 60;
    format!("{} minute{}", mins, if mins == 1 { "" } else { "s" })
}

/// Timestamps of allowed requests within the trailing window.
///
/// The window size is remembered per key so that the periodic sweep evicts
/// every key by its own window rather than by whichever call triggered it.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Allowed request instants in ms since epoch, oldest first
    timestamps: VecDeque<i64>,
    /// Window length used on the most recent check for this key
    window_ms: i64,
}

impl SlidingWindow {
    pub fn new(window_ms: i64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window_ms,
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn set_window(&mut self, window_ms: i64) {
        self.window_ms = window_ms;
    }

    /// Drop every timestamp that is at least one window old.
    pub fn evict_expired(&mut self, now: i64) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_sub(oldest) >= self.window_ms {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Evict, then either record `now` or deny without recording.
    pub fn try_acquire(&mut self, now: i64, max_requests: u32) -> RateLimitResult {
        self.evict_expired(now);

        let count = self.timestamps.len();
        if count >= max_requests as usize {
            let retry_after_ms = self
                .timestamps
                .front()
                .map(|&oldest| {
                    oldest
                        .saturating_add(self.window_ms)
                        .saturating_sub(now)
                        .max(0)
                });
            return RateLimitResult::deny(retry_after_ms);
        }

        self.timestamps.push_back(now);
        RateLimitResult::allow(max_requests - (count as u32 + 1))
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn oldest(&self) -> Option<i64> {
        self.timestamps.front().copied()
    }
}
