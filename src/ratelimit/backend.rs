//! Rate limiter trait for abstracting the storage behind admission checks.

use async_trait::async_trait;

use super::limiter::RateLimiter;
use super::window::RateLimitResult;

/// Trait for rate limiter implementations.
///
/// The in-memory `RateLimiter` enforces limits per process. A shared store
/// (e.g. a key-value cache) can implement this trait to enforce them across
/// instances without changing the callers.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check and, if allowed, record one request for `key`.
    async fn check_rate_limit(&self, key: &str, max_requests: u32, window_ms: i64)
        -> RateLimitResult;
}

#[async_trait]
impl RateLimiterBackend for RateLimiter {
    async fn check_rate_limit(
        &self,
        key: &str,
        max_requests: u32,
        window_ms: i64,
    ) -> RateLimitResult {
        RateLimiter::check_rate_limit(self, key, max_requests, window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn check_through_trait<B: RateLimiterBackend>(backend: &B) -> RateLimitResult {
        backend.check_rate_limit("search:anon", 1, 60_000).await
    }

    #[tokio::test]
    async fn test_in_memory_limiter_as_backend() {
        let limiter = RateLimiter::new();

        assert!(check_through_trait(&limiter).await.allowed);
        assert!(!check_through_trait(&limiter).await.allowed);
        assert_eq!(limiter.tracked_len("search:anon"), Some(1));
    }

    #[tokio::test]
    async fn test_backend_as_trait_object() {
        let backend: Arc<dyn RateLimiterBackend> = Arc::new(RateLimiter::new());

        let result = backend.check_rate_limit("report:x", 2, 1_000).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
    }
}
