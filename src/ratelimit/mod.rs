//! Rate limiting logic and state management.

mod backend;
mod clock;
mod guard;
mod key;
mod limiter;
pub mod rules;
mod window;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{ActionGuard, Actor, Role};
pub use key::RateLimitKey;
pub use limiter::{RateLimiter, DEFAULT_SWEEP_INTERVAL_MS};
pub use rules::{ActionClass, RateLimitPolicies, RateLimitRule, TimeUnit};
pub use window::{RateLimitResult, SlidingWindow};
