//! Admission checks for forum actions.
//!
//! `ActionGuard` is what the action layer calls before a post, thread,
//! report, upload batch, password change or search is allowed to proceed.
//! It turns an actor and an action class into a key and a rule, then asks
//! the backend.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::RateLimitingConfig;

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::key::RateLimitKey;
use super::rules::{ActionClass, RateLimitPolicies, RateLimitRule};
use super::window::RateLimitResult;

/// Forum role of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Moderator,
    Admin,
}

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }
}

/// The identity performing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable user identifier
    pub id: String,
    #[serde(default)]
    pub role: Role,
    /// Account creation instant in ms since epoch
    pub created_at_ms: i64,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, created_at_ms: i64) -> Self {
        Self {
            id: id.into(),
            role,
            created_at_ms,
        }
    }
}

/// Picks the rule for an actor's action and consults the backend.
pub struct ActionGuard<B: RateLimiterBackend + ?Sized> {
    backend: Arc<B>,
    policies: RateLimitPolicies,
    /// Accounts younger than this get the new-account posting rule
    new_account_age_ms: i64,
    exempt_staff: bool,
    clock: Arc<dyn Clock>,
}

impl<B: RateLimiterBackend + ?Sized> ActionGuard<B> {
    /// Create a guard on the system clock.
    pub fn new(backend: Arc<B>, config: &RateLimitingConfig) -> Self {
        Self::with_clock(backend, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<B>,
        config: &RateLimitingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            policies: config.policies.clone(),
            new_account_age_ms: config.new_account_age_secs.saturating_mul(1000),
            exempt_staff: config.exempt_staff,
            clock,
        }
    }

    pub fn policies(&self) -> &RateLimitPolicies {
        &self.policies
    }

    fn is_new_account(&self, actor: &Actor) -> bool {
        self.clock.now_ms().saturating_sub(actor.created_at_ms) < self.new_account_age_ms
    }

    /// The rule that applies to `actor` performing `action` right now.
    pub fn rule_for(&self, actor: &Actor, action: ActionClass) -> RateLimitRule {
        self.policies.rule_for(action, self.is_new_account(actor))
    }

    /// Decide whether `actor` may perform `action`.
    ///
    /// New-account and established posting share the `post:` key, so an
    /// account that crosses the age threshold keeps its recent history.
    #[instrument(skip_all, fields(action = %action, role = ?actor.role))]
    pub async fn admit(&self, actor: &Actor, action: ActionClass) -> RateLimitResult {
        let rule = self.rule_for(actor, action);

        if self.exempt_staff && actor.role.is_staff() {
            debug!("Staff actor exempt from rate limit");
            return RateLimitResult::allow(rule.requests_per_unit);
        }

        let key = RateLimitKey::new(action, actor.id.as_str());
        self.backend
            .check_rate_limit(&key.to_string_key(), rule.requests_per_unit, rule.window_ms())
            .await
    }
}
