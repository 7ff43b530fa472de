//! Rate limit key composition.

use super::rules::ActionClass;

/// A key that scopes a rate limit to one action class for one actor.
///
/// Rendered as `"<action>:<actor>"`, e.g. `"post:user123"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The action being limited
    pub action: ActionClass,
    /// Identifier of the actor (user id, or client address for anonymous search)
    pub actor: String,
}

impl RateLimitKey {
    pub fn new(action: ActionClass, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
        }
    }

    /// Convert the key to the string used by the limiter table.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.action.prefix(), self.actor)
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
