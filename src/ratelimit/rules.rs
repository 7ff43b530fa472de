//! Rate limit rules and the named presets for each forum action.
//!
//! The limiter itself is policy-agnostic: it only ever sees a key, a request
//! budget and a window. This module holds the policy side, i.e. which action
//! classes exist and how many times an actor may perform each one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Time unit for rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// A rate limit rule specifying the budget and time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Number of requests allowed per unit of time
    pub requests_per_unit: u32,
    /// The time unit
    pub unit: TimeUnit,
}

impl RateLimitRule {
    pub const fn new(requests_per_unit: u32, unit: TimeUnit) -> Self {
        Self {
            requests_per_unit,
            unit,
        }
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.unit.duration().as_millis() as i64
    }
}

/// Posting limit for accounts younger than the new-account threshold.
pub const NEW_ACCOUNT_POST: RateLimitRule = RateLimitRule::new(3, TimeUnit::Hour);
/// Posting limit for established accounts.
pub const ESTABLISHED_POST: RateLimitRule = RateLimitRule::new(20, TimeUnit::Hour);
pub const THREAD_CREATE: RateLimitRule = RateLimitRule::new(5, TimeUnit::Hour);
/// Photo upload batches, not individual files.
pub const PHOTO_UPLOAD: RateLimitRule = RateLimitRule::new(30, TimeUnit::Hour);
pub const CONTENT_REPORT: RateLimitRule = RateLimitRule::new(10, TimeUnit::Hour);
pub const PASSWORD_CHANGE: RateLimitRule = RateLimitRule::new(3, TimeUnit::Hour);
pub const SEARCH: RateLimitRule = RateLimitRule::new(30, TimeUnit::Minute);

/// The classes of action that are rate limited.
///
/// Each class owns a key prefix so that limits for different actions by the
/// same actor never share a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    Post,
    Thread,
    PhotoUpload,
    Report,
    PasswordChange,
    Search,
}

impl ActionClass {
    pub const ALL: [ActionClass; 6] = [
        ActionClass::Post,
        ActionClass::Thread,
        ActionClass::PhotoUpload,
        ActionClass::Report,
        ActionClass::PasswordChange,
        ActionClass::Search,
    ];

    /// Key prefix used when composing a rate limit key.
    pub fn prefix(&self) -> &'static str {
        match self {
            ActionClass::Post => "post",
            ActionClass::Thread => "thread",
            ActionClass::PhotoUpload => "photo_upload",
            ActionClass::Report => "report",
            ActionClass::PasswordChange => "password_change",
            ActionClass::Search => "search",
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for ActionClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ActionClass::ALL
            .into_iter()
            .find(|action| action.prefix() == normalized)
            .ok_or_else(|| format!("unknown action class: {}", s))
    }
}

/// The configured rule for every action class.
///
/// Missing entries in a configuration file fall back to the presets above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicies {
    #[serde(default = "default_new_account_post")]
    pub new_account_post: RateLimitRule,
    #[serde(default = "default_established_post")]
    pub established_post: RateLimitRule,
    #[serde(default = "default_thread_create")]
    pub thread_create: RateLimitRule,
    #[serde(default = "default_photo_upload")]
    pub photo_upload: RateLimitRule,
    #[serde(default = "default_content_report")]
    pub content_report: RateLimitRule,
    #[serde(default = "default_password_change")]
    pub password_change: RateLimitRule,
    #[serde(default = "default_search")]
    pub search: RateLimitRule,
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        Self {
            new_account_post: NEW_ACCOUNT_POST,
            established_post: ESTABLISHED_POST,
            thread_create: THREAD_CREATE,
            photo_upload: PHOTO_UPLOAD,
            content_report: CONTENT_REPORT,
            password_change: PASSWORD_CHANGE,
            search: SEARCH,
        }
    }
}

fn default_new_account_post() -> RateLimitRule {
    NEW_ACCOUNT_POST
}

fn default_established_post() -> RateLimitRule {
    ESTABLISHED_POST
}

fn default_thread_create() -> RateLimitRule {
    THREAD_CREATE
}

fn default_photo_upload() -> RateLimitRule {
    PHOTO_UPLOAD
}

fn default_content_report() -> RateLimitRule {
    CONTENT_REPORT
}

fn default_password_change() -> RateLimitRule {
    PASSWORD_CHANGE
}

fn default_search() -> RateLimitRule {
    SEARCH
}

impl RateLimitPolicies {
    /// Find the rule for an action.
    ///
    /// Posting is the only action whose budget depends on account age.
    pub fn rule_for(&self, action: ActionClass, new_account: bool) -> RateLimitRule {
        match action {
            ActionClass::Post if new_account => self.new_account_post,
            ActionClass::Post => self.established_post,
            ActionClass::Thread => self.thread_create,
            ActionClass::PhotoUpload => self.photo_upload,
            ActionClass::Report => self.content_report,
            ActionClass::PasswordChange => self.password_change,
            ActionClass::Search => self.search,
        }
    }

    /// Iterate over every rule with its configuration name.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, RateLimitRule)> {
        [
            ("new_account_post", self.new_account_post),
            ("established_post", self.established_post),
            ("thread_create", self.thread_create),
            ("photo_upload", self.photo_upload),
            ("content_report", self.content_report),
            ("password_change", self.password_change),
            ("search", self.search),
        ]
        .into_iter()
    }
}
