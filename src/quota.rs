//! Per-user photo quota.
//!
//! The gallery caps how many photos one user may keep. An upload batch is
//! admitted up to the remaining allowance and the surplus is reported so
//! the caller can reject those files individually.

use serde::Serialize;

use crate::config::PhotoConfig;

/// How much of an upload batch fits in the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    /// Files that may be uploaded, taken from the front of the batch
    pub accepted: usize,
    /// Files over the quota
    pub rejected: usize,
    /// Slots left after the accepted files are stored
    pub remaining: u32,
}

impl QuotaDecision {
    pub fn is_partial(&self) -> bool {
        self.rejected > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoQuota {
    limit: u32,
}

impl PhotoQuota {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }

    pub fn from_config(config: &PhotoConfig) -> Self {
        Self::new(config.quota)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Slots left for a user who already stores `current` photos.
    pub fn remaining(&self, current: u32) -> u32 {
        self.limit.saturating_sub(current)
    }

    /// Split a batch of `requested` files into accepted and rejected.
    pub fn check(&self, current: u32, requested: usize) -> QuotaDecision {
        let available = self.remaining(current) as usize;
        let accepted = requested.min(available);

        QuotaDecision {
            accepted,
            rejected: requested - accepted,
            remaining: (available - accepted) as u32,
        }
    }

    /// User-facing explanation for files turned away by the quota.
    pub fn rejection_message(&self, decision: &QuotaDecision) -> Option<String> {
        if !decision.is_partial() {
            return None;
        }

        Some(if decision.accepted == 0 {
            format!(
                "You have reached your limit of {} photos. Delete some photos to upload more.",
                self.limit
            )
        } else {
            format!(
                "Only {} of your {} photos can be uploaded (limit {}).",
                decision.accepted,
                decision.accepted + decision.rejected,
                self.limit
            )
        })
    }
}

impl Default for PhotoQuota {
    fn default() -> Self {
        Self::from_config(&PhotoConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_within_quota() {
        let quota = PhotoQuota::new(100);
        let decision = quota.check(10, 5);

        assert_eq!(
            decision,
            QuotaDecision {
                accepted: 5,
                rejected: 0,
                remaining: 85
            }
        );
        assert!(!decision.is_partial());
        assert_eq!(quota.rejection_message(&decision), None);
    }

    #[test]
    fn test_batch_partially_over_quota() {
        let quota = PhotoQuota::new(20);
        let decision = quota.check(18, 5);

        assert_eq!(decision.accepted, 2);
        assert_eq!(decision.rejected, 3);
        assert_eq!(decision.remaining, 0);
        assert_eq!(
            quota.rejection_message(&decision).unwrap(),
            "Only 2 of your 5 photos can be uploaded (limit 20)."
        );
    }

    #[test]
    fn test_full_quota_rejects_everything() {
        let quota = PhotoQuota::new(20);
        let decision = quota.check(20, 3);

        assert_eq!(decision.accepted, 0);
        assert_eq!(decision.rejected, 3);
        assert!(quota
            .rejection_message(&decision)
            .unwrap()
            .starts_with("You have reached your limit of 20 photos"));
    }

    #[test]
    fn test_over_quota_user_does_not_underflow() {
        // Quota lowered after the user already stored more photos
        let quota = PhotoQuota::new(10);
        assert_eq!(quota.remaining(15), 0);
        assert_eq!(quota.check(15, 1).accepted, 0);
    }

    #[test]
    fn test_default_uses_config() {
        assert_eq!(PhotoQuota::default().limit(), PhotoConfig::default().quota);
    }
}
