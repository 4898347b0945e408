use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rewardhub_core::{AppId, OrgId, RewardsError};

/// Inventory bucket identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(pub Uuid);

impl BucketId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BucketId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for BucketId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One capacity-bounded slice of reward inventory for a
/// `(org, app, reward_type)` triple.
///
/// Grant and claim counters are independent: granting consumes promise
/// capacity, claiming consumes physical stock. Buckets for a reward type are
/// allocated in `date_created` ascending order, and that order must be stable.
///
/// Invariant: `0 <= amount_granted <= amount_total` and
/// `0 <= amount_claimed <= amount_total` at all times. The depletion flags are
/// derived from the counters and persisted for query efficiency; `in_stock` is
/// orthogonal to depletion (a bucket can be claim-depleted and still flagged
/// in stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBucket {
    pub id: BucketId,
    pub org_id: OrgId,
    pub app_id: AppId,
    pub reward_type: String,
    pub in_stock: bool,
    pub amount_total: i64,
    pub amount_granted: i64,
    pub amount_claimed: i64,
    pub grant_depleted: bool,
    pub claim_depleted: bool,
    pub description: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl InventoryBucket {
    /// Capacity still available for granting.
    pub fn grantable_amount(&self) -> i64 {
        self.amount_total - self.amount_granted
    }

    /// Capacity still available for claiming.
    pub fn claimable_amount(&self) -> i64 {
        self.amount_total - self.amount_claimed
    }

    /// Recompute both persisted depletion flags from the counters.
    pub fn recompute_depletion(&mut self) {
        self.grant_depleted = self.amount_total <= self.amount_granted;
        self.claim_depleted = self.amount_total <= self.amount_claimed;
    }

    /// Validate the counter bounds on create/update.
    pub fn validate(&self) -> Result<(), RewardsError> {
        if self.reward_type.trim().is_empty() {
            return Err(RewardsError::validation("reward_type cannot be empty"));
        }
        if self.amount_total <= 0 {
            return Err(RewardsError::validation(
                "bucket amount_total must be positive",
            ));
        }
        if self.amount_granted < 0 || self.amount_granted > self.amount_total {
            return Err(RewardsError::validation(
                "amount_granted out of bounds for bucket",
            ));
        }
        if self.amount_claimed < 0 || self.amount_claimed > self.amount_total {
            return Err(RewardsError::validation(
                "amount_claimed out of bounds for bucket",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(total: i64, granted: i64, claimed: i64) -> InventoryBucket {
        let now = Utc::now();
        InventoryBucket {
            id: BucketId::new(),
            org_id: OrgId::new(),
            app_id: AppId::new(),
            reward_type: "tshirt".to_string(),
            in_stock: true,
            amount_total: total,
            amount_granted: granted,
            amount_claimed: claimed,
            grant_depleted: false,
            claim_depleted: false,
            description: String::new(),
            date_created: now,
            date_updated: now,
        }
    }

    #[test]
    fn depletion_flags_track_counters() {
        let mut b = bucket(10, 10, 3);
        b.recompute_depletion();
        assert!(b.grant_depleted);
        assert!(!b.claim_depleted);

        b.amount_claimed = 10;
        b.recompute_depletion();
        assert!(b.claim_depleted);
    }

    #[test]
    fn validate_rejects_out_of_bounds_counters() {
        assert!(bucket(0, 0, 0).validate().is_err());
        assert!(bucket(10, 11, 0).validate().is_err());
        assert!(bucket(10, 0, -1).validate().is_err());
        assert!(bucket(10, 10, 10).validate().is_ok());
    }
}
