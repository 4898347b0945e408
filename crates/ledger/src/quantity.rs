//! Read-only aggregation of bucket state into per-reward-type quantities.

use serde::{Deserialize, Serialize};

use crate::bucket::InventoryBucket;

/// Current grantable/claimable quantities for one reward type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardQuantityState {
    pub reward_type: String,
    pub grantable_quantity: i64,
    pub claimable_quantity: i64,
}

/// Sum a single-snapshot bucket list into quantity state.
///
/// `grantable` spans all buckets (depleted ones contribute 0); `claimable`
/// spans in-stock buckets only. Callers must pass buckets read at a single
/// point in time, the same consistency the ledger pre-checks rely on.
pub fn quantity_state(reward_type: &str, buckets: &[InventoryBucket]) -> RewardQuantityState {
    let mut grantable = 0i64;
    let mut claimable = 0i64;

    for bucket in buckets {
        grantable += bucket.grantable_amount();
        if bucket.in_stock {
            claimable += bucket.claimable_amount();
        }
    }

    RewardQuantityState {
        reward_type: reward_type.to_string(),
        grantable_quantity: grantable,
        claimable_quantity: claimable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketId;
    use chrono::Utc;
    use rewardhub_core::{AppId, OrgId};

    fn bucket(total: i64, granted: i64, claimed: i64, in_stock: bool) -> InventoryBucket {
        let now = Utc::now();
        let mut b = InventoryBucket {
            id: BucketId::new(),
            org_id: OrgId::new(),
            app_id: AppId::new(),
            reward_type: "tshirt".to_string(),
            in_stock,
            amount_total: total,
            amount_granted: granted,
            amount_claimed: claimed,
            grant_depleted: false,
            claim_depleted: false,
            description: String::new(),
            date_created: now,
            date_updated: now,
        };
        b.recompute_depletion();
        b
    }

    #[test]
    fn grantable_includes_depleted_buckets_as_zero() {
        let state = quantity_state(
            "tshirt",
            &[bucket(100, 100, 0, true), bucket(50, 10, 0, true)],
        );
        assert_eq!(state.grantable_quantity, 40);
    }

    #[test]
    fn claimable_counts_in_stock_buckets_only() {
        let state = quantity_state(
            "tshirt",
            &[bucket(100, 0, 30, true), bucket(50, 0, 0, false)],
        );
        assert_eq!(state.claimable_quantity, 70);
    }

    #[test]
    fn empty_bucket_list_yields_zeroes() {
        let state = quantity_state("tshirt", &[]);
        assert_eq!(state.grantable_quantity, 0);
        assert_eq!(state.claimable_quantity, 0);
    }
}
