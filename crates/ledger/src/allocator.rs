//! Greedy first-fit allocation of a requested amount across buckets.
//!
//! The allocator is a pure function: it takes an immutable snapshot of the
//! buckets and returns a value describing the mutations to apply. Whether the
//! deltas are persisted or discarded is the transaction coordinator's call;
//! a partially satisfied allocation must never be persisted.

use serde::{Deserialize, Serialize};

use crate::bucket::{BucketId, InventoryBucket};

/// Which counter an allocation consumes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    Grant,
    Claim,
}

/// One bucket's share of an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDelta {
    pub bucket_id: BucketId,
    /// Amount taken from this bucket. Always > 0.
    pub take: i64,
    /// Value of the consumed counter after applying the delta.
    pub counter_after: i64,
    /// Depletion flag for the consumed counter after applying the delta.
    pub depleted_after: bool,
}

impl BucketDelta {
    /// Apply this delta to a bucket, updating the counter the allocation
    /// mode consumes and its derived depletion flag.
    pub fn apply_to(&self, bucket: &mut InventoryBucket, mode: AllocationMode) {
        debug_assert_eq!(self.bucket_id, bucket.id);
        match mode {
            AllocationMode::Grant => {
                bucket.amount_granted = self.counter_after;
                bucket.grant_depleted = self.depleted_after;
            }
            AllocationMode::Claim => {
                bucket.amount_claimed = self.counter_after;
                bucket.claim_depleted = self.depleted_after;
            }
        }
    }
}

/// Result of running the allocator against a bucket snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub mode: AllocationMode,
    pub requested: i64,
    /// Total amount covered by `deltas`. Equals `requested` iff fully
    /// satisfied.
    pub allocated: i64,
    pub deltas: Vec<BucketDelta>,
}

impl Allocation {
    pub fn fully_satisfied(&self) -> bool {
        self.allocated == self.requested
    }
}

/// Distribute `requested` across `buckets`, first-fit in the given order.
///
/// Buckets are expected in `date_created` ascending order; no reordering is
/// applied here, so results are deterministic given the same snapshot.
/// Grant mode skips grant-depleted buckets; Claim mode skips buckets that are
/// out of stock or claim-depleted.
pub fn allocate(buckets: &[InventoryBucket], mode: AllocationMode, requested: i64) -> Allocation {
    let mut deltas = Vec::new();
    let mut remaining = requested.max(0);

    for bucket in buckets {
        if remaining == 0 {
            break;
        }

        let available = match mode {
            AllocationMode::Grant => {
                if bucket.grant_depleted {
                    continue;
                }
                bucket.grantable_amount()
            }
            AllocationMode::Claim => {
                if !bucket.in_stock || bucket.claim_depleted {
                    continue;
                }
                bucket.claimable_amount()
            }
        };
        if available <= 0 {
            continue;
        }

        let take = available.min(remaining);
        let counter_before = match mode {
            AllocationMode::Grant => bucket.amount_granted,
            AllocationMode::Claim => bucket.amount_claimed,
        };
        let counter_after = counter_before + take;

        deltas.push(BucketDelta {
            bucket_id: bucket.id,
            take,
            counter_after,
            depleted_after: bucket.amount_total <= counter_after,
        });
        remaining -= take;
    }

    Allocation {
        mode,
        requested,
        allocated: requested.max(0) - remaining,
        deltas,
    }
}
