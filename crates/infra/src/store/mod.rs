//! Storage abstraction for buckets, ledgers, and the reward-type catalog.
//!
//! `commit_grant` and `commit_claim` are the only operations that mutate
//! bucket state, and each runs as one atomic unit of work: bucket allocation
//! and the ledger insert become visible together or not at all.

use async_trait::async_trait;

use rewardhub_core::{RewardsResult, TenantScope, UserId};
use rewardhub_ledger::{
    ClaimId, ClaimStatus, InventoryBucket, Reward, RewardClaim, RewardType, RewardTypeAmount,
    RewardTypeId,
};

pub mod in_memory;
pub mod postgres;

/// Filter for user reward history queries.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub reward_type: Option<String>,
    pub code: Option<String>,
    pub building_block: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Filter for claim listing queries.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub user_id: Option<UserId>,
    pub status: Option<ClaimStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Persistence boundary of the engine.
///
/// Reads accept an org-wide or app-scoped `TenantScope`; the transactional
/// writes (`commit_grant`, `commit_claim`) operate on records already stamped
/// with a concrete `(org, app)` pair.
#[async_trait]
pub trait RewardsStore: Send + Sync {
    // Reward type catalog (collaborator surface; write path drives cache
    // invalidation upstream).
    async fn reward_type_by_code(
        &self,
        scope: &TenantScope,
        code: &str,
    ) -> RewardsResult<Option<RewardType>>;
    async fn list_reward_types(&self, scope: &TenantScope) -> RewardsResult<Vec<RewardType>>;
    async fn create_reward_type(&self, entry: RewardType) -> RewardsResult<RewardType>;
    async fn update_reward_type(
        &self,
        scope: &TenantScope,
        entry: RewardType,
    ) -> RewardsResult<RewardType>;
    async fn delete_reward_type(
        &self,
        scope: &TenantScope,
        id: RewardTypeId,
    ) -> RewardsResult<()>;

    // Inventory buckets. `list_buckets` returns creation-time ascending order;
    // that order is the allocation order and must be stable.
    async fn create_bucket(&self, bucket: InventoryBucket) -> RewardsResult<InventoryBucket>;
    async fn list_buckets(
        &self,
        scope: &TenantScope,
        reward_type: &str,
    ) -> RewardsResult<Vec<InventoryBucket>>;

    // Ledgers. Both commits allocate inside their unit of work and abort with
    // `InsufficientInventory` when capacity is stale, leaving no mutation.
    async fn commit_grant(&self, reward: Reward) -> RewardsResult<Reward>;
    async fn commit_claim(&self, claim: RewardClaim) -> RewardsResult<RewardClaim>;

    // Grouped ledger sums used by the balance calculator.
    async fn granted_amounts(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        reward_type: Option<&str>,
    ) -> RewardsResult<Vec<RewardTypeAmount>>;
    async fn claimed_amounts(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        reward_type: Option<&str>,
    ) -> RewardsResult<Vec<RewardTypeAmount>>;

    // Ledger views.
    async fn rewards_history(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        filter: &HistoryFilter,
    ) -> RewardsResult<Vec<Reward>>;
    async fn list_claims(
        &self,
        scope: &TenantScope,
        filter: &ClaimFilter,
    ) -> RewardsResult<Vec<RewardClaim>>;

    /// Administrative status transition; never touches buckets or amounts.
    async fn update_claim_status(
        &self,
        scope: &TenantScope,
        id: ClaimId,
        status: ClaimStatus,
    ) -> RewardsResult<RewardClaim>;
}
