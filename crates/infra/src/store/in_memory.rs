//! In-memory store for tests/dev.
//!
//! A single `RwLock` write guard plays the role of the storage transaction:
//! each commit stages its bucket mutations on a copy and merges them back only
//! after every allocation succeeded, so partial allocation is never visible.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use rewardhub_core::{RewardsError, RewardsResult, TenantScope, UserId};
use rewardhub_ledger::{
    allocate, AllocationMode, ClaimId, ClaimStatus, InventoryBucket, Reward, RewardClaim,
    RewardType, RewardTypeAmount, RewardTypeId,
};

use super::{ClaimFilter, HistoryFilter, RewardsStore};

#[derive(Debug, Default)]
struct State {
    reward_types: Vec<RewardType>,
    buckets: Vec<InventoryBucket>,
    rewards: Vec<Reward>,
    claims: Vec<RewardClaim>,
}

/// In-memory `RewardsStore` implementation.
#[derive(Debug, Default)]
pub struct InMemoryRewardsStore {
    inner: RwLock<State>,
}

impl InMemoryRewardsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned() -> RewardsError {
    RewardsError::aborted("store lock poisoned")
}

/// Buckets for `(org, app, reward_type)` in creation order. The id is the
/// tiebreaker for equal timestamps (ids are UUIDv7, so this still follows
/// creation order) to keep allocation order stable.
fn bucket_snapshot(
    buckets: &[InventoryBucket],
    scope: &TenantScope,
    reward_type: &str,
) -> Vec<InventoryBucket> {
    let mut snapshot: Vec<InventoryBucket> = buckets
        .iter()
        .filter(|b| scope.contains(b.org_id, b.app_id) && b.reward_type == reward_type)
        .cloned()
        .collect();
    snapshot.sort_by_key(|b| (b.date_created, *b.id.as_uuid()));
    snapshot
}

fn apply_allocation(
    staged: &mut [InventoryBucket],
    allocation: &rewardhub_ledger::Allocation,
) {
    let now = Utc::now();
    for delta in &allocation.deltas {
        if let Some(bucket) = staged.iter_mut().find(|b| b.id == delta.bucket_id) {
            delta.apply_to(bucket, allocation.mode);
            bucket.date_updated = now;
        }
    }
}

fn grouped_sum(entries: impl Iterator<Item = (String, i64)>) -> Vec<RewardTypeAmount> {
    let mut grouped: BTreeMap<String, i64> = BTreeMap::new();
    for (reward_type, amount) in entries {
        *grouped.entry(reward_type).or_insert(0) += amount;
    }
    grouped
        .into_iter()
        .map(|(reward_type, amount)| RewardTypeAmount {
            reward_type,
            amount,
        })
        .collect()
}

#[async_trait]
impl RewardsStore for InMemoryRewardsStore {
    async fn reward_type_by_code(
        &self,
        scope: &TenantScope,
        code: &str,
    ) -> RewardsResult<Option<RewardType>> {
        let state = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(state
            .reward_types
            .iter()
            .find(|t| scope.contains(t.org_id, t.app_id) && t.reward_type == code)
            .cloned())
    }

    async fn list_reward_types(&self, scope: &TenantScope) -> RewardsResult<Vec<RewardType>> {
        let state = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(state
            .reward_types
            .iter()
            .filter(|t| scope.contains(t.org_id, t.app_id))
            .cloned()
            .collect())
    }

    async fn create_reward_type(&self, entry: RewardType) -> RewardsResult<RewardType> {
        let mut state = self.inner.write().map_err(|_| lock_poisoned())?;
        state.reward_types.push(entry.clone());
        Ok(entry)
    }

    async fn update_reward_type(
        &self,
        scope: &TenantScope,
        entry: RewardType,
    ) -> RewardsResult<RewardType> {
        let mut state = self.inner.write().map_err(|_| lock_poisoned())?;
        let existing = state
            .reward_types
            .iter_mut()
            .find(|t| scope.contains(t.org_id, t.app_id) && t.id == entry.id)
            .ok_or(RewardsError::NotFound)?;
        let mut updated = entry;
        updated.date_updated = Utc::now();
        *existing = updated.clone();
        Ok(updated)
    }

    async fn delete_reward_type(
        &self,
        scope: &TenantScope,
        id: RewardTypeId,
    ) -> RewardsResult<()> {
        let mut state = self.inner.write().map_err(|_| lock_poisoned())?;
        let before = state.reward_types.len();
        state
            .reward_types
            .retain(|t| !(scope.contains(t.org_id, t.app_id) && t.id == id));
        if state.reward_types.len() == before {
            return Err(RewardsError::NotFound);
        }
        Ok(())
    }

    async fn create_bucket(&self, bucket: InventoryBucket) -> RewardsResult<InventoryBucket> {
        bucket.validate()?;
        let mut state = self.inner.write().map_err(|_| lock_poisoned())?;
        state.buckets.push(bucket.clone());
        Ok(bucket)
    }

    async fn list_buckets(
        &self,
        scope: &TenantScope,
        reward_type: &str,
    ) -> RewardsResult<Vec<InventoryBucket>> {
        let state = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(bucket_snapshot(&state.buckets, scope, reward_type))
    }

    async fn commit_grant(&self, reward: Reward) -> RewardsResult<Reward> {
        reward.validate()?;
        let mut state = self.inner.write().map_err(|_| lock_poisoned())?;

        let scope = TenantScope::app_scoped(reward.org_id, reward.app_id);
        let mut staged = state.buckets.clone();
        let snapshot = bucket_snapshot(&staged, &scope, &reward.reward_type);

        let allocation = allocate(&snapshot, AllocationMode::Grant, reward.amount);
        if !allocation.fully_satisfied() {
            return Err(RewardsError::insufficient_inventory(&reward.reward_type));
        }
        apply_allocation(&mut staged, &allocation);

        state.buckets = staged;
        state.rewards.push(reward.clone());
        Ok(reward)
    }

    async fn commit_claim(&self, claim: RewardClaim) -> RewardsResult<RewardClaim> {
        claim.validate()?;
        let mut state = self.inner.write().map_err(|_| lock_poisoned())?;

        let scope = TenantScope::app_scoped(claim.org_id, claim.app_id);
        let mut staged = state.buckets.clone();

        // Sequential per-item allocation; earlier items' deltas are visible
        // to later items through the staged copy.
        for item in &claim.items {
            let snapshot = bucket_snapshot(&staged, &scope, &item.reward_type);
            let allocation = allocate(&snapshot, AllocationMode::Claim, item.amount);
            if !allocation.fully_satisfied() {
                return Err(RewardsError::insufficient_inventory(&item.reward_type));
            }
            apply_allocation(&mut staged, &allocation);
        }

        state.buckets = staged;
        state.claims.push(claim.clone());
        Ok(claim)
    }

    async fn granted_amounts(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        reward_type: Option<&str>,
    ) -> RewardsResult<Vec<RewardTypeAmount>> {
        let state = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(grouped_sum(
            state
                .rewards
                .iter()
                .filter(|r| {
                    scope.contains(r.org_id, r.app_id)
                        && r.user_id == user_id
                        && reward_type.is_none_or(|t| r.reward_type == t)
                })
                .map(|r| (r.reward_type.clone(), r.amount)),
        ))
    }

    async fn claimed_amounts(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        reward_type: Option<&str>,
    ) -> RewardsResult<Vec<RewardTypeAmount>> {
        let state = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(grouped_sum(
            state
                .claims
                .iter()
                .filter(|c| scope.contains(c.org_id, c.app_id) && c.user_id == user_id)
                .flat_map(|c| c.items.iter())
                .filter(|i| reward_type.is_none_or(|t| i.reward_type == t))
                .map(|i| (i.reward_type.clone(), i.amount)),
        ))
    }

    async fn rewards_history(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        filter: &HistoryFilter,
    ) -> RewardsResult<Vec<Reward>> {
        let state = self.inner.read().map_err(|_| lock_poisoned())?;
        let mut matched: Vec<Reward> = state
            .rewards
            .iter()
            .filter(|r| {
                scope.contains(r.org_id, r.app_id)
                    && r.user_id == user_id
                    && filter.reward_type.as_deref().is_none_or(|t| r.reward_type == t)
                    && filter.code.as_deref().is_none_or(|c| r.code == c)
                    && filter
                        .building_block
                        .as_deref()
                        .is_none_or(|b| r.building_block == b)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.date_created.cmp(&a.date_created));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let mut page: Vec<Reward> = matched.into_iter().skip(offset).collect();
        if let Some(limit) = filter.limit {
            page.truncate(limit.max(0) as usize);
        }
        Ok(page)
    }

    async fn list_claims(
        &self,
        scope: &TenantScope,
        filter: &ClaimFilter,
    ) -> RewardsResult<Vec<RewardClaim>> {
        let state = self.inner.read().map_err(|_| lock_poisoned())?;
        let mut matched: Vec<RewardClaim> = state
            .claims
            .iter()
            .filter(|c| {
                scope.contains(c.org_id, c.app_id)
                    && filter.user_id.is_none_or(|u| c.user_id == u)
                    && filter.status.is_none_or(|s| c.status == s)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.date_created.cmp(&a.date_created));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let mut page: Vec<RewardClaim> = matched.into_iter().skip(offset).collect();
        if let Some(limit) = filter.limit {
            page.truncate(limit.max(0) as usize);
        }
        Ok(page)
    }

    async fn update_claim_status(
        &self,
        scope: &TenantScope,
        id: ClaimId,
        status: ClaimStatus,
    ) -> RewardsResult<RewardClaim> {
        let mut state = self.inner.write().map_err(|_| lock_poisoned())?;
        let claim = state
            .claims
            .iter_mut()
            .find(|c| scope.contains(c.org_id, c.app_id) && c.id == id)
            .ok_or(RewardsError::NotFound)?;
        claim.status = status;
        claim.date_updated = Utc::now();
        Ok(claim.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rewardhub_core::AppId;
    use rewardhub_ledger::BucketId;
    use uuid::Uuid;

    #[tokio::test]
    async fn buckets_with_equal_creation_times_order_by_id() {
        let store = InMemoryRewardsStore::new();
        let org = rewardhub_core::OrgId::new();
        let app = AppId::new();
        let now = Utc::now();

        // UUIDv7 ids are time-ordered, so this vec is ascending.
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
        for id in ids.iter().rev() {
            store
                .create_bucket(InventoryBucket {
                    id: BucketId(*id),
                    org_id: org,
                    app_id: app,
                    reward_type: "tshirt".to_string(),
                    in_stock: true,
                    amount_total: 5,
                    amount_granted: 0,
                    amount_claimed: 0,
                    grant_depleted: false,
                    claim_depleted: false,
                    description: String::new(),
                    date_created: now,
                    date_updated: now,
                })
                .await
                .unwrap();
        }

        let scope = TenantScope::app_scoped(org, app);
        let listed: Vec<Uuid> = store
            .list_buckets(&scope, "tshirt")
            .await
            .unwrap()
            .iter()
            .map(|b| *b.id.as_uuid())
            .collect();
        assert_eq!(listed, ids);
    }
}
