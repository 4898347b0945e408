//! Orchestration facade: validates requests, resolves reward types, runs the
//! balance and inventory pre-checks, and hands the committed records to the
//! store. The store's commit is the authoritative capacity check; pre-checks
//! here only fail fast with a precise error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{instrument, warn};

use rewardhub_core::{RewardsError, RewardsResult, TenantScope, UserId};
use rewardhub_ledger::{
    balance_for, net_balance, quantity_state, ClaimId, ClaimStatus, InventoryBucket, Reward,
    RewardClaim, RewardClaimItem, RewardId, RewardQuantityState, RewardTypeAmount,
};

use crate::catalog::CatalogService;
use crate::store::{ClaimFilter, HistoryFilter, RewardsStore};

/// Input for granting rewards to a user.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub user_id: UserId,
    pub reward_type: String,
    pub amount: i64,
    /// Caller-supplied correlation code (campaign, promotion, ...).
    pub code: String,
    /// The product surface that triggered the grant.
    pub building_block: String,
    pub description: String,
}

/// Input for provisioning a new inventory bucket.
#[derive(Debug, Clone)]
pub struct NewBucket {
    pub reward_type: String,
    pub amount_total: i64,
    pub in_stock: bool,
    pub description: String,
}

/// Input for redeeming rewards.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub user_id: UserId,
    pub items: Vec<RewardClaimItem>,
    pub description: String,
}

pub struct RewardsService<S> {
    store: Arc<S>,
    catalog: CatalogService<S>,
}

impl<S: RewardsStore> RewardsService<S> {
    pub fn new(store: Arc<S>, cache_ttl: Duration) -> Self {
        let catalog = CatalogService::new(Arc::clone(&store), cache_ttl);
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &CatalogService<S> {
        &self.catalog
    }

    fn require_app(scope: &TenantScope) -> RewardsResult<rewardhub_core::AppId> {
        scope
            .app_id()
            .ok_or_else(|| RewardsError::validation("writes require an app-scoped tenant"))
    }

    /// Grant `request.amount` units of a reward type to a user.
    #[instrument(
        skip(self, request),
        fields(org_id = %scope.org, user_id = %request.user_id, reward_type = %request.reward_type, amount = request.amount),
        err
    )]
    pub async fn create_grant(
        &self,
        scope: &TenantScope,
        request: GrantRequest,
    ) -> RewardsResult<Reward> {
        let app_id = Self::require_app(scope)?;
        let reward_type = self
            .catalog
            .resolve_by_code(scope, &request.reward_type)
            .await?;
        if request.amount <= 0 {
            return Err(RewardsError::InvalidAmount(request.amount));
        }

        let buckets = self
            .store
            .list_buckets(scope, &reward_type.reward_type)
            .await?;
        let state = quantity_state(&reward_type.reward_type, &buckets);
        if state.grantable_quantity < request.amount {
            return Err(RewardsError::insufficient_inventory(
                &reward_type.reward_type,
            ));
        }

        let reward = Reward {
            id: RewardId::new(),
            org_id: scope.org,
            app_id,
            user_id: request.user_id,
            reward_type: reward_type.reward_type,
            code: request.code,
            building_block: request.building_block,
            amount: request.amount,
            description: request.description,
            date_created: Utc::now(),
        };
        self.store.commit_grant(reward).await
    }

    /// Redeem rewards. Every item must clear both the user's net balance and
    /// the in-stock claimable inventory, or the whole claim is rejected.
    #[instrument(
        skip(self, request),
        fields(org_id = %scope.org, user_id = %request.user_id, items = request.items.len()),
        err
    )]
    pub async fn create_claim(
        &self,
        scope: &TenantScope,
        request: ClaimRequest,
    ) -> RewardsResult<RewardClaim> {
        let app_id = Self::require_app(scope)?;
        let now = Utc::now();
        let claim = RewardClaim {
            id: ClaimId::new(),
            org_id: scope.org,
            app_id,
            user_id: request.user_id,
            status: ClaimStatus::Pending,
            description: request.description,
            items: request.items,
            date_created: now,
            date_updated: now,
        };
        claim.validate()?;

        // Duplicate reward types in one claim count against the same balance,
        // so check the per-type totals rather than each line separately.
        let mut requested: BTreeMap<&str, i64> = BTreeMap::new();
        for item in &claim.items {
            *requested.entry(item.reward_type.as_str()).or_insert(0) += item.amount;
        }

        let granted = self
            .store
            .granted_amounts(scope, claim.user_id, None)
            .await?;
        let claimed = self
            .store
            .claimed_amounts(scope, claim.user_id, None)
            .await?;
        let balances = net_balance(&granted, &claimed);

        for (reward_type, amount) in &requested {
            self.catalog.resolve_by_code(scope, reward_type).await?;

            if balance_for(&balances, reward_type) < *amount {
                return Err(RewardsError::insufficient_balance(*reward_type));
            }

            let buckets = self.store.list_buckets(scope, reward_type).await?;
            let state = quantity_state(reward_type, &buckets);
            if state.claimable_quantity < *amount {
                return Err(RewardsError::insufficient_inventory(*reward_type));
            }
        }

        self.store.commit_claim(claim).await
    }

    /// Provision a fresh bucket for a catalogued reward type.
    #[instrument(
        skip(self, bucket),
        fields(org_id = %scope.org, reward_type = %bucket.reward_type, amount_total = bucket.amount_total),
        err
    )]
    pub async fn create_bucket(
        &self,
        scope: &TenantScope,
        bucket: NewBucket,
    ) -> RewardsResult<InventoryBucket> {
        let app_id = Self::require_app(scope)?;
        let reward_type = self
            .catalog
            .resolve_by_code(scope, &bucket.reward_type)
            .await?;

        let now = Utc::now();
        let bucket = InventoryBucket {
            id: rewardhub_ledger::BucketId::new(),
            org_id: scope.org,
            app_id,
            reward_type: reward_type.reward_type,
            in_stock: bucket.in_stock,
            amount_total: bucket.amount_total,
            amount_granted: 0,
            amount_claimed: 0,
            grant_depleted: false,
            claim_depleted: false,
            description: bucket.description,
            date_created: now,
            date_updated: now,
        };
        bucket.validate()?;
        self.store.create_bucket(bucket).await
    }

    /// Grantable and claimable totals for one reward type.
    pub async fn quantity_state(
        &self,
        scope: &TenantScope,
        reward_type: &str,
    ) -> RewardsResult<RewardQuantityState> {
        let buckets = self.store.list_buckets(scope, reward_type).await?;
        Ok(quantity_state(reward_type, &buckets))
    }

    /// Net granted-minus-claimed balance per reward type for a user.
    pub async fn user_balance(
        &self,
        scope: &TenantScope,
        user_id: UserId,
    ) -> RewardsResult<Vec<RewardTypeAmount>> {
        let granted = self.store.granted_amounts(scope, user_id, None).await?;
        let claimed = self.store.claimed_amounts(scope, user_id, None).await?;
        let balances = net_balance(&granted, &claimed);
        for entry in &balances {
            if entry.amount < 0 {
                warn!(
                    user_id = %user_id,
                    reward_type = %entry.reward_type,
                    amount = entry.amount,
                    "negative reward balance"
                );
            }
        }
        Ok(balances)
    }

    pub async fn rewards_history(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        filter: &HistoryFilter,
    ) -> RewardsResult<Vec<Reward>> {
        self.store.rewards_history(scope, user_id, filter).await
    }

    pub async fn list_claims(
        &self,
        scope: &TenantScope,
        filter: &ClaimFilter,
    ) -> RewardsResult<Vec<RewardClaim>> {
        self.store.list_claims(scope, filter).await
    }

    #[instrument(skip(self), fields(claim_id = %id), err)]
    pub async fn update_claim_status(
        &self,
        scope: &TenantScope,
        id: ClaimId,
        status: ClaimStatus,
    ) -> RewardsResult<RewardClaim> {
        self.store.update_claim_status(scope, id, status).await
    }
}
