//! Reward-type catalog with a read-through, per-org cache.
//!
//! The catalog is read on every grant to resolve the reward type, so reads
//! are served from an in-process cache with a TTL. Every catalog write goes
//! through this service and invalidates the owning org's entry, so a
//! follow-up read observes the write immediately instead of waiting out the
//! TTL.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use rewardhub_core::{OrgId, RewardsError, RewardsResult, TenantScope};
use rewardhub_ledger::{RewardType, RewardTypeId};

use crate::store::RewardsStore;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1800);

struct CachedTypes {
    fetched_at: Instant,
    entries: Vec<RewardType>,
}

/// TTL cache of reward types, keyed by org. Entries hold the org-wide list;
/// scope filtering happens at read time.
pub struct RewardTypeCache {
    ttl: Duration,
    entries: RwLock<HashMap<OrgId, CachedTypes>>,
}

impl RewardTypeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, org: OrgId) -> Option<Vec<RewardType>> {
        let entries = self.entries.read().ok()?;
        let cached = entries.get(&org)?;
        if cached.fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(cached.entries.clone())
    }

    fn set(&self, org: OrgId, types: Vec<RewardType>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                org,
                CachedTypes {
                    fetched_at: Instant::now(),
                    entries: types,
                },
            );
        }
    }

    pub fn invalidate(&self, org: OrgId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&org);
        }
    }
}

impl Default for RewardTypeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

/// Catalog reads and writes. All writes funnel through here so the cache
/// invalidation cannot be skipped.
pub struct CatalogService<S> {
    store: Arc<S>,
    cache: RewardTypeCache,
}

impl<S: RewardsStore> CatalogService<S> {
    pub fn new(store: Arc<S>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache: RewardTypeCache::new(cache_ttl),
        }
    }

    /// Resolve a reward type by its code within `scope`, read-through cached.
    pub async fn resolve_by_code(
        &self,
        scope: &TenantScope,
        code: &str,
    ) -> RewardsResult<RewardType> {
        let entries = match self.cache.get(scope.org) {
            Some(entries) => entries,
            None => {
                debug!(org_id = %scope.org, "catalog cache miss");
                let org_scope = TenantScope::org_wide(scope.org);
                let entries = self.store.list_reward_types(&org_scope).await?;
                self.cache.set(scope.org, entries.clone());
                entries
            }
        };

        entries
            .into_iter()
            .find(|t| scope.contains(t.org_id, t.app_id) && t.reward_type == code)
            .ok_or_else(|| RewardsError::RewardTypeNotFound(code.to_string()))
    }

    pub async fn list(&self, scope: &TenantScope) -> RewardsResult<Vec<RewardType>> {
        self.store.list_reward_types(scope).await
    }

    #[instrument(skip(self, entry), fields(org_id = %entry.org_id, reward_type = %entry.reward_type), err)]
    pub async fn create(&self, entry: RewardType) -> RewardsResult<RewardType> {
        if entry.reward_type.trim().is_empty() {
            return Err(RewardsError::validation("reward_type cannot be empty"));
        }
        let existing_scope = TenantScope::app_scoped(entry.org_id, entry.app_id);
        if self
            .store
            .reward_type_by_code(&existing_scope, &entry.reward_type)
            .await?
            .is_some()
        {
            return Err(RewardsError::validation(format!(
                "reward type already exists: {}",
                entry.reward_type
            )));
        }
        let created = self.store.create_reward_type(entry).await?;
        self.cache.invalidate(created.org_id);
        Ok(created)
    }

    #[instrument(skip(self, entry), fields(reward_type_id = %entry.id), err)]
    pub async fn update(
        &self,
        scope: &TenantScope,
        entry: RewardType,
    ) -> RewardsResult<RewardType> {
        let updated = self.store.update_reward_type(scope, entry).await?;
        self.cache.invalidate(scope.org);
        Ok(updated)
    }

    #[instrument(skip(self), fields(reward_type_id = %id), err)]
    pub async fn delete(&self, scope: &TenantScope, id: RewardTypeId) -> RewardsResult<()> {
        self.store.delete_reward_type(scope, id).await?;
        self.cache.invalidate(scope.org);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use rewardhub_core::AppId;

    use crate::store::in_memory::InMemoryRewardsStore;

    fn reward_type(org: OrgId, app: AppId, code: &str) -> RewardType {
        let now = Utc::now();
        RewardType {
            id: RewardTypeId::new(),
            org_id: org,
            app_id: app,
            reward_type: code.to_string(),
            display_name: code.to_uppercase(),
            active: true,
            description: String::new(),
            date_created: now,
            date_updated: now,
        }
    }

    #[tokio::test]
    async fn resolves_through_cache_after_first_load() {
        let store = Arc::new(InMemoryRewardsStore::new());
        let org = OrgId::new();
        let app = AppId::new();
        let catalog = CatalogService::new(Arc::clone(&store), DEFAULT_CACHE_TTL);
        catalog.create(reward_type(org, app, "tshirt")).await.unwrap();

        let scope = TenantScope::app_scoped(org, app);
        let first = catalog.resolve_by_code(&scope, "tshirt").await.unwrap();
        let second = catalog.resolve_by_code(&scope, "tshirt").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn unknown_code_is_a_typed_error() {
        let store = Arc::new(InMemoryRewardsStore::new());
        let catalog = CatalogService::new(store, DEFAULT_CACHE_TTL);
        let scope = TenantScope::app_scoped(OrgId::new(), AppId::new());
        let err = catalog.resolve_by_code(&scope, "missing").await.unwrap_err();
        assert_eq!(err, RewardsError::RewardTypeNotFound("missing".into()));
    }

    #[tokio::test]
    async fn write_invalidates_the_cached_org() {
        let store = Arc::new(InMemoryRewardsStore::new());
        let org = OrgId::new();
        let app = AppId::new();
        let catalog = CatalogService::new(Arc::clone(&store), DEFAULT_CACHE_TTL);
        let scope = TenantScope::app_scoped(org, app);

        // Prime the cache with an empty org list.
        assert!(catalog.resolve_by_code(&scope, "mug").await.is_err());

        // Create goes through the service, so the stale entry is dropped.
        catalog.create(reward_type(org, app, "mug")).await.unwrap();
        assert!(catalog.resolve_by_code(&scope, "mug").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_codes_in_scope_are_rejected() {
        let store = Arc::new(InMemoryRewardsStore::new());
        let org = OrgId::new();
        let app = AppId::new();
        let catalog = CatalogService::new(store, DEFAULT_CACHE_TTL);
        catalog.create(reward_type(org, app, "mug")).await.unwrap();
        assert!(catalog.create(reward_type(org, app, "mug")).await.is_err());
    }

    #[tokio::test]
    async fn app_scope_does_not_see_other_apps_types() {
        let store = Arc::new(InMemoryRewardsStore::new());
        let org = OrgId::new();
        let catalog = CatalogService::new(store, DEFAULT_CACHE_TTL);
        catalog
            .create(reward_type(org, AppId::new(), "tshirt"))
            .await
            .unwrap();

        let other_app = TenantScope::app_scoped(org, AppId::new());
        assert!(catalog.resolve_by_code(&other_app, "tshirt").await.is_err());

        let org_wide = TenantScope::org_wide(org);
        assert!(catalog.resolve_by_code(&org_wide, "tshirt").await.is_ok());
    }
}
