//! End-to-end scenarios against the in-memory store, driven through the
//! service facade the way a caller would use it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use rewardhub_core::{AppId, OrgId, RewardsError, TenantScope, UserId};
use rewardhub_ledger::{ClaimStatus, RewardClaimItem, RewardType, RewardTypeId};

use crate::service::{ClaimRequest, GrantRequest, NewBucket, RewardsService};
use crate::store::in_memory::InMemoryRewardsStore;
use crate::store::{ClaimFilter, HistoryFilter, RewardsStore};

struct Fixture {
    service: Arc<RewardsService<InMemoryRewardsStore>>,
    store: Arc<InMemoryRewardsStore>,
    scope: TenantScope,
}

async fn fixture_with_types(codes: &[&str]) -> Fixture {
    rewardhub_observability::init();
    let store = Arc::new(InMemoryRewardsStore::new());
    let service = Arc::new(RewardsService::new(
        Arc::clone(&store),
        Duration::from_secs(1800),
    ));
    let org = OrgId::new();
    let app = AppId::new();
    let scope = TenantScope::app_scoped(org, app);
    for code in codes {
        let now = Utc::now();
        service
            .catalog()
            .create(RewardType {
                id: RewardTypeId::new(),
                org_id: org,
                app_id: app,
                reward_type: code.to_string(),
                display_name: code.to_string(),
                active: true,
                description: String::new(),
                date_created: now,
                date_updated: now,
            })
            .await
            .unwrap();
    }
    Fixture {
        service,
        store,
        scope,
    }
}

impl Fixture {
    async fn add_bucket(&self, reward_type: &str, total: i64, in_stock: bool) {
        self.service
            .create_bucket(
                &self.scope,
                NewBucket {
                    reward_type: reward_type.to_string(),
                    amount_total: total,
                    in_stock,
                    description: String::new(),
                },
            )
            .await
            .unwrap();
    }

    async fn grant(&self, user: UserId, reward_type: &str, amount: i64) -> Result<(), RewardsError> {
        self.service
            .create_grant(
                &self.scope,
                GrantRequest {
                    user_id: user,
                    reward_type: reward_type.to_string(),
                    amount,
                    code: "promo".to_string(),
                    building_block: "quiz".to_string(),
                    description: String::new(),
                },
            )
            .await
            .map(|_| ())
    }

    async fn claim(&self, user: UserId, items: Vec<(&str, i64)>) -> Result<(), RewardsError> {
        self.service
            .create_claim(
                &self.scope,
                ClaimRequest {
                    user_id: user,
                    items: items
                        .into_iter()
                        .map(|(t, amount)| RewardClaimItem {
                            reward_type: t.to_string(),
                            amount,
                        })
                        .collect(),
                    description: String::new(),
                },
            )
            .await
            .map(|_| ())
    }
}

#[tokio::test]
async fn grant_spills_over_buckets_in_creation_order() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 10, true).await;
    fx.add_bucket("tshirt", 50, true).await;

    let user = UserId::new();
    fx.grant(user, "tshirt", 25).await.unwrap();

    let buckets = fx.store.list_buckets(&fx.scope, "tshirt").await.unwrap();
    assert_eq!(buckets[0].amount_granted, 10);
    assert!(buckets[0].grant_depleted);
    assert_eq!(buckets[1].amount_granted, 15);
    assert!(!buckets[1].grant_depleted);

    let state = fx.service.quantity_state(&fx.scope, "tshirt").await.unwrap();
    assert_eq!(state.grantable_quantity, 35);
}

#[tokio::test]
async fn grant_beyond_capacity_is_rejected_without_side_effects() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 10, true).await;
    fx.add_bucket("tshirt", 5, true).await;

    let user = UserId::new();
    let err = fx.grant(user, "tshirt", 16).await.unwrap_err();
    assert_eq!(
        err,
        RewardsError::insufficient_inventory("tshirt")
    );

    // Nothing was allocated and nothing hit the ledger.
    let buckets = fx.store.list_buckets(&fx.scope, "tshirt").await.unwrap();
    assert!(buckets.iter().all(|b| b.amount_granted == 0));
    let history = fx
        .service
        .rewards_history(&fx.scope, user, &HistoryFilter::default())
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn unknown_reward_type_fails_the_grant() {
    let fx = fixture_with_types(&["tshirt"]).await;
    let err = fx.grant(UserId::new(), "hoodie", 1).await.unwrap_err();
    assert_eq!(err, RewardsError::RewardTypeNotFound("hoodie".into()));

    // The type is resolved before the amount is checked, so an unknown type
    // wins even when the amount is also bad.
    let err = fx.grant(UserId::new(), "hoodie", 0).await.unwrap_err();
    assert_eq!(err, RewardsError::RewardTypeNotFound("hoodie".into()));

    let err = fx.grant(UserId::new(), "tshirt", 0).await.unwrap_err();
    assert_eq!(err, RewardsError::InvalidAmount(0));
}

#[tokio::test]
async fn claim_requires_sufficient_net_balance() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 100, true).await;

    let user = UserId::new();
    fx.grant(user, "tshirt", 5).await.unwrap();
    fx.claim(user, vec![("tshirt", 3)]).await.unwrap();

    // 5 granted - 3 claimed leaves 2; claiming 3 more must fail.
    let err = fx.claim(user, vec![("tshirt", 3)]).await.unwrap_err();
    assert_eq!(
        err,
        RewardsError::insufficient_balance("tshirt")
    );

    let balances = fx.service.user_balance(&fx.scope, user).await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].amount, 2);
}

#[tokio::test]
async fn duplicate_items_count_against_the_same_balance() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 100, true).await;

    let user = UserId::new();
    fx.grant(user, "tshirt", 5).await.unwrap();

    // 3 + 3 exceeds the balance of 5 even though each line alone fits.
    let err = fx
        .claim(user, vec![("tshirt", 3), ("tshirt", 3)])
        .await
        .unwrap_err();
    assert_eq!(err, RewardsError::insufficient_balance("tshirt"));
}

#[tokio::test]
async fn claims_only_draw_from_in_stock_buckets() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 50, false).await;
    fx.add_bucket("tshirt", 4, true).await;

    let user = UserId::new();
    fx.grant(user, "tshirt", 20).await.unwrap();

    let state = fx.service.quantity_state(&fx.scope, "tshirt").await.unwrap();
    assert_eq!(state.claimable_quantity, 4);

    let err = fx.claim(user, vec![("tshirt", 5)]).await.unwrap_err();
    assert_eq!(err, RewardsError::insufficient_inventory("tshirt"));

    fx.claim(user, vec![("tshirt", 4)]).await.unwrap();
    let buckets = fx.store.list_buckets(&fx.scope, "tshirt").await.unwrap();
    assert_eq!(buckets[0].amount_claimed, 0);
    assert_eq!(buckets[1].amount_claimed, 4);
    assert!(buckets[1].claim_depleted);
}

#[tokio::test]
async fn multi_item_claim_is_atomic() {
    let fx = fixture_with_types(&["tshirt", "mug"]).await;
    fx.add_bucket("tshirt", 100, true).await;
    fx.add_bucket("mug", 100, true).await;

    let user = UserId::new();
    fx.grant(user, "tshirt", 10).await.unwrap();
    // No mug balance, so the whole claim fails and the tshirt bucket
    // stays untouched.
    let err = fx
        .claim(user, vec![("tshirt", 2), ("mug", 1)])
        .await
        .unwrap_err();
    assert_eq!(err, RewardsError::insufficient_balance("mug"));

    let buckets = fx.store.list_buckets(&fx.scope, "tshirt").await.unwrap();
    assert_eq!(buckets[0].amount_claimed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_grants_never_exceed_capacity() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 100, true).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = Arc::clone(&fx.service);
        let scope = fx.scope;
        handles.push(tokio::spawn(async move {
            service
                .create_grant(
                    &scope,
                    GrantRequest {
                        user_id: UserId::new(),
                        reward_type: "tshirt".to_string(),
                        amount: 60,
                        code: "promo".to_string(),
                        building_block: "quiz".to_string(),
                        description: String::new(),
                    },
                )
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    let buckets = fx.store.list_buckets(&fx.scope, "tshirt").await.unwrap();
    let granted: i64 = buckets.iter().map(|b| b.amount_granted).sum();
    assert_eq!(granted, 60);
    assert!(granted <= 100);
}

#[tokio::test]
async fn ledger_totals_match_bucket_counters() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 30, true).await;
    fx.add_bucket("tshirt", 30, true).await;

    let alice = UserId::new();
    let bob = UserId::new();
    fx.grant(alice, "tshirt", 25).await.unwrap();
    fx.grant(bob, "tshirt", 20).await.unwrap();
    fx.claim(alice, vec![("tshirt", 10)]).await.unwrap();

    let buckets = fx.store.list_buckets(&fx.scope, "tshirt").await.unwrap();
    let granted_in_buckets: i64 = buckets.iter().map(|b| b.amount_granted).sum();
    let claimed_in_buckets: i64 = buckets.iter().map(|b| b.amount_claimed).sum();

    let alice_granted = fx
        .store
        .granted_amounts(&fx.scope, alice, None)
        .await
        .unwrap();
    let bob_granted = fx
        .store
        .granted_amounts(&fx.scope, bob, None)
        .await
        .unwrap();
    let ledger_granted = alice_granted[0].amount + bob_granted[0].amount;
    assert_eq!(granted_in_buckets, ledger_granted);

    let alice_claimed = fx
        .store
        .claimed_amounts(&fx.scope, alice, None)
        .await
        .unwrap();
    assert_eq!(claimed_in_buckets, alice_claimed[0].amount);
}

#[tokio::test]
async fn claim_status_transitions_do_not_touch_inventory() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 10, true).await;

    let user = UserId::new();
    fx.grant(user, "tshirt", 5).await.unwrap();
    fx.claim(user, vec![("tshirt", 2)]).await.unwrap();

    let claims = fx
        .service
        .list_claims(&fx.scope, &ClaimFilter::default())
        .await
        .unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].status, ClaimStatus::Pending);

    let fulfilled = fx
        .service
        .update_claim_status(&fx.scope, claims[0].id, ClaimStatus::Fulfilled)
        .await
        .unwrap();
    assert_eq!(fulfilled.status, ClaimStatus::Fulfilled);

    let buckets = fx.store.list_buckets(&fx.scope, "tshirt").await.unwrap();
    assert_eq!(buckets[0].amount_claimed, 2);

    let balances = fx.service.user_balance(&fx.scope, user).await.unwrap();
    assert_eq!(balances[0].amount, 3);
}

#[tokio::test]
async fn history_filters_by_code_and_building_block() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 100, true).await;

    let user = UserId::new();
    for code in ["spring", "summer", "spring"] {
        fx.service
            .create_grant(
                &fx.scope,
                GrantRequest {
                    user_id: user,
                    reward_type: "tshirt".to_string(),
                    amount: 1,
                    code: code.to_string(),
                    building_block: "quiz".to_string(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();
    }

    let spring = fx
        .service
        .rewards_history(
            &fx.scope,
            user,
            &HistoryFilter {
                code: Some("spring".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(spring.len(), 2);

    let paged = fx
        .service
        .rewards_history(
            &fx.scope,
            user,
            &HistoryFilter {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(paged.len(), 2);
}

#[tokio::test]
async fn org_wide_scope_cannot_write() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 10, true).await;

    let org_wide = TenantScope::org_wide(fx.scope.org);
    let err = fx
        .service
        .create_grant(
            &org_wide,
            GrantRequest {
                user_id: UserId::new(),
                reward_type: "tshirt".to_string(),
                amount: 1,
                code: "promo".to_string(),
                building_block: "quiz".to_string(),
                description: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RewardsError::Validation(_)));

    // Reads are allowed org-wide.
    let state = fx
        .service
        .quantity_state(&org_wide, "tshirt")
        .await
        .unwrap();
    assert_eq!(state.grantable_quantity, 10);
}

#[tokio::test]
async fn tenants_are_isolated_within_one_store() {
    let fx = fixture_with_types(&["tshirt"]).await;
    fx.add_bucket("tshirt", 10, true).await;

    // A second org sharing the same store sees none of the first org's
    // catalog or inventory.
    let other_scope = TenantScope::app_scoped(OrgId::new(), AppId::new());
    let err = fx
        .service
        .create_grant(
            &other_scope,
            GrantRequest {
                user_id: UserId::new(),
                reward_type: "tshirt".to_string(),
                amount: 1,
                code: "promo".to_string(),
                building_block: "quiz".to_string(),
                description: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, RewardsError::RewardTypeNotFound("tshirt".into()));

    let buckets = fx
        .store
        .list_buckets(&other_scope, "tshirt")
        .await
        .unwrap();
    assert!(buckets.is_empty());
}
