//! Postgres-backed store.
//!
//! Grants and claims run inside a [`UnitOfWork`]; the eligible bucket rows are
//! locked with `SELECT ... FOR UPDATE` in creation order, so two concurrent
//! commits against the same reward type serialize on the row locks and the
//! second one re-reads counters the first one already advanced.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use rewardhub_core::{AppId, OrgId, RewardsError, RewardsResult, TenantScope, UserId};
use rewardhub_ledger::{
    allocate, Allocation, AllocationMode, BucketId, ClaimId, ClaimStatus, InventoryBucket, Reward,
    RewardClaim, RewardClaimItem, RewardId, RewardType, RewardTypeAmount, RewardTypeId,
};

use super::{ClaimFilter, HistoryFilter, RewardsStore};

/// Explicit transaction handle. Dropping an uncommitted unit of work rolls
/// the transaction back.
pub struct UnitOfWork {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl UnitOfWork {
    pub async fn begin(pool: &PgPool) -> RewardsResult<Self> {
        let tx = pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Self { tx })
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> RewardsResult<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> RewardsError {
    match err {
        sqlx::Error::RowNotFound => RewardsError::NotFound,
        sqlx::Error::Database(db) if db.code().is_some_and(|c| c.starts_with("23")) => {
            // Integrity constraint violation (unique, check, foreign key).
            RewardsError::validation(db.to_string())
        }
        other => RewardsError::aborted(other.to_string()),
    }
}

/// Postgres `RewardsStore` implementation. Cheap to clone; the pool is
/// internally shared.
#[derive(Debug, Clone)]
pub struct PostgresRewardsStore {
    pool: PgPool,
}

impl PostgresRewardsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the allocation-eligible buckets for one reward type in creation
    /// order. Must run inside a unit of work.
    async fn lock_buckets(
        uow: &mut UnitOfWork,
        org_id: OrgId,
        app_id: AppId,
        reward_type: &str,
    ) -> RewardsResult<Vec<InventoryBucket>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, app_id, reward_type, in_stock,
                   amount_total, amount_granted, amount_claimed,
                   grant_depleted, claim_depleted, description,
                   date_created, date_updated
            FROM inventory_buckets
            WHERE org_id = $1 AND app_id = $2 AND reward_type = $3
            ORDER BY date_created ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(org_id.as_uuid())
        .bind(app_id.as_uuid())
        .bind(reward_type)
        .fetch_all(uow.conn())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(bucket_from_row).collect()
    }

    async fn persist_allocation(
        uow: &mut UnitOfWork,
        allocation: &Allocation,
    ) -> RewardsResult<()> {
        let counter_column = match allocation.mode {
            AllocationMode::Grant => "amount_granted",
            AllocationMode::Claim => "amount_claimed",
        };
        let depleted_column = match allocation.mode {
            AllocationMode::Grant => "grant_depleted",
            AllocationMode::Claim => "claim_depleted",
        };
        let sql = format!(
            "UPDATE inventory_buckets \
             SET {counter_column} = $2, {depleted_column} = $3, date_updated = $4 \
             WHERE id = $1",
        );
        let now = Utc::now();
        for delta in &allocation.deltas {
            sqlx::query(&sql)
                .bind(delta.bucket_id.as_uuid())
                .bind(delta.counter_after)
                .bind(delta.depleted_after)
                .bind(now)
                .execute(uow.conn())
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}

fn scope_app_param(scope: &TenantScope) -> Option<Uuid> {
    scope.app_id().map(|app| *app.as_uuid())
}

fn bucket_from_row(row: &PgRow) -> RewardsResult<InventoryBucket> {
    Ok(InventoryBucket {
        id: BucketId(row.try_get::<Uuid, _>("id").map_err(map_sqlx_error)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx_error)?),
        app_id: AppId::from_uuid(row.try_get("app_id").map_err(map_sqlx_error)?),
        reward_type: row.try_get("reward_type").map_err(map_sqlx_error)?,
        in_stock: row.try_get("in_stock").map_err(map_sqlx_error)?,
        amount_total: row.try_get("amount_total").map_err(map_sqlx_error)?,
        amount_granted: row.try_get("amount_granted").map_err(map_sqlx_error)?,
        amount_claimed: row.try_get("amount_claimed").map_err(map_sqlx_error)?,
        grant_depleted: row.try_get("grant_depleted").map_err(map_sqlx_error)?,
        claim_depleted: row.try_get("claim_depleted").map_err(map_sqlx_error)?,
        description: row.try_get("description").map_err(map_sqlx_error)?,
        date_created: row.try_get("date_created").map_err(map_sqlx_error)?,
        date_updated: row.try_get("date_updated").map_err(map_sqlx_error)?,
    })
}

fn reward_type_from_row(row: &PgRow) -> RewardsResult<RewardType> {
    Ok(RewardType {
        id: RewardTypeId(row.try_get::<Uuid, _>("id").map_err(map_sqlx_error)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx_error)?),
        app_id: AppId::from_uuid(row.try_get("app_id").map_err(map_sqlx_error)?),
        reward_type: row.try_get("reward_type").map_err(map_sqlx_error)?,
        display_name: row.try_get("display_name").map_err(map_sqlx_error)?,
        active: row.try_get("active").map_err(map_sqlx_error)?,
        description: row.try_get("description").map_err(map_sqlx_error)?,
        date_created: row.try_get("date_created").map_err(map_sqlx_error)?,
        date_updated: row.try_get("date_updated").map_err(map_sqlx_error)?,
    })
}

fn reward_from_row(row: &PgRow) -> RewardsResult<Reward> {
    Ok(Reward {
        id: RewardId(row.try_get::<Uuid, _>("id").map_err(map_sqlx_error)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx_error)?),
        app_id: AppId::from_uuid(row.try_get("app_id").map_err(map_sqlx_error)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_sqlx_error)?),
        reward_type: row.try_get("reward_type").map_err(map_sqlx_error)?,
        code: row.try_get("code").map_err(map_sqlx_error)?,
        building_block: row.try_get("building_block").map_err(map_sqlx_error)?,
        amount: row.try_get("amount").map_err(map_sqlx_error)?,
        description: row.try_get("description").map_err(map_sqlx_error)?,
        date_created: row.try_get("date_created").map_err(map_sqlx_error)?,
    })
}

fn claim_from_row(row: &PgRow, items: Vec<RewardClaimItem>) -> RewardsResult<RewardClaim> {
    let status: String = row.try_get("status").map_err(map_sqlx_error)?;
    Ok(RewardClaim {
        id: ClaimId(row.try_get::<Uuid, _>("id").map_err(map_sqlx_error)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map_sqlx_error)?),
        app_id: AppId::from_uuid(row.try_get("app_id").map_err(map_sqlx_error)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_sqlx_error)?),
        status: status.parse()?,
        description: row.try_get("description").map_err(map_sqlx_error)?,
        items,
        date_created: row.try_get("date_created").map_err(map_sqlx_error)?,
        date_updated: row.try_get("date_updated").map_err(map_sqlx_error)?,
    })
}

fn amount_from_row(row: &PgRow) -> RewardsResult<RewardTypeAmount> {
    Ok(RewardTypeAmount {
        reward_type: row.try_get("reward_type").map_err(map_sqlx_error)?,
        amount: row.try_get("amount").map_err(map_sqlx_error)?,
    })
}

async fn claim_items(
    pool: &PgPool,
    claim_id: ClaimId,
) -> RewardsResult<Vec<RewardClaimItem>> {
    let rows = sqlx::query(
        "SELECT reward_type, amount FROM reward_claim_items WHERE claim_id = $1",
    )
    .bind(claim_id.as_uuid())
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;

    rows.iter()
        .map(|row| {
            Ok(RewardClaimItem {
                reward_type: row.try_get("reward_type").map_err(map_sqlx_error)?,
                amount: row.try_get("amount").map_err(map_sqlx_error)?,
            })
        })
        .collect()
}

#[async_trait]
impl RewardsStore for PostgresRewardsStore {
    async fn reward_type_by_code(
        &self,
        scope: &TenantScope,
        code: &str,
    ) -> RewardsResult<Option<RewardType>> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, app_id, reward_type, display_name, active,
                   description, date_created, date_updated
            FROM reward_types
            WHERE org_id = $1 AND ($2::uuid IS NULL OR app_id = $2)
              AND reward_type = $3
            "#,
        )
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(reward_type_from_row).transpose()
    }

    async fn list_reward_types(&self, scope: &TenantScope) -> RewardsResult<Vec<RewardType>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, app_id, reward_type, display_name, active,
                   description, date_created, date_updated
            FROM reward_types
            WHERE org_id = $1 AND ($2::uuid IS NULL OR app_id = $2)
            ORDER BY date_created ASC
            "#,
        )
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(reward_type_from_row).collect()
    }

    #[instrument(skip(self, entry), fields(reward_type = %entry.reward_type), err)]
    async fn create_reward_type(&self, entry: RewardType) -> RewardsResult<RewardType> {
        sqlx::query(
            r#"
            INSERT INTO reward_types
                (id, org_id, app_id, reward_type, display_name, active,
                 description, date_created, date_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.org_id.as_uuid())
        .bind(entry.app_id.as_uuid())
        .bind(&entry.reward_type)
        .bind(&entry.display_name)
        .bind(entry.active)
        .bind(&entry.description)
        .bind(entry.date_created)
        .bind(entry.date_updated)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(entry)
    }

    #[instrument(skip(self, entry), fields(reward_type_id = %entry.id), err)]
    async fn update_reward_type(
        &self,
        scope: &TenantScope,
        entry: RewardType,
    ) -> RewardsResult<RewardType> {
        let mut updated = entry;
        updated.date_updated = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE reward_types
            SET reward_type = $4, display_name = $5, active = $6,
                description = $7, date_updated = $8
            WHERE id = $1 AND org_id = $2 AND ($3::uuid IS NULL OR app_id = $3)
            "#,
        )
        .bind(updated.id.as_uuid())
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .bind(&updated.reward_type)
        .bind(&updated.display_name)
        .bind(updated.active)
        .bind(&updated.description)
        .bind(updated.date_updated)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RewardsError::NotFound);
        }
        Ok(updated)
    }

    #[instrument(skip(self), fields(reward_type_id = %id), err)]
    async fn delete_reward_type(
        &self,
        scope: &TenantScope,
        id: RewardTypeId,
    ) -> RewardsResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM reward_types
            WHERE id = $1 AND org_id = $2 AND ($3::uuid IS NULL OR app_id = $3)
            "#,
        )
        .bind(id.as_uuid())
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RewardsError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, bucket), fields(reward_type = %bucket.reward_type), err)]
    async fn create_bucket(&self, bucket: InventoryBucket) -> RewardsResult<InventoryBucket> {
        bucket.validate()?;
        sqlx::query(
            r#"
            INSERT INTO inventory_buckets
                (id, org_id, app_id, reward_type, in_stock,
                 amount_total, amount_granted, amount_claimed,
                 grant_depleted, claim_depleted, description,
                 date_created, date_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(bucket.id.as_uuid())
        .bind(bucket.org_id.as_uuid())
        .bind(bucket.app_id.as_uuid())
        .bind(&bucket.reward_type)
        .bind(bucket.in_stock)
        .bind(bucket.amount_total)
        .bind(bucket.amount_granted)
        .bind(bucket.amount_claimed)
        .bind(bucket.grant_depleted)
        .bind(bucket.claim_depleted)
        .bind(&bucket.description)
        .bind(bucket.date_created)
        .bind(bucket.date_updated)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(bucket)
    }

    async fn list_buckets(
        &self,
        scope: &TenantScope,
        reward_type: &str,
    ) -> RewardsResult<Vec<InventoryBucket>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, app_id, reward_type, in_stock,
                   amount_total, amount_granted, amount_claimed,
                   grant_depleted, claim_depleted, description,
                   date_created, date_updated
            FROM inventory_buckets
            WHERE org_id = $1 AND ($2::uuid IS NULL OR app_id = $2)
              AND reward_type = $3
            ORDER BY date_created ASC, id ASC
            "#,
        )
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .bind(reward_type)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(bucket_from_row).collect()
    }

    #[instrument(
        skip(self, reward),
        fields(user_id = %reward.user_id, reward_type = %reward.reward_type, amount = reward.amount),
        err
    )]
    async fn commit_grant(&self, reward: Reward) -> RewardsResult<Reward> {
        reward.validate()?;
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let buckets =
            Self::lock_buckets(&mut uow, reward.org_id, reward.app_id, &reward.reward_type)
                .await?;
        let allocation = allocate(&buckets, AllocationMode::Grant, reward.amount);
        if !allocation.fully_satisfied() {
            return Err(RewardsError::insufficient_inventory(&reward.reward_type));
        }
        Self::persist_allocation(&mut uow, &allocation).await?;

        sqlx::query(
            r#"
            INSERT INTO reward_ledger
                (id, org_id, app_id, user_id, reward_type, code,
                 building_block, amount, description, date_created)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(reward.id.as_uuid())
        .bind(reward.org_id.as_uuid())
        .bind(reward.app_id.as_uuid())
        .bind(reward.user_id.as_uuid())
        .bind(&reward.reward_type)
        .bind(&reward.code)
        .bind(&reward.building_block)
        .bind(reward.amount)
        .bind(&reward.description)
        .bind(reward.date_created)
        .execute(uow.conn())
        .await
        .map_err(map_sqlx_error)?;

        uow.commit().await?;
        Ok(reward)
    }

    #[instrument(
        skip(self, claim),
        fields(user_id = %claim.user_id, items = claim.items.len()),
        err
    )]
    async fn commit_claim(&self, claim: RewardClaim) -> RewardsResult<RewardClaim> {
        claim.validate()?;
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        for item in &claim.items {
            let buckets =
                Self::lock_buckets(&mut uow, claim.org_id, claim.app_id, &item.reward_type)
                    .await?;
            let allocation = allocate(&buckets, AllocationMode::Claim, item.amount);
            if !allocation.fully_satisfied() {
                return Err(RewardsError::insufficient_inventory(&item.reward_type));
            }
            Self::persist_allocation(&mut uow, &allocation).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO reward_claims
                (id, org_id, app_id, user_id, status, description,
                 date_created, date_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(claim.id.as_uuid())
        .bind(claim.org_id.as_uuid())
        .bind(claim.app_id.as_uuid())
        .bind(claim.user_id.as_uuid())
        .bind(claim.status.as_str())
        .bind(&claim.description)
        .bind(claim.date_created)
        .bind(claim.date_updated)
        .execute(uow.conn())
        .await
        .map_err(map_sqlx_error)?;

        for item in &claim.items {
            sqlx::query(
                "INSERT INTO reward_claim_items (claim_id, reward_type, amount) \
                 VALUES ($1, $2, $3)",
            )
            .bind(claim.id.as_uuid())
            .bind(&item.reward_type)
            .bind(item.amount)
            .execute(uow.conn())
            .await
            .map_err(map_sqlx_error)?;
        }

        uow.commit().await?;
        Ok(claim)
    }

    async fn granted_amounts(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        reward_type: Option<&str>,
    ) -> RewardsResult<Vec<RewardTypeAmount>> {
        let rows = sqlx::query(
            r#"
            SELECT reward_type, COALESCE(SUM(amount), 0)::bigint AS amount
            FROM reward_ledger
            WHERE org_id = $1 AND ($2::uuid IS NULL OR app_id = $2)
              AND user_id = $3
              AND ($4::text IS NULL OR reward_type = $4)
            GROUP BY reward_type
            ORDER BY reward_type ASC
            "#,
        )
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .bind(user_id.as_uuid())
        .bind(reward_type)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(amount_from_row).collect()
    }

    async fn claimed_amounts(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        reward_type: Option<&str>,
    ) -> RewardsResult<Vec<RewardTypeAmount>> {
        let rows = sqlx::query(
            r#"
            SELECT i.reward_type, COALESCE(SUM(i.amount), 0)::bigint AS amount
            FROM reward_claim_items i
            JOIN reward_claims c ON c.id = i.claim_id
            WHERE c.org_id = $1 AND ($2::uuid IS NULL OR c.app_id = $2)
              AND c.user_id = $3
              AND ($4::text IS NULL OR i.reward_type = $4)
            GROUP BY i.reward_type
            ORDER BY i.reward_type ASC
            "#,
        )
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .bind(user_id.as_uuid())
        .bind(reward_type)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(amount_from_row).collect()
    }

    async fn rewards_history(
        &self,
        scope: &TenantScope,
        user_id: UserId,
        filter: &HistoryFilter,
    ) -> RewardsResult<Vec<Reward>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, app_id, user_id, reward_type, code,
                   building_block, amount, description, date_created
            FROM reward_ledger
            WHERE org_id = $1 AND ($2::uuid IS NULL OR app_id = $2)
              AND user_id = $3
              AND ($4::text IS NULL OR reward_type = $4)
              AND ($5::text IS NULL OR code = $5)
              AND ($6::text IS NULL OR building_block = $6)
            ORDER BY date_created DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .bind(user_id.as_uuid())
        .bind(filter.reward_type.as_deref())
        .bind(filter.code.as_deref())
        .bind(filter.building_block.as_deref())
        .bind(filter.limit.unwrap_or(i64::MAX))
        .bind(filter.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(reward_from_row).collect()
    }

    async fn list_claims(
        &self,
        scope: &TenantScope,
        filter: &ClaimFilter,
    ) -> RewardsResult<Vec<RewardClaim>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, app_id, user_id, status, description,
                   date_created, date_updated
            FROM reward_claims
            WHERE org_id = $1 AND ($2::uuid IS NULL OR app_id = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
              AND ($4::text IS NULL OR status = $4)
            ORDER BY date_created DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .bind(filter.user_id.map(|u| *u.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.limit.unwrap_or(i64::MAX))
        .bind(filter.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut claims = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = ClaimId(row.try_get::<Uuid, _>("id").map_err(map_sqlx_error)?);
            let items = claim_items(&self.pool, id).await?;
            claims.push(claim_from_row(row, items)?);
        }
        Ok(claims)
    }

    #[instrument(skip(self), fields(claim_id = %id, status = status.as_str()), err)]
    async fn update_claim_status(
        &self,
        scope: &TenantScope,
        id: ClaimId,
        status: ClaimStatus,
    ) -> RewardsResult<RewardClaim> {
        let row = sqlx::query(
            r#"
            UPDATE reward_claims
            SET status = $4, date_updated = $5
            WHERE id = $1 AND org_id = $2 AND ($3::uuid IS NULL OR app_id = $3)
            RETURNING id, org_id, app_id, user_id, status, description,
                      date_created, date_updated
            "#,
        )
        .bind(id.as_uuid())
        .bind(scope.org.as_uuid())
        .bind(scope_app_param(scope))
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RewardsError::NotFound)?;

        let items = claim_items(&self.pool, id).await?;
        claim_from_row(&row, items)
    }
}
