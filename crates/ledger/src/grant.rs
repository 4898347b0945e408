use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rewardhub_core::{AppId, OrgId, RewardsError, UserId};

/// Grant ledger entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub Uuid);

impl RewardId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RewardId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RewardId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One committed grant event. Immutable once created; the engine never
/// mutates or deletes ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: RewardId,
    pub org_id: OrgId,
    pub app_id: AppId,
    pub user_id: UserId,
    pub reward_type: String,
    pub code: String,
    pub building_block: String,
    pub amount: i64,
    pub description: String,
    pub date_created: DateTime<Utc>,
}

impl Reward {
    pub fn validate(&self) -> Result<(), RewardsError> {
        if self.amount <= 0 {
            return Err(RewardsError::InvalidAmount(self.amount));
        }
        if self.reward_type.trim().is_empty() {
            return Err(RewardsError::validation("reward_type cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward(amount: i64) -> Reward {
        Reward {
            id: RewardId::new(),
            org_id: OrgId::new(),
            app_id: AppId::new(),
            user_id: UserId::new(),
            reward_type: "tshirt".to_string(),
            code: "event-attendance".to_string(),
            building_block: "events".to_string(),
            amount,
            description: String::new(),
            date_created: Utc::now(),
        }
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert_eq!(
            reward(0).validate(),
            Err(RewardsError::InvalidAmount(0))
        );
        assert_eq!(
            reward(-3).validate(),
            Err(RewardsError::InvalidAmount(-3))
        );
        assert!(reward(1).validate().is_ok());
    }
}
