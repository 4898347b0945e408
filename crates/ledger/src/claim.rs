use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rewardhub_core::{AppId, OrgId, RewardsError, UserId};

/// Claim ledger entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub Uuid);

impl ClaimId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Administrative fulfilment state of a claim.
///
/// Status transitions are an administrative concern and never touch bucket
/// counters or item amounts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Fulfilled,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Fulfilled => "fulfilled",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

impl core::str::FromStr for ClaimStatus {
    type Err = RewardsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "fulfilled" => Ok(ClaimStatus::Fulfilled),
            "rejected" => Ok(ClaimStatus::Rejected),
            other => Err(RewardsError::validation(format!(
                "unknown claim status: {other}"
            ))),
        }
    }
}

/// One line of a claim: a reward type and the amount being redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardClaimItem {
    pub reward_type: String,
    pub amount: i64,
}

/// One committed claim event, atomic across all its items: either every
/// item's amount is allocated, or none is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardClaim {
    pub id: ClaimId,
    pub org_id: OrgId,
    pub app_id: AppId,
    pub user_id: UserId,
    pub status: ClaimStatus,
    pub description: String,
    pub items: Vec<RewardClaimItem>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl RewardClaim {
    /// Validate the claim shape before any balance/inventory checks.
    pub fn validate(&self) -> Result<(), RewardsError> {
        if self.items.is_empty() {
            return Err(RewardsError::validation("claim must have items"));
        }
        for item in &self.items {
            if item.amount <= 0 {
                return Err(RewardsError::InvalidAmount(item.amount));
            }
            if item.reward_type.trim().is_empty() {
                return Err(RewardsError::validation(
                    "claim item reward_type cannot be empty",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(items: Vec<RewardClaimItem>) -> RewardClaim {
        let now = Utc::now();
        RewardClaim {
            id: ClaimId::new(),
            org_id: OrgId::new(),
            app_id: AppId::new(),
            user_id: UserId::new(),
            status: ClaimStatus::Pending,
            description: String::new(),
            items,
            date_created: now,
            date_updated: now,
        }
    }

    fn item(reward_type: &str, amount: i64) -> RewardClaimItem {
        RewardClaimItem {
            reward_type: reward_type.to_string(),
            amount,
        }
    }

    #[test]
    fn empty_claims_are_rejected() {
        assert!(claim(vec![]).validate().is_err());
    }

    #[test]
    fn any_non_positive_item_rejects_the_whole_claim() {
        let err = claim(vec![item("tshirt", 2), item("mug", 0)])
            .validate()
            .unwrap_err();
        assert_eq!(err, RewardsError::InvalidAmount(0));
    }

    #[test]
    fn well_formed_claims_pass() {
        assert!(claim(vec![item("tshirt", 2), item("mug", 1)]).validate().is_ok());
    }
}
