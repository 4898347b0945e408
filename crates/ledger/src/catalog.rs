use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rewardhub_core::{AppId, OrgId};

/// Reward type catalog entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardTypeId(pub Uuid);

impl RewardTypeId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RewardTypeId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RewardTypeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Catalog entry naming a kind of reward (e.g. "tshirt").
///
/// Read-only input to the engine: grants must reference an existing entry for
/// their scope. `active` is display metadata for callers and does not gate
/// allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardType {
    pub id: RewardTypeId,
    pub org_id: OrgId,
    pub app_id: AppId,
    pub reward_type: String,
    pub display_name: String,
    pub active: bool,
    pub description: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}
