//! Tenant scope: the (organization, application-or-all) boundary.

use serde::{Deserialize, Serialize};

use crate::id::{AppId, OrgId};

/// Application dimension of a tenant scope.
///
/// `AllApps` is the privileged/administrative path that ignores the
/// application boundary. Modeled as an explicit case rather than an optional
/// id so it can never be triggered by a missing value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppScope {
    App(AppId),
    AllApps,
}

/// Tenant boundary within which buckets and ledgers are partitioned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub org: OrgId,
    pub app: AppScope,
}

impl TenantScope {
    pub fn app_scoped(org: OrgId, app: AppId) -> Self {
        Self {
            org,
            app: AppScope::App(app),
        }
    }

    pub fn org_wide(org: OrgId) -> Self {
        Self {
            org,
            app: AppScope::AllApps,
        }
    }

    /// The concrete app id, if this scope is bound to a single application.
    pub fn app_id(&self) -> Option<AppId> {
        match self.app {
            AppScope::App(id) => Some(id),
            AppScope::AllApps => None,
        }
    }

    /// Whether a record stamped with `(org, app)` falls inside this scope.
    pub fn contains(&self, org: OrgId, app: AppId) -> bool {
        if self.org != org {
            return false;
        }
        match self.app {
            AppScope::App(id) => id == app,
            AppScope::AllApps => true,
        }
    }
}
