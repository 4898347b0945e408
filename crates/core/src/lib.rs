//! `rewardhub-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod scope;

pub use error::{RewardsError, RewardsResult};
pub use id::{AppId, OrgId, UserId};
pub use scope::{AppScope, TenantScope};
