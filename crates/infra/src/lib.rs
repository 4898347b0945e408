//! Infrastructure layer: storage adapters, catalog cache, configuration, and
//! the service facade orchestrating grants and claims.

pub mod catalog;
pub mod config;
pub mod service;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use catalog::{CatalogService, RewardTypeCache};
pub use config::StoreConfig;
pub use service::{ClaimRequest, GrantRequest, NewBucket, RewardsService};
pub use store::{ClaimFilter, HistoryFilter, RewardsStore};
pub use store::in_memory::InMemoryRewardsStore;
pub use store::postgres::PostgresRewardsStore;
