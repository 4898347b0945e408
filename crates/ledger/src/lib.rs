//! Reward inventory & ledger domain module.
//!
//! This crate contains the business rules of the allocation engine,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). Side effects are described as values (bucket deltas) and applied
//! by the infrastructure layer inside its unit of work.

pub mod allocator;
pub mod balance;
pub mod bucket;
pub mod catalog;
pub mod claim;
pub mod grant;
pub mod quantity;

pub use allocator::{allocate, Allocation, AllocationMode, BucketDelta};
pub use balance::{balance_for, net_balance, RewardTypeAmount};
pub use bucket::{BucketId, InventoryBucket};
pub use catalog::{RewardType, RewardTypeId};
pub use claim::{ClaimId, ClaimStatus, RewardClaim, RewardClaimItem};
pub use grant::{Reward, RewardId};
pub use quantity::{quantity_state, RewardQuantityState};
