//! Domain error model.

use thiserror::Error;

/// Result type used across the domain and service layers.
pub type RewardsResult<T> = Result<T, RewardsError>;

/// Typed failure modes of the reward engine.
///
/// Business-rule failures (`RewardTypeNotFound`, `InvalidAmount`,
/// `InsufficientBalance`, `InsufficientInventory`) are deterministic given the
/// state the caller observed. `TransactionAborted` is infrastructure-level and
/// always safe to retry: no partial state is ever visible after an abort.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RewardsError {
    /// Referenced reward type code does not exist for the scope.
    #[error("reward type not found: {0}")]
    RewardTypeNotFound(String),

    /// Requested amount was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// A claim item exceeds the user's net granted-minus-claimed balance.
    #[error("insufficient balance for reward type: {reward_type}")]
    InsufficientBalance { reward_type: String },

    /// Requested amount exceeds available bucket capacity.
    #[error("insufficient inventory for reward type: {reward_type}")]
    InsufficientInventory { reward_type: String },

    /// A value failed validation (e.g. malformed input, bucket bounds).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested record was not found.
    #[error("not found")]
    NotFound,

    /// The storage-level unit of work failed (connectivity, conflict).
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

impl RewardsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::TransactionAborted(msg.into())
    }

    pub fn insufficient_inventory(reward_type: impl Into<String>) -> Self {
        Self::InsufficientInventory {
            reward_type: reward_type.into(),
        }
    }

    pub fn insufficient_balance(reward_type: impl Into<String>) -> Self {
        Self::InsufficientBalance {
            reward_type: reward_type.into(),
        }
    }

    /// Whether a caller may retry the same request unchanged.
    ///
    /// `InsufficientInventory` is excluded: it can be transient under races,
    /// but the caller should reconcile against fresh quantities first.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TransactionAborted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_aborted_transactions_are_retriable() {
        assert!(RewardsError::aborted("conn reset").is_retriable());
        assert!(!RewardsError::insufficient_inventory("tshirt").is_retriable());
        assert!(!RewardsError::InvalidAmount(0).is_retriable());
    }
}
