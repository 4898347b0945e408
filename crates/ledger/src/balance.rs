//! User balance: granted amounts netted against claimed amounts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-reward-type amount, used for grouped ledger sums and net balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTypeAmount {
    pub reward_type: String,
    pub amount: i64,
}

/// Merge two grouped sums (granted, claimed) into net balances per reward
/// type, sorted by reward type.
///
/// A reward type that appears only in `claimed` yields a negative balance.
/// That is a data-integrity signal and is deliberately kept in the output
/// rather than suppressed.
pub fn net_balance(granted: &[RewardTypeAmount], claimed: &[RewardTypeAmount]) -> Vec<RewardTypeAmount> {
    let mut merged: BTreeMap<String, i64> = BTreeMap::new();

    for entry in granted {
        *merged.entry(entry.reward_type.clone()).or_insert(0) += entry.amount;
    }
    for entry in claimed {
        *merged.entry(entry.reward_type.clone()).or_insert(0) -= entry.amount;
    }

    merged
        .into_iter()
        .map(|(reward_type, amount)| RewardTypeAmount {
            reward_type,
            amount,
        })
        .collect()
}

/// Net balance for a single reward type, zero if unseen.
pub fn balance_for(balances: &[RewardTypeAmount], reward_type: &str) -> i64 {
    balances
        .iter()
        .find(|b| b.reward_type == reward_type)
        .map(|b| b.amount)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(reward_type: &str, amount: i64) -> RewardTypeAmount {
        RewardTypeAmount {
            reward_type: reward_type.to_string(),
            amount,
        }
    }

    #[test]
    fn nets_granted_against_claimed_per_type() {
        let granted = vec![amount("tshirt", 60), amount("mug", 10)];
        let claimed = vec![amount("tshirt", 25)];

        let balances = net_balance(&granted, &claimed);
        assert_eq!(balances, vec![amount("mug", 10), amount("tshirt", 35)]);
    }

    #[test]
    fn claims_without_grants_surface_as_negative() {
        let balances = net_balance(&[], &[amount("mug", 5)]);
        assert_eq!(balances, vec![amount("mug", -5)]);
    }

    #[test]
    fn balance_for_unknown_type_is_zero() {
        let balances = net_balance(&[amount("tshirt", 3)], &[]);
        assert_eq!(balance_for(&balances, "tshirt"), 3);
        assert_eq!(balance_for(&balances, "mug"), 0);
    }
}
