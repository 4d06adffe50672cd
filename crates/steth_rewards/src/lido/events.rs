//! Normalized stETH events and the reward ledger built from them.

use alloy::primitives::{Address, B256, I256, U256};
use serde::{Deserialize, Serialize};

use crate::amount::decimal;
use crate::compute::ShareRate;

/// Total pooled ether and total shares at one point in the ledger's history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalSupply {
    #[serde(with = "decimal")]
    pub total_ether: U256,
    #[serde(with = "decimal")]
    pub total_shares: U256,
}

impl TotalSupply {
    pub fn new(total_ether: U256, total_shares: U256) -> Self {
        Self {
            total_ether,
            total_shares,
        }
    }
}

/// Post-transfer state an indexer has already computed for the account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    #[serde(with = "decimal")]
    pub balance_shares: U256,
    #[serde(with = "decimal")]
    pub balance: U256,
    /// Transferred amount in wei.
    #[serde(with = "decimal")]
    pub value: U256,
    pub totals: TotalSupply,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferShares {
    pub from: Address,
    pub to: Address,
    #[serde(with = "decimal")]
    pub shares_value: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: Option<B256>,
    /// Present for indexed sources; the classifier then uses it instead of deriving.
    pub snapshot: Option<TransferSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenRebased {
    pub post_totals: TotalSupply,
    /// Pre-rebase totals as reported by an indexer. When absent the running totals are used.
    pub pre_totals: Option<TotalSupply>,
    pub apr: Option<f64>,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: Option<B256>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RawEvent {
    TransferShares(TransferShares),
    TokenRebased(TokenRebased),
}

impl RawEvent {
    pub fn block_number(&self) -> u64 {
        match self {
            RawEvent::TransferShares(t) => t.block_number,
            RawEvent::TokenRebased(r) => r.block_number,
        }
    }

    pub fn log_index(&self) -> u64 {
        match self {
            RawEvent::TransferShares(t) => t.log_index,
            RawEvent::TokenRebased(r) => r.log_index,
        }
    }

    /// Chronological position; unique within one source.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number(), self.log_index())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Submit,
    TransferIn,
    TransferOut,
    Withdrawal,
    Rebase,
}

impl RewardType {
    pub fn is_rebase(self) -> bool {
        self == RewardType::Rebase
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardRecord {
    #[serde(rename = "type")]
    pub kind: RewardType,
    #[serde(with = "decimal")]
    pub balance_shares: U256,
    #[serde(with = "decimal")]
    pub change_shares: I256,
    #[serde(with = "decimal")]
    pub change: I256,
    #[serde(with = "decimal")]
    pub balance: U256,
    pub share_rate: ShareRate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apr: Option<f64>,
    pub original_event: RawEvent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardLedger {
    #[serde(with = "decimal")]
    pub base_balance: U256,
    #[serde(with = "decimal")]
    pub base_balance_shares: U256,
    pub base_share_rate: ShareRate,
    /// Sum of rebase changes before post-filters.
    #[serde(with = "decimal")]
    pub total_rewards: I256,
    pub from_block: u64,
    pub to_block: u64,
    pub rewards: Vec<RewardRecord>,
}

/// Account position just before the requested range.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaseState {
    pub balance_shares: U256,
    pub balance: U256,
    pub totals: TotalSupply,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebase(block: u64, log: u64) -> RawEvent {
        RawEvent::TokenRebased(TokenRebased {
            post_totals: TotalSupply::default(),
            pre_totals: None,
            apr: None,
            block_number: block,
            log_index: log,
            tx_hash: None,
        })
    }

    #[test]
    fn position_is_block_then_log() {
        assert_eq!(rebase(7, 3).position(), (7, 3));
        assert!(rebase(7, 3).position() < rebase(8, 0).position());
    }

    #[test]
    fn reward_type_serializes_snake_case() {
        let s = serde_json::to_string(&RewardType::TransferOut).unwrap();
        assert_eq!(s, r#""transfer_out""#);
    }
}
