//! steth_rewards — per-account stETH reward ledger.
//!
//! Rebuilds an account's transfers and rebase rewards over a block range, either from raw
//! chain logs or from the Lido subgraph, and folds both into one ledger shape.
//! Read-only; no signing.

pub mod amount;
pub mod chain;
pub mod compute;
pub mod error;
pub mod lido;
pub mod trace;
pub mod verify;

pub use chain::{Cache, FetchConfig, FetchError, RpcClient, SubgraphClient};
pub use compute::{RecordFilter, ShareRate};
pub use error::RewardsError;
pub use lido::{
    rewards_from_chain, rewards_from_subgraph, BackSpec, BlockSpec, BlockTag, Deployment,
    FromSpec, NetworkConfig, RewardLedger, RewardQuery, RewardRecord, RewardType,
};
pub use verify::{ledger_hash, verify_ledger_hash, LedgerBundle, LedgerSource, VerificationResult};
