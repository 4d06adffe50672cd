//! Lido stETH semantics: events, deployments, range resolution and the two event sources.

mod chain_source;
pub mod contracts;
pub(crate) mod events;
pub mod network;
mod range;
mod reader;
mod subgraph_source;

pub use chain_source::rewards_from_chain;
pub use contracts::{decode_log, rebase_apr, IStETH};
pub use events::{
    BaseState, RawEvent, RewardLedger, RewardRecord, RewardType, TokenRebased, TotalSupply,
    TransferShares, TransferSnapshot,
};
pub use network::{
    Deployment, DeploymentOverride, Network, NetworkConfig, DEFAULT_CHAIN_STEP,
    DEFAULT_SUBGRAPH_PAGE,
};
pub use range::{
    resolve_block, resolve_range, validate_query, BackSpec, BlockRange, BlockSpec, BlockTag,
    FromSpec, RewardQuery,
};
pub use reader::{
    BlockInfo, BlockResolver, ChainEventReader, IndexedQuery, StateReader, TransferDirection,
};
pub use subgraph_source::rewards_from_subgraph;
