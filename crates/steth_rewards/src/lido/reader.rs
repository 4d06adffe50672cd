//! Collaborator interfaces consumed by the event sources.
//!
//! `RpcClient` implements the chain-side traits, `SubgraphClient` implements
//! [`IndexedQuery`]. Tests substitute in-memory implementations.

use alloy::primitives::{Address, U256};
use alloy::rpc::types::Log;
use async_trait::async_trait;

use crate::chain::{FetchError, RebaseEntity, TransferEntity};
use crate::lido::{BlockSpec, TotalSupply};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// `None` for a pending block.
    pub number: Option<u64>,
    pub timestamp: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    /// Account is the sender.
    From,
    /// Account is the recipient.
    To,
}

#[async_trait]
pub trait BlockResolver: Send + Sync {
    async fn block(&self, spec: BlockSpec) -> Result<BlockInfo, FetchError>;

    async fn latest_block_at_or_before(&self, timestamp: u64) -> Result<u64, FetchError>;
}

/// Historical contract state.
#[async_trait]
pub trait StateReader: Send + Sync {
    async fn share_balance(&self, account: Address, block: u64) -> Result<U256, FetchError>;

    async fn total_supply(&self, block: u64) -> Result<TotalSupply, FetchError>;
}

/// Raw logs for one inclusive block range; chunking is the caller's job.
#[async_trait]
pub trait ChainEventReader: Send + Sync {
    async fn transfer_logs(
        &self,
        direction: TransferDirection,
        account: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, FetchError>;

    async fn rebase_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, FetchError>;
}

/// Indexed transfer/rebase entities. Ranges are inclusive; pagination is internal.
#[async_trait]
pub trait IndexedQuery: Send + Sync {
    async fn last_indexed_block(&self) -> Result<u64, FetchError>;

    async fn transfers_in_range(
        &self,
        account: Address,
        from_block: u64,
        to_block: u64,
        page_size: u64,
    ) -> Result<Vec<TransferEntity>, FetchError>;

    async fn rebases_in_range(
        &self,
        from_block: u64,
        to_block: u64,
        page_size: u64,
    ) -> Result<Vec<RebaseEntity>, FetchError>;

    /// Most recent transfer involving `account` strictly before `block`.
    async fn last_transfer_before(
        &self,
        account: Address,
        block: u64,
    ) -> Result<Option<TransferEntity>, FetchError>;

    /// Most recent rebase strictly before `block`.
    async fn last_rebase_before(&self, block: u64) -> Result<Option<RebaseEntity>, FetchError>;
}
