//! JSON-RPC adapter over an alloy [`Provider`].
//!
//! Historical state is read with `eth_call` pinned to a block number. Block timestamps are
//! read through an optional [`Cache`] so repeated timestamp→block searches stay cheap.

use std::future::Future;

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::chain::{Cache, FetchError};
use crate::lido::contracts::IStETH;
use crate::lido::{
    BlockInfo, BlockResolver, BlockSpec, BlockTag, ChainEventReader, StateReader, TotalSupply,
    TransferDirection,
};

pub struct RpcClient<P> {
    provider: P,
    steth: Address,
    cache: Option<Cache>,
}

impl<P: Provider> RpcClient<P> {
    pub fn new(provider: P, steth: Address) -> Self {
        Self {
            provider,
            steth,
            cache: None,
        }
    }

    /// Read block timestamps through `cache`.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn fetch_block(&self, tag: BlockNumberOrTag) -> Result<BlockInfo, FetchError> {
        let block = self
            .provider
            .get_block_by_number(tag)
            .await?
            .ok_or_else(|| FetchError::Decode(format!("block {tag} not found")))?;
        Ok(BlockInfo {
            number: Some(block.header.number),
            timestamp: block.header.timestamp,
        })
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, FetchError> {
        let key = Cache::key_for(&format!("block_ts:{:#x}:{number}", self.steth));
        if let Some(cache) = &self.cache {
            if let Some(ts) = cache.get_value::<u64>(&key)? {
                return Ok(ts);
            }
        }
        let ts = self
            .fetch_block(BlockNumberOrTag::Number(number))
            .await?
            .timestamp;
        if let Some(cache) = &self.cache {
            cache.set_value(&key, &ts)?;
        }
        Ok(ts)
    }

    fn transfer_filter(&self, direction: TransferDirection, account: Address) -> Filter {
        let base = Filter::new()
            .address(self.steth)
            .event_signature(IStETH::TransferShares::SIGNATURE_HASH);
        match direction {
            TransferDirection::From => base.topic1(account.into_word()),
            TransferDirection::To => base.topic2(account.into_word()),
        }
    }
}

fn tag_of(tag: BlockTag) -> BlockNumberOrTag {
    match tag {
        BlockTag::Earliest => BlockNumberOrTag::Earliest,
        BlockTag::Latest => BlockNumberOrTag::Latest,
        BlockTag::Safe => BlockNumberOrTag::Safe,
        BlockTag::Finalized => BlockNumberOrTag::Finalized,
        BlockTag::Pending => BlockNumberOrTag::Pending,
    }
}

/// Binary search for the highest block in `[0, head]` whose timestamp is `<= target`.
/// Block timestamps are non-decreasing in block number.
pub async fn search_block_at_or_before<F, Fut>(
    head: BlockInfo,
    target: u64,
    mut timestamp_of: F,
) -> Result<u64, FetchError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<u64, FetchError>>,
{
    let head_number = head.number.unwrap_or(0);
    if head.timestamp <= target {
        return Ok(head_number);
    }
    if timestamp_of(0).await? > target {
        return Err(FetchError::NoBlockBefore(target));
    }
    // ts(lo) <= target < ts(hi)
    let (mut lo, mut hi) = (0u64, head_number);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if timestamp_of(mid).await? <= target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

#[async_trait]
impl<P: Provider> BlockResolver for RpcClient<P> {
    async fn block(&self, spec: BlockSpec) -> Result<BlockInfo, FetchError> {
        match spec {
            BlockSpec::Number(n) => self.fetch_block(BlockNumberOrTag::Number(n)).await,
            BlockSpec::Tag(tag) => self.fetch_block(tag_of(tag)).await,
            BlockSpec::Timestamp(ts) => {
                let n = self.latest_block_at_or_before(ts).await?;
                self.fetch_block(BlockNumberOrTag::Number(n)).await
            }
        }
    }

    #[instrument(skip(self))]
    async fn latest_block_at_or_before(&self, timestamp: u64) -> Result<u64, FetchError> {
        let head = self.fetch_block(BlockNumberOrTag::Latest).await?;
        let found = search_block_at_or_before(head, timestamp, |n| self.block_timestamp(n)).await?;
        debug!(found, "timestamp resolved");
        Ok(found)
    }
}

#[async_trait]
impl<P: Provider> StateReader for RpcClient<P> {
    async fn share_balance(&self, account: Address, block: u64) -> Result<U256, FetchError> {
        let steth = IStETH::new(self.steth, &self.provider);
        Ok(steth
            .sharesOf(account)
            .block(BlockId::number(block))
            .call()
            .await?)
    }

    async fn total_supply(&self, block: u64) -> Result<TotalSupply, FetchError> {
        let steth = IStETH::new(self.steth, &self.provider);
        let at = BlockId::number(block);
        let ether_call = steth.getTotalPooledEther().block(at);
        let shares_call = steth.getTotalShares().block(at);
        let (ether, shares) = tokio::join!(ether_call.call(), shares_call.call());
        Ok(TotalSupply::new(ether?, shares?))
    }
}

#[async_trait]
impl<P: Provider> ChainEventReader for RpcClient<P> {
    async fn transfer_logs(
        &self,
        direction: TransferDirection,
        account: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, FetchError> {
        let filter = self
            .transfer_filter(direction, account)
            .from_block(from_block)
            .to_block(to_block);
        Ok(self.provider.get_logs(&filter).await?)
    }

    async fn rebase_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, FetchError> {
        let filter = Filter::new()
            .address(self.steth)
            .event_signature(IStETH::TokenRebased::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);
        Ok(self.provider.get_logs(&filter).await?)
    }
}
