//! Range resolution: to/from/back specifiers → concrete block bounds.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::compute::RecordFilter;
use crate::error::RewardsError;
use crate::lido::reader::BlockResolver;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockTag {
    Earliest,
    Latest,
    Safe,
    Finalized,
    Pending,
}

impl BlockTag {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "earliest" => Some(BlockTag::Earliest),
            "latest" => Some(BlockTag::Latest),
            "safe" => Some(BlockTag::Safe),
            "finalized" => Some(BlockTag::Finalized),
            "pending" => Some(BlockTag::Pending),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSpec {
    Number(u64),
    Tag(BlockTag),
    /// Unix seconds; resolved to the latest block at or before it.
    Timestamp(u64),
}

impl Default for BlockSpec {
    fn default() -> Self {
        BlockSpec::Tag(BlockTag::Latest)
    }
}

/// Relative start of the range. Exactly one field is consulted, in this order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackSpec {
    pub blocks: Option<u64>,
    pub days: Option<u64>,
    pub seconds: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FromSpec {
    Block(BlockSpec),
    Back(BackSpec),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardQuery {
    pub account: Address,
    pub from: FromSpec,
    #[serde(default)]
    pub to: BlockSpec,
    /// Chunk size in blocks (chain) or page size (subgraph).
    pub step: u64,
    #[serde(default)]
    pub include_zero_rebases: bool,
    #[serde(default)]
    pub include_only_rebases: bool,
}

impl RewardQuery {
    pub fn filter(&self) -> RecordFilter {
        RecordFilter {
            include_zero_rebases: self.include_zero_rebases,
            include_only_rebases: self.include_only_rebases,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockRange {
    /// Block whose state seeds the fold.
    pub fn pre_block(&self) -> u64 {
        self.from_block.saturating_sub(1)
    }
}

/// Checks that need no I/O.
pub fn validate_query(query: &RewardQuery) -> Result<(), RewardsError> {
    if query.step == 0 {
        return Err(RewardsError::InvalidArgument(
            "step must be a positive integer".to_string(),
        ));
    }
    let pending = BlockSpec::Tag(BlockTag::Pending);
    if query.to == pending || query.from == FromSpec::Block(pending) {
        return Err(RewardsError::InvalidArgument(
            "pending block cannot bound a reward range".to_string(),
        ));
    }
    if let FromSpec::Back(back) = &query.from {
        if back.blocks.is_none() && back.days.is_none() && back.seconds.is_none() {
            return Err(RewardsError::InvalidArgument(
                "back must set at least one of blocks, days or seconds".to_string(),
            ));
        }
    }
    Ok(())
}

/// Resolve one block specifier to a mined block number.
pub async fn resolve_block<R: BlockResolver + ?Sized>(
    reader: &R,
    spec: BlockSpec,
) -> Result<u64, RewardsError> {
    match spec {
        BlockSpec::Number(n) => Ok(n),
        BlockSpec::Tag(tag) => {
            let block = reader.block(BlockSpec::Tag(tag)).await?;
            block.number.ok_or_else(|| {
                RewardsError::InvalidArgument(format!(
                    "block tag {tag:?} refers to a pending block"
                ))
            })
        }
        BlockSpec::Timestamp(ts) => Ok(reader.latest_block_at_or_before(ts).await?),
    }
}

fn back_block(to_block: u64, blocks: u64) -> Result<u64, RewardsError> {
    to_block.checked_sub(blocks).ok_or_else(|| {
        RewardsError::InvalidArgument(format!(
            "cannot go {blocks} blocks back from block {to_block}"
        ))
    })
}

/// Resolve the query's range. `now` anchors day/second offsets.
pub async fn resolve_range<R: BlockResolver + ?Sized>(
    reader: &R,
    query: &RewardQuery,
    now: OffsetDateTime,
) -> Result<BlockRange, RewardsError> {
    validate_query(query)?;
    let to_block = resolve_block(reader, query.to).await?;
    let from_block = match query.from {
        FromSpec::Block(spec) => resolve_block(reader, spec).await?,
        FromSpec::Back(back) => {
            if let Some(blocks) = back.blocks {
                back_block(to_block, blocks)?
            } else {
                let offset = back
                    .days
                    .map(|days| days.saturating_mul(SECONDS_PER_DAY))
                    .or(back.seconds)
                    .ok_or_else(|| {
                        RewardsError::InvalidArgument(
                            "back must set at least one of blocks, days or seconds".to_string(),
                        )
                    })?;
                let now_secs = u64::try_from(now.unix_timestamp()).unwrap_or(0);
                let target = now_secs.checked_sub(offset).ok_or_else(|| {
                    RewardsError::InvalidArgument(format!(
                        "back offset of {offset}s precedes the unix epoch"
                    ))
                })?;
                reader.latest_block_at_or_before(target).await?
            }
        }
    };
    if to_block < from_block {
        return Err(RewardsError::InvalidArgument(format!(
            "from block {from_block} is after to block {to_block}"
        )));
    }
    debug!(from_block, to_block, "resolved range");
    Ok(BlockRange {
        from_block,
        to_block,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FetchError;
    use crate::lido::reader::BlockInfo;
    use async_trait::async_trait;

    /// Block n has timestamp 1000 + 12 * n; head is block 1000.
    struct Blocks {
        pending_latest: bool,
    }

    #[async_trait]
    impl BlockResolver for Blocks {
        async fn block(&self, spec: BlockSpec) -> Result<BlockInfo, FetchError> {
            let number = match spec {
                BlockSpec::Number(n) => Some(n),
                BlockSpec::Tag(BlockTag::Pending) => None,
                BlockSpec::Tag(BlockTag::Latest) if self.pending_latest => None,
                BlockSpec::Tag(BlockTag::Earliest) => Some(0),
                BlockSpec::Tag(_) => Some(1000),
                BlockSpec::Timestamp(ts) => Some(self.latest_block_at_or_before(ts).await?),
            };
            Ok(BlockInfo {
                number,
                timestamp: 1000 + 12 * number.unwrap_or(1000),
            })
        }

        async fn latest_block_at_or_before(&self, timestamp: u64) -> Result<u64, FetchError> {
            if timestamp < 1000 {
                return Err(FetchError::NoBlockBefore(timestamp));
            }
            Ok(((timestamp - 1000) / 12).min(1000))
        }
    }

    fn query(from: FromSpec, to: BlockSpec) -> RewardQuery {
        RewardQuery {
            account: Address::ZERO,
            from,
            to,
            step: 10,
            include_zero_rebases: false,
            include_only_rebases: false,
        }
    }

    fn now() -> OffsetDateTime {
        // block 1000
        OffsetDateTime::from_unix_timestamp(1000 + 12 * 1000).unwrap()
    }

    fn blocks() -> Blocks {
        Blocks {
            pending_latest: false,
        }
    }

    #[tokio::test]
    async fn explicit_bounds() {
        let q = query(FromSpec::Block(BlockSpec::Number(10)), BlockSpec::Number(20));
        let r = resolve_range(&blocks(), &q, now()).await.unwrap();
        assert_eq!((r.from_block, r.to_block), (10, 20));
        assert_eq!(r.pre_block(), 9);
    }

    #[tokio::test]
    async fn blocks_back_from_latest() {
        let back = BackSpec {
            blocks: Some(100),
            ..Default::default()
        };
        let q = query(FromSpec::Back(back), BlockSpec::default());
        let r = resolve_range(&blocks(), &q, now()).await.unwrap();
        assert_eq!((r.from_block, r.to_block), (900, 1000));
    }

    #[tokio::test]
    async fn seconds_and_days_back_use_timestamp_lookup() {
        let secs = BackSpec {
            seconds: Some(1200),
            ..Default::default()
        };
        let r = resolve_range(&blocks(), &query(FromSpec::Back(secs), BlockSpec::default()), now())
            .await
            .unwrap();
        assert_eq!(r.from_block, 900);

        let days = BackSpec {
            days: Some(1),
            ..Default::default()
        };
        let q = query(FromSpec::Back(days), BlockSpec::default());
        let err = resolve_range(&blocks(), &q, now()).await.unwrap_err();
        assert!(matches!(err, RewardsError::InvalidArgument(_)));

        let before_genesis = BackSpec {
            seconds: Some(12_500),
            ..Default::default()
        };
        let err = resolve_range(
            &blocks(),
            &query(FromSpec::Back(before_genesis), BlockSpec::default()),
            now(),
        )
        .await
        .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn days_back_resolves_through_timestamp_lookup() {
        let days = BackSpec {
            days: Some(1),
            ..Default::default()
        };
        let q = query(FromSpec::Back(days), BlockSpec::default());
        // one day after block 500's timestamp
        let later = OffsetDateTime::from_unix_timestamp(1000 + 12 * 500 + 86_400).unwrap();
        let r = resolve_range(&blocks(), &q, later).await.unwrap();
        assert_eq!((r.from_block, r.to_block), (500, 1000));
    }

    #[tokio::test]
    async fn timestamp_to_resolves_to_latest_block_not_after() {
        let q = query(
            FromSpec::Block(BlockSpec::Number(10)),
            BlockSpec::Timestamp(1000 + 12 * 700 + 5),
        );
        let r = resolve_range(&blocks(), &q, now()).await.unwrap();
        assert_eq!((r.from_block, r.to_block), (10, 700));
    }

    #[tokio::test]
    async fn argument_errors() {
        let too_far = BackSpec {
            blocks: Some(1001),
            ..Default::default()
        };
        let q = query(FromSpec::Back(too_far), BlockSpec::default());
        let err = resolve_range(&blocks(), &q, now()).await.unwrap_err();
        assert!(matches!(err, RewardsError::InvalidArgument(_)));

        let empty = query(FromSpec::Back(BackSpec::default()), BlockSpec::default());
        assert!(matches!(
            resolve_range(&blocks(), &empty, now()).await,
            Err(RewardsError::InvalidArgument(_))
        ));

        let inverted = query(FromSpec::Block(BlockSpec::Number(20)), BlockSpec::Number(10));
        assert!(matches!(
            resolve_range(&blocks(), &inverted, now()).await,
            Err(RewardsError::InvalidArgument(_))
        ));

        let mut zero_step = query(FromSpec::Block(BlockSpec::Number(1)), BlockSpec::Number(2));
        zero_step.step = 0;
        assert!(matches!(
            resolve_range(&blocks(), &zero_step, now()).await,
            Err(RewardsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn pending_tag_is_rejected() {
        let q = query(
            FromSpec::Block(BlockSpec::Number(1)),
            BlockSpec::Tag(BlockTag::Pending),
        );
        assert!(matches!(
            resolve_range(&blocks(), &q, now()).await,
            Err(RewardsError::InvalidArgument(_))
        ));
        let q = query(FromSpec::Block(BlockSpec::Number(1)), BlockSpec::default());
        let pending = Blocks {
            pending_latest: true,
        };
        assert!(matches!(
            resolve_range(&pending, &q, now()).await,
            Err(RewardsError::InvalidArgument(_))
        ));
    }
}
