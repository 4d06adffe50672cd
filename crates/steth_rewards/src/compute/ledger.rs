//! Merge → fold → filter, shared by both event sources.

use alloy::primitives::U256;
use tracing::info;

use crate::compute::filters::{apply_filters, RecordFilter};
use crate::compute::fold::{fold_events, merge_events, rate_of, FoldContext};
use crate::compute::share_rate::shares_to_asset;
use crate::error::RewardsError;
use crate::lido::{BaseState, RawEvent, RewardLedger, TotalSupply};

/// Balance in wei implied by `shares` at `totals`, with overflow as an invariant error.
pub fn base_balance(shares: U256, totals: &TotalSupply) -> Result<U256, RewardsError> {
    shares_to_asset(shares, totals.total_ether, totals.total_shares)
        .ok_or_else(|| RewardsError::Invariant("base balance overflow".to_string()))
}

/// Build the ledger for `[from_block, to_block]` from already-normalized streams.
pub fn build_ledger(
    ctx: &FoldContext,
    base: &BaseState,
    from_block: u64,
    to_block: u64,
    streams: Vec<Vec<RawEvent>>,
    filter: RecordFilter,
) -> Result<RewardLedger, RewardsError> {
    let events = merge_events(streams);
    let merged = events.len();
    let folded = fold_events(ctx, base, events)?;
    let rewards = apply_filters(folded.records, filter);
    info!(merged, kept = rewards.len(), total_rewards = %folded.total_rewards, "ledger built");
    Ok(RewardLedger {
        base_balance: base.balance,
        base_balance_shares: base.balance_shares,
        base_share_rate: rate_of(&base.totals)?,
        total_rewards: folded.total_rewards,
        from_block,
        to_block,
        rewards,
    })
}
