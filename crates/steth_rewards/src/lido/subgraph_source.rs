//! Reward ledger from the Lido subgraph's denormalized entities.

use alloy::primitives::Address;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::amount::parse_u256;
use crate::chain::{FetchError, RebaseEntity, TransferEntity};
use crate::compute::{build_ledger, FoldContext};
use crate::error::RewardsError;
use crate::lido::network::Deployment;
use crate::lido::range::{resolve_range, validate_query, RewardQuery};
use crate::lido::reader::{BlockResolver, IndexedQuery};
use crate::lido::{
    BaseState, RawEvent, RewardLedger, TokenRebased, TotalSupply, TransferShares,
    TransferSnapshot,
};
use crate::trace::traced;

fn parse_u64(field: &str, s: &str) -> Result<u64, FetchError> {
    s.trim()
        .parse()
        .map_err(|_| FetchError::Decode(format!("{field}: expected integer, got {s:?}")))
}

/// Post-transfer snapshot from the account's side: increase fields when it received.
fn snapshot_for(account: Address, t: &TransferEntity) -> Result<TransferSnapshot, FetchError> {
    let (shares, balance) = if t.to == account {
        (&t.shares_after_increase, &t.balance_after_increase)
    } else {
        (&t.shares_after_decrease, &t.balance_after_decrease)
    };
    Ok(TransferSnapshot {
        balance_shares: parse_u256("sharesAfter", shares)?,
        balance: parse_u256("balanceAfter", balance)?,
        value: parse_u256("value", &t.value)?,
        totals: TotalSupply::new(
            parse_u256("totalPooledEther", &t.total_pooled_ether)?,
            parse_u256("totalShares", &t.total_shares)?,
        ),
    })
}

pub(crate) fn transfer_event(account: Address, t: &TransferEntity) -> Result<RawEvent, FetchError> {
    Ok(RawEvent::TransferShares(TransferShares {
        from: t.from,
        to: t.to,
        shares_value: parse_u256("shares", &t.shares)?,
        block_number: parse_u64("block", &t.block)?,
        log_index: parse_u64("logIndex", &t.log_index)?,
        tx_hash: t.transaction_hash,
        snapshot: Some(snapshot_for(account, t)?),
    }))
}

fn post_totals(r: &RebaseEntity) -> Result<TotalSupply, FetchError> {
    Ok(TotalSupply::new(
        parse_u256("totalPooledEtherAfter", &r.total_pooled_ether_after)?,
        parse_u256("totalSharesAfter", &r.total_shares_after)?,
    ))
}

pub(crate) fn rebase_event(r: &RebaseEntity) -> Result<RawEvent, FetchError> {
    let apr = match &r.apr {
        Some(s) => Some(
            s.trim()
                .parse::<f64>()
                .map_err(|_| FetchError::Decode(format!("apr: expected decimal, got {s:?}")))?,
        ),
        None => None,
    };
    Ok(RawEvent::TokenRebased(TokenRebased {
        post_totals: post_totals(r)?,
        pre_totals: Some(TotalSupply::new(
            parse_u256("totalPooledEtherBefore", &r.total_pooled_ether_before)?,
            parse_u256("totalSharesBefore", &r.total_shares_before)?,
        )),
        apr,
        block_number: parse_u64("block", &r.block)?,
        log_index: parse_u64("logIndex", &r.log_index)?,
        tx_hash: r.transaction_hash,
    }))
}

/// Seed from the last entities before the range; absent entities leave zeros.
pub(crate) fn base_from_entities(
    account: Address,
    last_transfer: Option<&TransferEntity>,
    last_rebase: Option<&RebaseEntity>,
) -> Result<BaseState, FetchError> {
    let mut base = BaseState::default();
    if let Some(t) = last_transfer {
        let snap = snapshot_for(account, t)?;
        base.balance_shares = snap.balance_shares;
        base.balance = snap.balance;
    }
    if let Some(r) = last_rebase {
        base.totals = post_totals(r)?;
    }
    Ok(base)
}

/// Compute the ledger for `query` from the subgraph.
///
/// `blocks` resolves tags and timestamps; the upper bound is then capped to the subgraph's
/// last indexed block and the ledger reports the capped value.
pub async fn rewards_from_subgraph<S, B>(
    subgraph: &S,
    blocks: &B,
    deployment: &Deployment,
    query: &RewardQuery,
    now: OffsetDateTime,
) -> Result<RewardLedger, RewardsError>
where
    S: IndexedQuery + ?Sized,
    B: BlockResolver + ?Sized,
{
    traced("rewards_from_subgraph", async {
        validate_query(query)?;
        let range = resolve_range(blocks, query, now).await?;
        let last_indexed = subgraph.last_indexed_block().await?;
        let to = range.to_block.min(last_indexed);
        if to < range.to_block {
            warn!(
                requested = range.to_block,
                last_indexed, "subgraph behind requested range; capping"
            );
        }
        let from = range.from_block;
        if to < from {
            return Err(RewardsError::InvalidArgument(format!(
                "subgraph indexed up to block {last_indexed}, before from block {from}"
            )));
        }
        let pre_block = range.pre_block();
        let account = query.account;

        let (last_transfer, last_rebase, transfers, rebases) = tokio::join!(
            subgraph.last_transfer_before(account, pre_block),
            subgraph.last_rebase_before(pre_block),
            subgraph.transfers_in_range(account, from, to, query.step),
            subgraph.rebases_in_range(from, to, query.step),
        );
        let (last_transfer, last_rebase) = (last_transfer?, last_rebase?);
        let (transfers, rebases) = (transfers?, rebases?);
        info!(
            from_block = from,
            to_block = to,
            transfers = transfers.len(),
            rebases = rebases.len(),
            "subgraph streams fetched"
        );

        let base = base_from_entities(account, last_transfer.as_ref(), last_rebase.as_ref())?;
        let transfer_events = transfers
            .iter()
            .map(|t| transfer_event(account, t))
            .collect::<Result<Vec<_>, _>>()?;
        let rebase_events = rebases
            .iter()
            .map(rebase_event)
            .collect::<Result<Vec<_>, _>>()?;
        let ctx = FoldContext {
            account,
            withdrawal_queue: deployment.withdrawal_queue,
        };
        build_ledger(
            &ctx,
            &base,
            from,
            to,
            vec![transfer_events, rebase_events],
            query.filter(),
        )
    })
    .await
}
