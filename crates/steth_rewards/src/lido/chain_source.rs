//! Reward ledger from raw chain logs and historical `eth_call` state.

use alloy::rpc::types::Log;
use time::OffsetDateTime;
use tracing::info;

use crate::chain::request_with_block_step;
use crate::compute::{base_balance, build_ledger, FoldContext};
use crate::error::RewardsError;
use crate::lido::contracts::decode_log;
use crate::lido::network::Deployment;
use crate::lido::range::{resolve_range, validate_query, RewardQuery};
use crate::lido::reader::{BlockResolver, ChainEventReader, StateReader, TransferDirection};
use crate::lido::{BaseState, RawEvent, RewardLedger};
use crate::trace::traced;

fn decode_all(logs: Vec<Log>) -> Result<Vec<RawEvent>, RewardsError> {
    logs.iter().map(decode_log).collect()
}

/// Compute the ledger for `query` from chain data.
///
/// Base state is read at `from_block - 1`. Both transfer directions and all rebases in the
/// range are fetched concurrently with the base reads, each in chunks of `query.step` blocks.
pub async fn rewards_from_chain<C>(
    client: &C,
    deployment: &Deployment,
    query: &RewardQuery,
    now: OffsetDateTime,
) -> Result<RewardLedger, RewardsError>
where
    C: BlockResolver + StateReader + ChainEventReader,
{
    traced("rewards_from_chain", async {
        validate_query(query)?;
        let range = resolve_range(client, query, now).await?;
        if range.from_block < deployment.earliest_rebase_block {
            return Err(RewardsError::NotSupported(format!(
                "from block {} precedes the first TokenRebased block {} on chain {}",
                range.from_block, deployment.earliest_rebase_block, deployment.chain_id
            )));
        }
        let pre_block = range.pre_block();
        let account = query.account;
        let (from, to) = (range.from_block, range.to_block);

        let (shares, totals, sent, received, rebases) = tokio::join!(
            client.share_balance(account, pre_block),
            client.total_supply(pre_block),
            request_with_block_step(query.step, from, to, |a, b| {
                client.transfer_logs(TransferDirection::From, account, a, b)
            }),
            request_with_block_step(query.step, from, to, |a, b| {
                client.transfer_logs(TransferDirection::To, account, a, b)
            }),
            request_with_block_step(query.step, from, to, |a, b| client.rebase_logs(a, b)),
        );
        let (shares, totals) = (shares?, totals?);
        let (sent, received, rebases) = (sent?, received?, rebases?);
        info!(
            from_block = from,
            to_block = to,
            sent = sent.len(),
            received = received.len(),
            rebases = rebases.len(),
            "chain streams fetched"
        );

        let base = BaseState {
            balance_shares: shares,
            balance: base_balance(shares, &totals)?,
            totals,
        };
        let ctx = FoldContext {
            account,
            withdrawal_queue: deployment.withdrawal_queue,
        };
        let streams = vec![decode_all(sent)?, decode_all(received)?, decode_all(rebases)?];
        build_ledger(&ctx, &base, from, to, streams, query.filter())
    })
    .await
}
