//! Chronological merge of event streams and the running-balance fold.

use alloy::primitives::{Address, I256, U256};

use crate::amount::to_signed;
use crate::compute::share_rate::{shares_to_asset, ShareRate};
use crate::error::RewardsError;
use crate::lido::{
    BaseState, RawEvent, RewardRecord, RewardType, TokenRebased, TotalSupply, TransferShares,
};

/// Who the ledger is for and which counterparty counts as a withdrawal.
#[derive(Clone, Copy, Debug)]
pub struct FoldContext {
    pub account: Address,
    pub withdrawal_queue: Address,
}

#[derive(Clone, Debug, Default)]
pub struct FoldOutput {
    pub records: Vec<RewardRecord>,
    pub total_rewards: I256,
}

/// Concatenate streams and stable-sort by `(block, log_index)`.
/// The same log delivered by two streams (self-transfer) is kept once.
pub fn merge_events(streams: Vec<Vec<RawEvent>>) -> Vec<RawEvent> {
    let mut events: Vec<RawEvent> = streams.into_iter().flatten().collect();
    events.sort_by_key(RawEvent::position);
    events.dedup();
    events
}

struct FoldState {
    totals: TotalSupply,
    share_rate: ShareRate,
    shares: U256,
    balance: U256,
    total_rewards: I256,
}

/// Left-to-right fold over merged events. `base` is the position just before the range.
pub fn fold_events(
    ctx: &FoldContext,
    base: &BaseState,
    events: Vec<RawEvent>,
) -> Result<FoldOutput, RewardsError> {
    let mut state = FoldState {
        totals: base.totals,
        share_rate: rate_of(&base.totals)?,
        shares: base.balance_shares,
        balance: base.balance,
        total_rewards: I256::ZERO,
    };
    let mut records = Vec::with_capacity(events.len());
    for event in events {
        let record = match &event {
            RawEvent::TransferShares(t) => state.apply_transfer(ctx, t)?,
            RawEvent::TokenRebased(r) => state.apply_rebase(r)?,
        };
        records.push(record);
    }
    Ok(FoldOutput {
        records,
        total_rewards: state.total_rewards,
    })
}

/// Classify a transfer from the account's point of view.
pub fn classify_transfer(ctx: &FoldContext, from: Address, to: Address) -> RewardType {
    if to == ctx.account {
        if from == Address::ZERO {
            RewardType::Submit
        } else {
            RewardType::TransferIn
        }
    } else if to == ctx.withdrawal_queue {
        RewardType::Withdrawal
    } else {
        RewardType::TransferOut
    }
}

impl FoldState {
    fn apply_transfer(
        &mut self,
        ctx: &FoldContext,
        t: &TransferShares,
    ) -> Result<RewardRecord, RewardsError> {
        let kind = classify_transfer(ctx, t.from, t.to);
        let incoming = matches!(kind, RewardType::Submit | RewardType::TransferIn);
        let self_transfer = t.from == ctx.account && t.to == ctx.account;

        let change_shares = if self_transfer {
            I256::ZERO
        } else if incoming {
            to_signed(t.shares_value)?
        } else {
            -to_signed(t.shares_value)?
        };

        let (balance_shares, balance, change, share_rate) = match &t.snapshot {
            Some(snap) => {
                let value = to_signed(snap.value)?;
                let change = if self_transfer {
                    I256::ZERO
                } else if incoming {
                    value
                } else {
                    -value
                };
                (snap.balance_shares, snap.balance, change, rate_of(&snap.totals)?)
            }
            None => {
                let balance_shares = if self_transfer {
                    self.shares
                } else if incoming {
                    self.shares.checked_add(t.shares_value).ok_or_else(|| {
                        RewardsError::Invariant(format!(
                            "share balance overflow at block {}",
                            t.block_number
                        ))
                    })?
                } else {
                    self.shares.checked_sub(t.shares_value).ok_or_else(|| {
                        RewardsError::Invariant(format!(
                            "share balance underflow at block {} log {}",
                            t.block_number, t.log_index
                        ))
                    })?
                };
                let balance = self.to_asset(balance_shares, &self.totals)?;
                let change = to_signed(balance)? - to_signed(self.balance)?;
                (balance_shares, balance, change, self.share_rate)
            }
        };

        self.shares = balance_shares;
        self.balance = balance;
        Ok(RewardRecord {
            kind,
            balance_shares,
            change_shares,
            change,
            balance,
            share_rate,
            apr: None,
            original_event: RawEvent::TransferShares(t.clone()),
        })
    }

    fn apply_rebase(&mut self, r: &TokenRebased) -> Result<RewardRecord, RewardsError> {
        let old_balance = match &r.pre_totals {
            Some(pre) => self.to_asset(self.shares, pre)?,
            None => self.balance,
        };
        self.totals = r.post_totals;
        self.share_rate = rate_of(&self.totals)?;
        let new_balance = self.to_asset(self.shares, &self.totals)?;
        let change = to_signed(new_balance)? - to_signed(old_balance)?;
        self.total_rewards += change;
        self.balance = new_balance;
        Ok(RewardRecord {
            kind: RewardType::Rebase,
            balance_shares: self.shares,
            change_shares: I256::ZERO,
            change,
            balance: new_balance,
            share_rate: self.share_rate,
            apr: r.apr,
            original_event: RawEvent::TokenRebased(r.clone()),
        })
    }

    fn to_asset(&self, shares: U256, totals: &TotalSupply) -> Result<U256, RewardsError> {
        shares_to_asset(shares, totals.total_ether, totals.total_shares).ok_or_else(|| {
            RewardsError::Invariant(format!("shares_to_asset overflow for {shares} shares"))
        })
    }
}

pub(crate) fn rate_of(totals: &TotalSupply) -> Result<ShareRate, RewardsError> {
    ShareRate::from_totals(totals)
        .ok_or_else(|| RewardsError::Invariant("share rate overflow".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lido::TransferSnapshot;
    use alloy::primitives::address;

    const ACCOUNT: Address = address!("0x1111111111111111111111111111111111111111");
    const OTHER: Address = address!("0x2222222222222222222222222222222222222222");
    const QUEUE: Address = address!("0x889edC2eDab5f40e902b864aD4d7AdE8E412F9B1");

    fn ctx() -> FoldContext {
        FoldContext {
            account: ACCOUNT,
            withdrawal_queue: QUEUE,
        }
    }

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn i(v: i64) -> I256 {
        I256::try_from(v).unwrap()
    }

    fn transfer(from: Address, to: Address, shares: u64, block: u64, log: u64) -> RawEvent {
        RawEvent::TransferShares(TransferShares {
            from,
            to,
            shares_value: u(shares),
            block_number: block,
            log_index: log,
            tx_hash: None,
            snapshot: None,
        })
    }

    fn rebase(ether: u64, shares: u64, block: u64, log: u64) -> RawEvent {
        RawEvent::TokenRebased(TokenRebased {
            post_totals: TotalSupply::new(u(ether), u(shares)),
            pre_totals: None,
            apr: None,
            block_number: block,
            log_index: log,
            tx_hash: None,
        })
    }

    fn base(ether: u64, shares: u64) -> BaseState {
        BaseState {
            balance_shares: U256::ZERO,
            balance: U256::ZERO,
            totals: TotalSupply::new(u(ether), u(shares)),
        }
    }

    #[test]
    fn submit_then_rebase_earns_one_wei() {
        let events = merge_events(vec![
            vec![transfer(Address::ZERO, ACCOUNT, 100, 10, 0)],
            vec![rebase(1100, 10_000, 20, 0)],
        ]);
        let out = fold_events(&ctx(), &base(1000, 10_000), events).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].kind, RewardType::Submit);
        assert_eq!(out.records[0].balance_shares, u(100));
        assert_eq!(out.records[0].balance, u(10));
        assert_eq!(out.records[1].kind, RewardType::Rebase);
        assert_eq!(out.records[1].change, i(1));
        assert_eq!(out.records[1].balance, u(11));
        assert_eq!(out.records[1].change_shares, I256::ZERO);
        assert_eq!(out.total_rewards, i(1));
    }

    #[test]
    fn classification_covers_all_directions() {
        assert_eq!(classify_transfer(&ctx(), Address::ZERO, ACCOUNT), RewardType::Submit);
        assert_eq!(classify_transfer(&ctx(), OTHER, ACCOUNT), RewardType::TransferIn);
        assert_eq!(classify_transfer(&ctx(), ACCOUNT, QUEUE), RewardType::Withdrawal);
        assert_eq!(classify_transfer(&ctx(), ACCOUNT, OTHER), RewardType::TransferOut);
    }

    #[test]
    fn merge_is_stable_and_chronological() {
        let merged = merge_events(vec![
            vec![transfer(ACCOUNT, OTHER, 1, 5, 3), transfer(ACCOUNT, OTHER, 1, 9, 0)],
            vec![transfer(OTHER, ACCOUNT, 1, 5, 1)],
            vec![rebase(1, 1, 5, 2), rebase(1, 1, 1, 7)],
        ]);
        let positions: Vec<_> = merged.iter().map(RawEvent::position).collect();
        assert_eq!(positions, vec![(1, 7), (5, 1), (5, 2), (5, 3), (9, 0)]);
    }

    #[test]
    fn self_transfer_is_deduplicated_and_neutral() {
        let t = transfer(ACCOUNT, ACCOUNT, 50, 4, 0);
        let merged = merge_events(vec![vec![t.clone()], vec![t]]);
        assert_eq!(merged.len(), 1);
        let mut b = base(1000, 1000);
        b.balance_shares = u(70);
        b.balance = u(70);
        let out = fold_events(&ctx(), &b, merged).unwrap();
        assert_eq!(out.records[0].kind, RewardType::TransferIn);
        assert_eq!(out.records[0].change_shares, I256::ZERO);
        assert_eq!(out.records[0].balance_shares, u(70));
    }

    #[test]
    fn share_balance_chain_holds() {
        let events = merge_events(vec![
            vec![transfer(Address::ZERO, ACCOUNT, 500, 1, 0)],
            vec![transfer(ACCOUNT, OTHER, 120, 3, 0)],
            vec![transfer(ACCOUNT, QUEUE, 80, 5, 1)],
            vec![rebase(1200, 1000, 4, 0), rebase(1300, 1000, 6, 0)],
        ]);
        let b = base(1000, 1000);
        let out = fold_events(&ctx(), &b, events).unwrap();
        let mut prev = b.balance_shares;
        for r in &out.records {
            let expected = if r.change_shares.is_negative() {
                prev - r.change_shares.unsigned_abs()
            } else {
                prev + r.change_shares.unsigned_abs()
            };
            assert_eq!(r.balance_shares, expected);
            prev = r.balance_shares;
        }
        assert_eq!(out.records[2].kind, RewardType::Rebase);
        assert_eq!(out.records[3].kind, RewardType::Withdrawal);
        let rebase_sum = out
            .records
            .iter()
            .filter(|r| r.kind.is_rebase())
            .fold(I256::ZERO, |acc, r| acc + r.change);
        assert_eq!(rebase_sum, out.total_rewards);
    }

    #[test]
    fn transfer_uses_rate_before_event() {
        let events = merge_events(vec![vec![
            rebase(2000, 1000, 2, 0),
            transfer(OTHER, ACCOUNT, 10, 2, 1),
        ]]);
        let out = fold_events(&ctx(), &base(1000, 1000), events).unwrap();
        assert_eq!(out.records[1].balance, u(20));
        assert_eq!(out.records[1].share_rate, out.records[0].share_rate);
    }

    #[test]
    fn outgoing_beyond_balance_is_invariant_error() {
        let events = vec![transfer(ACCOUNT, OTHER, 1, 1, 0)];
        let err = fold_events(&ctx(), &base(1, 1), events).unwrap_err();
        assert!(matches!(err, RewardsError::Invariant(_)));
    }

    #[test]
    fn snapshot_and_pre_totals_are_used_verbatim() {
        let t = RawEvent::TransferShares(TransferShares {
            from: OTHER,
            to: ACCOUNT,
            shares_value: u(100),
            block_number: 3,
            log_index: 0,
            tx_hash: None,
            snapshot: Some(TransferSnapshot {
                balance_shares: u(400),
                balance: u(440),
                value: u(110),
                totals: TotalSupply::new(u(1100), u(1000)),
            }),
        });
        let r = RawEvent::TokenRebased(TokenRebased {
            post_totals: TotalSupply::new(u(1200), u(1000)),
            pre_totals: Some(TotalSupply::new(u(1150), u(1000))),
            apr: Some(4.2),
            block_number: 8,
            log_index: 0,
            tx_hash: None,
        });
        let out = fold_events(&ctx(), &BaseState::default(), vec![t, r]).unwrap();
        assert_eq!(out.records[0].change, i(110));
        assert_eq!(out.records[0].balance, u(440));
        // 400 * 1200 / 1000 - 400 * 1150 / 1000
        assert_eq!(out.records[1].change, i(20));
        assert_eq!(out.records[1].apr, Some(4.2));
    }
}
