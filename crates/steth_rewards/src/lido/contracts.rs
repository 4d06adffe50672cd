//! stETH ABI surface and log → [`RawEvent`] decoding.

use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use tracing::debug;

use crate::compute::{compute_share_rate, SHARE_RATE_PRECISION};
use crate::error::RewardsError;
use crate::lido::{RawEvent, TokenRebased, TotalSupply, TransferShares};

alloy::sol! {
    #[sol(rpc)]
    interface IStETH {
        event TransferShares(address indexed from, address indexed to, uint256 sharesValue);

        event TokenRebased(
            uint256 indexed reportTimestamp,
            uint256 timeElapsed,
            uint256 preTotalShares,
            uint256 preTotalEther,
            uint256 postTotalShares,
            uint256 postTotalEther,
            uint256 sharesMintedAsFees
        );

        function sharesOf(address account) external view returns (uint256);
        function getTotalPooledEther() external view returns (uint256);
        function getTotalShares() external view returns (uint256);
    }
}

const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// Annualized share-rate growth of one rebase, in percent.
pub fn rebase_apr(pre: &TotalSupply, post: &TotalSupply, time_elapsed: u64) -> Option<f64> {
    if time_elapsed == 0 {
        return None;
    }
    let pre_rate = compute_share_rate(pre.total_ether, pre.total_shares, SHARE_RATE_PRECISION)?;
    let post_rate = compute_share_rate(post.total_ether, post.total_shares, SHARE_RATE_PRECISION)?;
    if pre_rate.is_zero() {
        return None;
    }
    let pre_f = f64::from(pre_rate);
    let post_f = f64::from(post_rate);
    Some((post_f - pre_f) / pre_f * SECONDS_PER_YEAR / time_elapsed as f64 * 100.0)
}

fn position(log: &Log) -> Result<(u64, u64), RewardsError> {
    match (log.block_number, log.log_index) {
        (Some(b), Some(i)) => Ok((b, i)),
        _ => Err(RewardsError::Invariant(format!(
            "log without block position: {:?}",
            log.transaction_hash
        ))),
    }
}

/// Decode a stETH log. A signature that is neither `TransferShares` nor `TokenRebased`
/// is an invariant violation and aborts the computation.
pub fn decode_log(log: &Log) -> Result<RawEvent, RewardsError> {
    let (block_number, log_index) = position(log)?;
    let tx_hash = log.transaction_hash;
    match log.topic0() {
        Some(t) if *t == IStETH::TransferShares::SIGNATURE_HASH => {
            let ev = log
                .log_decode::<IStETH::TransferShares>()
                .map_err(|e| RewardsError::Invariant(format!("TransferShares decode: {e}")))?;
            let data = ev.inner.data;
            Ok(RawEvent::TransferShares(TransferShares {
                from: data.from,
                to: data.to,
                shares_value: data.sharesValue,
                block_number,
                log_index,
                tx_hash,
                snapshot: None,
            }))
        }
        Some(t) if *t == IStETH::TokenRebased::SIGNATURE_HASH => {
            let ev = log
                .log_decode::<IStETH::TokenRebased>()
                .map_err(|e| RewardsError::Invariant(format!("TokenRebased decode: {e}")))?;
            let data = ev.inner.data;
            let pre = TotalSupply::new(data.preTotalEther, data.preTotalShares);
            let post = TotalSupply::new(data.postTotalEther, data.postTotalShares);
            let elapsed = u64::try_from(data.timeElapsed).unwrap_or(0);
            Ok(RawEvent::TokenRebased(TokenRebased {
                post_totals: post,
                pre_totals: None,
                apr: rebase_apr(&pre, &post, elapsed),
                block_number,
                log_index,
                tx_hash,
            }))
        }
        other => {
            debug!(topic0 = ?other, block_number, log_index, "unrecognized log");
            Err(RewardsError::Invariant(format!(
                "impossible event at block {block_number} log {log_index}: topic0 {other:?}"
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::{address, Address, LogData, U256};

    pub const STETH: Address = address!("0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84");

    pub fn rpc_log(data: LogData, block: u64, index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: STETH,
                data,
            },
            block_number: Some(block),
            log_index: Some(index),
            ..Default::default()
        }
    }

    pub fn transfer_log(from: Address, to: Address, shares: u64, block: u64, index: u64) -> Log {
        let ev = IStETH::TransferShares {
            from,
            to,
            sharesValue: U256::from(shares),
        };
        rpc_log(ev.encode_log_data(), block, index)
    }

    pub fn rebase_log(pre: (u64, u64), post: (u64, u64), block: u64, index: u64) -> Log {
        let ev = IStETH::TokenRebased {
            reportTimestamp: U256::from(1_700_000_000u64),
            timeElapsed: U256::from(86_400u64),
            preTotalShares: U256::from(pre.1),
            preTotalEther: U256::from(pre.0),
            postTotalShares: U256::from(post.1),
            postTotalEther: U256::from(post.0),
            sharesMintedAsFees: U256::ZERO,
        };
        rpc_log(ev.encode_log_data(), block, index)
    }

    #[test]
    fn decodes_transfer_shares() {
        let to = address!("0x1111111111111111111111111111111111111111");
        let ev = decode_log(&transfer_log(Address::ZERO, to, 100, 10, 4)).unwrap();
        match ev {
            RawEvent::TransferShares(t) => {
                assert_eq!(t.from, Address::ZERO);
                assert_eq!(t.to, to);
                assert_eq!(t.shares_value, U256::from(100));
                assert_eq!((t.block_number, t.log_index), (10, 4));
                assert!(t.snapshot.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_token_rebased_with_apr() {
        let ev = decode_log(&rebase_log((1000, 1000), (1001, 1000), 20, 0)).unwrap();
        match ev {
            RawEvent::TokenRebased(r) => {
                assert_eq!(r.post_totals, TotalSupply::new(U256::from(1001), U256::from(1000)));
                assert!(r.pre_totals.is_none());
                // 0.1% per day
                let apr = r.apr.unwrap();
                assert!((apr - 36.5).abs() < 1e-9, "{apr}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_signature_is_invariant_violation() {
        let data = LogData::new_unchecked(
            vec![alloy::primitives::B256::repeat_byte(0xab)],
            Default::default(),
        );
        let err = decode_log(&rpc_log(data, 1, 0)).unwrap_err();
        assert!(matches!(err, RewardsError::Invariant(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn pending_log_is_rejected() {
        let mut log = transfer_log(Address::ZERO, STETH, 1, 1, 0);
        log.block_number = None;
        assert!(decode_log(&log).is_err());
    }
}
