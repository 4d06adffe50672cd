//! Fixed-point conversion between shares and wei.
//!
//! Integer-only with truncating division. Every reported `change`/`balance` is rounded by
//! these two functions, so their results must match the ledger contract bit for bit.

use alloy::primitives::{uint, U256};
use serde::{Deserialize, Serialize};

use crate::amount::decimal;
use crate::lido::TotalSupply;

/// Denominator of [`ShareRate`].
pub const SHARE_RATE_PRECISION: U256 = uint!(1_000_000_000_000_000_000_000_000_000_U256);

/// Ether per share scaled by [`SHARE_RATE_PRECISION`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareRate(#[serde(with = "decimal")] pub U256);

impl ShareRate {
    /// `None` only if the scaled product overflows 256 bits.
    pub fn from_totals(totals: &TotalSupply) -> Option<Self> {
        compute_share_rate(totals.total_ether, totals.total_shares, SHARE_RATE_PRECISION)
            .map(ShareRate)
    }
}

/// `shares * total_ether / total_shares`, or zero when there are no shares.
/// `None` if the product overflows.
pub fn shares_to_asset(shares: U256, total_ether: U256, total_shares: U256) -> Option<U256> {
    if total_shares.is_zero() {
        return Some(U256::ZERO);
    }
    shares.checked_mul(total_ether).map(|p| p / total_shares)
}

/// `total_ether * precision / total_shares`, or zero when there are no shares.
pub fn compute_share_rate(total_ether: U256, total_shares: U256, precision: U256) -> Option<U256> {
    if total_shares.is_zero() {
        return Some(U256::ZERO);
    }
    total_ether.checked_mul(precision).map(|p| p / total_shares)
}
