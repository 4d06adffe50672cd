//! Ledger bundle and SHA-256 reproducibility hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

use crate::lido::{RewardLedger, RewardQuery};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSource {
    Chain,
    Subgraph,
}

/// Ledger plus the query that produced it. Only `ledger` enters the hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerBundle {
    pub version: u32,
    pub chain_id: u64,
    pub source: LedgerSource,
    pub query: RewardQuery,
    pub created_utc_rfc3339: String,
    pub ledger: RewardLedger,
}

const BUNDLE_VERSION: u32 = 1;

impl LedgerBundle {
    pub fn new(
        chain_id: u64,
        source: LedgerSource,
        query: RewardQuery,
        ledger: RewardLedger,
    ) -> Self {
        let created_utc_rfc3339 = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self {
            version: BUNDLE_VERSION,
            chain_id,
            source,
            query,
            created_utc_rfc3339,
            ledger,
        }
    }
}

/// Normalize JSON for hashing: sort keys and no whitespace.
pub fn normalize_for_hash(value: &serde_json::Value) -> Result<String, VerifyError> {
    Ok(serde_json::to_string(&sort_json_keys(value))?)
}

fn sort_json_keys(v: &serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(m) => {
            let mut entries: Vec<_> = m.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_json_keys(v)))
                .collect::<serde_json::Map<_, _>>()
                .into()
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_json_keys).collect())
        }
        other => other.clone(),
    }
}

/// SHA-256 over the normalized ledger JSON, lowercase hex.
pub fn ledger_hash(ledger: &RewardLedger) -> Result<String, VerifyError> {
    let json = serde_json::to_value(ledger)?;
    let normalized = normalize_for_hash(&json)?;
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationResult {
    pub ledger_hash: String,
    pub expected_hash: Option<String>,
    pub matches: bool,
}

/// Check a ledger against the content of a `.sha256` file.
pub fn verify_ledger_hash(
    ledger: &RewardLedger,
    expected_hex: &str,
) -> Result<VerificationResult, VerifyError> {
    let ledger_hash = ledger_hash(ledger)?;
    let expected = expected_hex.trim().to_lowercase();
    let matches = ledger_hash == expected;
    Ok(VerificationResult {
        ledger_hash,
        expected_hash: Some(expected),
        matches,
    })
}

pub fn write_bundle(path: &Path, bundle: &LedgerBundle) -> Result<(), VerifyError> {
    std::fs::write(path, serde_json::to_vec_pretty(bundle)?)?;
    Ok(())
}

pub fn read_bundle(path: &Path) -> Result<LedgerBundle, VerifyError> {
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ShareRate;
    use crate::lido::{
        rebase_apr, BlockSpec, FromSpec, RawEvent, RewardRecord, RewardType, TokenRebased,
        TotalSupply,
    };
    use alloy::primitives::{Address, I256, U256};

    fn ledger(total: i64) -> RewardLedger {
        RewardLedger {
            base_balance: U256::from(10),
            base_balance_shares: U256::from(9),
            base_share_rate: ShareRate::default(),
            total_rewards: I256::try_from(total).unwrap(),
            from_block: 1,
            to_block: 2,
            rewards: vec![],
        }
    }

    fn query() -> RewardQuery {
        RewardQuery {
            account: Address::ZERO,
            from: FromSpec::Block(BlockSpec::Number(1)),
            to: BlockSpec::Number(2),
            step: 10,
            include_zero_rebases: false,
            include_only_rebases: false,
        }
    }

    #[test]
    fn normalize_deterministic() {
        let a = serde_json::json!({"z":1,"a":{"y":2,"b":3}});
        let b = serde_json::json!({"a":{"b":3,"y":2},"z":1});
        assert_eq!(normalize_for_hash(&a).unwrap(), normalize_for_hash(&b).unwrap());
    }

    #[test]
    fn hash_tracks_ledger_content() {
        let h1 = ledger_hash(&ledger(1)).unwrap();
        assert_eq!(h1, ledger_hash(&ledger(1)).unwrap());
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, ledger_hash(&ledger(2)).unwrap());
    }

    #[test]
    fn verify_is_case_and_whitespace_insensitive() {
        let l = ledger(-5);
        let h = ledger_hash(&l).unwrap();
        let res = verify_ledger_hash(&l, &format!("  {}\n", h.to_uppercase())).unwrap();
        assert!(res.matches);
        assert!(!verify_ledger_hash(&l, "00").unwrap().matches);
    }

    #[test]
    fn bundle_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let bundle = LedgerBundle::new(1, LedgerSource::Chain, query(), ledger(3));
        write_bundle(&path, &bundle).unwrap();
        let back = read_bundle(&path).unwrap();
        assert_eq!(back, bundle);
        assert_eq!(ledger_hash(&back.ledger).unwrap(), ledger_hash(&bundle.ledger).unwrap());
    }

    fn rebase_ledger(k: u64) -> RewardLedger {
        let ether = 9_300_000_000_000_000_000_000_000u128 + u128::from(k) * 7_919;
        let shares = 8_100_000_000_000_000_000_000_000u128;
        let pre = TotalSupply::new(U256::from(ether), U256::from(shares));
        let post = TotalSupply::new(
            U256::from(ether + 2_400_000_000_000_000_000_000),
            U256::from(shares),
        );
        let apr = rebase_apr(&pre, &post, 86_400 + k);
        assert!(apr.is_some());
        let rebase = TokenRebased {
            post_totals: post,
            pre_totals: Some(pre),
            apr,
            block_number: 100 + k,
            log_index: 3,
            tx_hash: None,
        };
        let mut l = ledger(1);
        l.rewards.push(RewardRecord {
            kind: RewardType::Rebase,
            balance_shares: U256::from(9),
            change_shares: I256::ZERO,
            change: I256::ONE,
            balance: U256::from(11),
            share_rate: ShareRate::from_totals(&post).unwrap(),
            apr,
            original_event: RawEvent::TokenRebased(rebase),
        });
        l
    }

    #[test]
    fn saved_ledgers_with_apr_verify_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        for k in 0..2_000 {
            let l = rebase_ledger(k);
            let expected = ledger_hash(&l).unwrap();
            write_bundle(&path, &LedgerBundle::new(1, LedgerSource::Chain, query(), l)).unwrap();
            let back = read_bundle(&path).unwrap();
            assert_eq!(back.ledger.rewards[0].apr, rebase_ledger(k).rewards[0].apr, "k={k}");
            assert!(verify_ledger_hash(&back.ledger, &expected).unwrap().matches, "k={k}");
        }
    }
}
