//! Ledger bundle, reproducibility hash, and verification.

mod bundle;

pub use bundle::normalize_for_hash;
pub use bundle::{
    ledger_hash, read_bundle, verify_ledger_hash, write_bundle, LedgerBundle, LedgerSource,
    VerificationResult, VerifyError,
};
