//! Post-fold record suppression.
//!
//! Polarity of `include_only_rebases` is kept exactly as the published ledger API behaves:
//! `false` (the default) keeps *only* rebase records, `true` keeps everything.

use alloy::primitives::I256;

use crate::lido::RewardRecord;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub include_zero_rebases: bool,
    pub include_only_rebases: bool,
}

impl RecordFilter {
    pub fn keeps(&self, record: &RewardRecord) -> bool {
        let rebase = record.kind.is_rebase();
        if !self.include_only_rebases && !rebase {
            return false;
        }
        if !self.include_zero_rebases && rebase && record.change == I256::ZERO {
            return false;
        }
        true
    }
}

/// Drop records in place; relative order of survivors is untouched.
pub fn apply_filters(records: Vec<RewardRecord>, filter: RecordFilter) -> Vec<RewardRecord> {
    records.into_iter().filter(|r| filter.keeps(r)).collect()
}
