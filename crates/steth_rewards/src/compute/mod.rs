//! Share-rate math, the merge/classify fold, and post-filters.

mod filters;
mod fold;
mod ledger;
mod share_rate;

pub use filters::{apply_filters, RecordFilter};
pub use fold::{classify_transfer, fold_events, merge_events, FoldContext, FoldOutput};
pub use ledger::{base_balance, build_ledger};
pub use share_rate::{compute_share_rate, shares_to_asset, ShareRate, SHARE_RATE_PRECISION};
