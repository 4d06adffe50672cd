//! Top-level error taxonomy for reward ledger computation.

use thiserror::Error;

use crate::chain::FetchError;

#[derive(Error, Debug)]
pub enum RewardsError {
    /// Caller-correctable input: bad range, zero step, empty back offset, pending block.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The request is well-formed but the network cannot answer it.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// Broken assumption about event schema or ledger accounting. Never retry.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
    /// RPC, subgraph or cache failure, passed through unchanged.
    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),
}

impl RewardsError {
    /// True only for I/O failures, where repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RewardsError::Fetch(_))
    }

    /// Short stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RewardsError::InvalidArgument(_) => "invalid_argument",
            RewardsError::NotSupported(_) => "not_supported",
            RewardsError::Invariant(_) => "invariant",
            RewardsError::Fetch(_) => "fetch",
        }
    }
}
