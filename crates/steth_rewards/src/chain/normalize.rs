//! Parsing of user-supplied block specifiers.

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::lido::{BlockSpec, BlockTag};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    #[error("invalid time: {0}")]
    InvalidTime(String),
}

/// Parse RFC3339 timestamp and return Unix seconds.
pub fn parse_time_rfc3339(s: &str) -> Result<u64, NormalizeError> {
    let dt = OffsetDateTime::parse(s.trim(), &Rfc3339)
        .map_err(|e| NormalizeError::InvalidTime(e.to_string()))?;
    u64::try_from(dt.unix_timestamp()).map_err(|_| NormalizeError::InvalidTime(s.to_string()))
}

/// Decimal → block number; `latest`/`finalized`/`safe`/`earliest`/`pending` → tag;
/// `@<unix seconds>` or RFC3339 → timestamp.
pub fn parse_block_spec(s: &str) -> Result<BlockSpec, NormalizeError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(NormalizeError::InvalidBlock(s.to_string()));
    }
    if let Ok(n) = s.parse::<u64>() {
        return Ok(BlockSpec::Number(n));
    }
    if let Some(tag) = BlockTag::parse(s) {
        return Ok(BlockSpec::Tag(tag));
    }
    if let Some(secs) = s.strip_prefix('@') {
        return secs
            .parse::<u64>()
            .map(BlockSpec::Timestamp)
            .map_err(|_| NormalizeError::InvalidTime(s.to_string()));
    }
    parse_time_rfc3339(s).map(BlockSpec::Timestamp)
}
