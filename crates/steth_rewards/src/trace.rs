//! Call-boundary wrapper: one span per public operation, outcome logged once.

use std::future::Future;
use tracing::{info, warn, Instrument};

use crate::error::RewardsError;

/// Run `fut` inside an `info_span` named after `op` and log how it ended.
pub async fn traced<T, F>(op: &'static str, fut: F) -> Result<T, RewardsError>
where
    F: Future<Output = Result<T, RewardsError>>,
{
    let span = tracing::info_span!("rewards", op);
    let started = std::time::Instant::now();
    let res = fut.instrument(span).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &res {
        Ok(_) => info!(op, elapsed_ms, "done"),
        Err(e) => warn!(op, elapsed_ms, kind = e.kind(), error = %e, "failed"),
    }
    res
}
