//! Step-bounded range fetching for providers that cap `eth_getLogs` spans.

use std::future::Future;
use tracing::debug;

/// Call `fetch(from, to)` over `[from_block, to_block]` in spans of at most `step` blocks,
/// sequentially, concatenating results in ascending block order.
pub async fn request_with_block_step<T, E, F, Fut>(
    step: u64,
    from_block: u64,
    to_block: u64,
    mut fetch: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let step = step.max(1);
    let mut all = Vec::new();
    let mut current_from = from_block;
    while current_from <= to_block {
        let current_to = current_from.saturating_add(step - 1).min(to_block);
        debug!(current_from, current_to, "chunk");
        all.extend(fetch(current_from, current_to).await?);
        if current_to == u64::MAX {
            break;
        }
        current_from = current_to + 1;
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn chunks_cover_range_in_order() {
        let calls = Mutex::new(Vec::new());
        let out: Vec<u64> = request_with_block_step(10, 5, 31, |a, b| {
            calls.lock().unwrap().push((a, b));
            async move { Ok::<_, ()>((a..=b).collect()) }
        })
        .await
        .unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![(5, 14), (15, 24), (25, 31)]
        );
        assert_eq!(out, (5..=31).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn single_block_range() {
        let out: Vec<(u64, u64)> =
            request_with_block_step(50_000, 7, 7, |a, b| async move { Ok::<_, ()>(vec![(a, b)]) })
                .await
                .unwrap();
        assert_eq!(out, vec![(7, 7)]);
    }

    #[tokio::test]
    async fn first_error_stops() {
        let res: Result<Vec<u64>, &str> = request_with_block_step(1, 0, 5, |a, _| async move {
            if a == 2 {
                Err("boom")
            } else {
                Ok(vec![a])
            }
        })
        .await;
        assert_eq!(res, Err("boom"));
    }
}
