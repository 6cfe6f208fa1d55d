//! Chunked apply of tenant batches.

use std::future::Future;

use tracing::debug;

use crate::error::SyncResult;

/// Apply `operation` to consecutive chunks of at most `max_chunk_size` items.
///
/// Chunks are applied in order and the first failure stops the run; chunks
/// already applied are not rolled back. Returns the number of calls made.
pub async fn run_in_chunks<'a, T, F, Fut>(
    items: &'a [T],
    max_chunk_size: usize,
    mut operation: F,
) -> SyncResult<usize>
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = SyncResult<()>>,
{
    let chunk_size = max_chunk_size.max(1);
    let mut calls = 0;

    for chunk in items.chunks(chunk_size) {
        debug!(
            chunk = calls + 1,
            chunk_len = chunk.len(),
            total = items.len(),
            "Applying chunk"
        );
        operation(chunk).await?;
        calls += 1;
    }

    Ok(calls)
}
