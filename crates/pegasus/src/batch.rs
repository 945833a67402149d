//! Concurrent fan-out over independent operations.
//!
//! Both flavors run every item to completion before returning; fail-fast
//! differs only in what it reports. Backpressure comes naturally from the
//! per-endpoint session queues underneath.

use std::future::Future;

use futures::future::join_all;

use crate::Result;

/// Awaits all items; the first error (in input order) wins. On success the
/// outputs are parallel to the inputs.
pub(crate) async fn fail_fast<T, F>(items: Vec<F>) -> Result<Vec<T>>
where
    F: Future<Output = Result<T>>,
{
    let mut outputs = Vec::with_capacity(items.len());
    for result in join_all(items).await {
        outputs.push(result?);
    }
    Ok(outputs)
}

/// Awaits all items and keeps every per-item outcome positionally.
/// Returns the outcomes and the number of failures among them.
pub(crate) async fn tolerant<T, F>(items: Vec<F>) -> (Vec<Result<T>>, usize)
where
    F: Future<Output = Result<T>>,
{
    let results = join_all(items).await;
    let failures = results.iter().filter(|r| r.is_err()).count();
    (results, failures)
}
