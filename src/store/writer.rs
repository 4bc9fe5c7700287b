//! Durable batch writer.
//!
//! Chunks records into sink-sized batches, drops duplicate composite keys
//! before transmission (first occurrence wins; duplicate keys inside one
//! batch trip sink-side validation), and retries only the unprocessed subset
//! of each batch with exponential backoff. Batches that already committed
//! stay committed; there is no cross-batch transaction.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::store::{BatchWrite, Record, StoreError};

/// Sink batch limit (matches common cloud-store batch APIs).
pub const BATCH_SIZE: usize = 25;

/// Retry tuning for partially-failed batches.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_start: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff_start: Duration::from_millis(120),
            backoff_cap: Duration::from_secs(2),
        }
    }
}

/// What a write run did, for logging and partial-progress reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Records handed to the sink and acknowledged.
    pub written: usize,
    /// Duplicate composite keys dropped before transmission.
    pub deduped: usize,
    /// Records skipped for missing identity/key fields.
    pub skipped: usize,
    /// Batches transmitted at least once.
    pub batches: usize,
}

/// Write `records` through `sink`, honoring dedupe/chunk/retry semantics.
///
/// Returns a hard error only when a batch exhausts the retry budget with
/// items still unprocessed, or on cancellation between batches.
pub async fn write_records<R, S>(
    sink: &S,
    records: Vec<R>,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<WriteReport, StoreError>
where
    R: Record,
    S: BatchWrite<R> + ?Sized,
{
    let mut report = WriteReport::default();

    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(records.len());
    let mut pending: Vec<R> = Vec::with_capacity(records.len());
    for r in records {
        if !r.is_writable() {
            report.skipped += 1;
            continue;
        }
        if !seen.insert(r.composite_key()) {
            report.deduped += 1;
            continue;
        }
        pending.push(r);
    }

    for chunk in pending.chunks(BATCH_SIZE) {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let total = chunk.len();
        let mut batch: Vec<R> = chunk.to_vec();
        let mut backoff = policy.backoff_start;
        report.batches += 1;

        for attempt in 1..=policy.max_attempts {
            let unprocessed = sink.put_batch(batch).await?;
            if unprocessed.is_empty() {
                report.written += total;
                break;
            }
            if attempt == policy.max_attempts {
                warn!(remaining = unprocessed.len(), attempts = attempt, "batch write gave up");
                return Err(StoreError::RetriesExhausted { remaining: unprocessed.len() });
            }
            debug!(
                attempt,
                unprocessed = unprocessed.len(),
                backoff_ms = backoff.as_millis() as u64,
                "batch write partially failed, retrying unprocessed subset"
            );
            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, policy.backoff_cap);
            batch = unprocessed;
        }
    }

    Ok(report)
}
