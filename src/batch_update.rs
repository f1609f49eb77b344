//! Chunked write-back of update records to the CRM.

use crate::constants::{MAX_FAILURE_DETAILS, SALESFORCE_ID_FIELD, SALESFORCE_UPDATE_BATCH_SIZE};
use crate::crm_client::{CrmClient, RecordOutcome};
use crate::errors::AppError;
use crate::models::UpdateRecord;
use crate::task_queue::TaskQueue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Splits `records` into consecutive chunks of at most `size` (minimum 1),
/// preserving order.
pub fn chunk_records<T>(records: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(records.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(records.len()));

    for record in records {
        current.push(record);
        if current.len() == size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub record_id: String,
    pub error: String,
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub chunks_submitted: usize,
    pub chunks_failed: usize,
    /// Provider lookups that never completed (timeouts, connection failures).
    pub transport_errors: usize,
    pub cancelled: bool,
    /// First failures, capped at `MAX_FAILURE_DETAILS`.
    pub failures: Vec<FailureDetail>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// True only when nothing failed, no lookup was lost in transport and the
    /// run was not cut short.
    pub fn is_total_success(&self) -> bool {
        self.failed == 0 && self.chunks_failed == 0 && self.transport_errors == 0 && !self.cancelled
    }

    pub fn record_failure(&mut self, record_id: impl Into<String>, error: impl Into<String>) {
        self.failed += 1;
        if self.failures.len() < MAX_FAILURE_DETAILS {
            self.failures.push(FailureDetail {
                record_id: record_id.into(),
                error: error.into(),
            });
        }
    }

    pub fn record_outcomes(&mut self, outcomes: &[RecordOutcome]) {
        for outcome in outcomes {
            if outcome.success {
                self.succeeded += 1;
            } else {
                self.record_failure(
                    outcome.record_id.clone(),
                    outcome.error.clone().unwrap_or_else(|| "unknown error".into()),
                );
            }
        }
    }

    /// Folds another summary into this one (e.g. per-chunk into per-run).
    pub fn merge(&mut self, other: RunSummary) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.chunks_submitted += other.chunks_submitted;
        self.chunks_failed += other.chunks_failed;
        self.transport_errors += other.transport_errors;
        self.cancelled |= other.cancelled;
        self.failed += other.failed;
        for failure in other.failures {
            if self.failures.len() >= MAX_FAILURE_DETAILS {
                break;
            }
            self.failures.push(failure);
        }
    }
}

fn record_id(record: &UpdateRecord) -> String {
    record
        .get(SALESFORCE_ID_FIELD)
        .and_then(Value::as_str)
        .unwrap_or("<missing Id>")
        .to_string()
}

#[derive(Clone)]
pub struct BatchUpdateEngine {
    crm: CrmClient,
}

impl BatchUpdateEngine {
    pub fn new(crm: CrmClient) -> Self {
        Self { crm }
    }

    /// One collection upsert; chunks over the CRM limit are rejected as input errors.
    pub async fn submit_chunk(&self, chunk: &[UpdateRecord]) -> Result<Vec<RecordOutcome>, AppError> {
        if chunk.len() > SALESFORCE_UPDATE_BATCH_SIZE {
            return Err(AppError::BadRequest(format!(
                "chunk of {} exceeds the {} record limit",
                chunk.len(),
                SALESFORCE_UPDATE_BATCH_SIZE
            )));
        }
        self.crm.upsert_records(chunk).await
    }

    /// Submits every record in chunks of `chunk_size` (clamped to 1..=200).
    ///
    /// Each chunk is one task-queue unit. A chunk that still fails after the
    /// queue's retries marks all of its records failed; remaining chunks still
    /// run. Cancellation is checked between chunks and leaves the rest skipped.
    pub async fn submit_all(
        &self,
        records: Vec<UpdateRecord>,
        chunk_size: usize,
        queue: &TaskQueue,
    ) -> RunSummary {
        let chunk_size = chunk_size.clamp(1, SALESFORCE_UPDATE_BATCH_SIZE);
        let chunks = chunk_records(records, chunk_size);
        let total_chunks = chunks.len();
        let mut summary = RunSummary::default();

        for (index, chunk) in chunks.into_iter().enumerate() {
            if queue.is_cancelled() {
                summary.cancelled = true;
                summary.skipped += chunk.len();
                continue;
            }

            let name = format!("salesforce chunk {}/{}", index + 1, total_chunks);
            tracing::info!("Submitting {} ({} records)", name, chunk.len());
            summary.chunks_submitted += 1;

            match queue.execute(&name, || self.submit_chunk(&chunk)).await {
                Ok(outcomes) => {
                    let before = summary.failed;
                    summary.record_outcomes(&outcomes);
                    let failed = summary.failed - before;
                    if failed > 0 {
                        tracing::warn!("{}: {} record(s) rejected", name, failed);
                    }
                }
                Err(e) => {
                    tracing::error!("{} failed: {}", name, e);
                    summary.chunks_failed += 1;
                    let message = e.to_string();
                    for record in &chunk {
                        summary.record_failure(record_id(record), message.clone());
                    }
                }
            }
        }

        tracing::info!(
            "Batch update finished: {} succeeded, {} failed, {} skipped{}",
            summary.succeeded,
            summary.failed,
            summary.skipped,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_records_sizes() {
        let chunks = chunk_records((0..450).collect::<Vec<_>>(), 200);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![200, 200, 50]);
        assert_eq!(chunks.concat(), (0..450).collect::<Vec<_>>());

        assert!(chunk_records(Vec::<u8>::new(), 10).is_empty());
        assert_eq!(chunk_records(vec![1, 2], 0).len(), 2);
    }

    #[test]
    fn test_failure_details_are_capped() {
        let mut summary = RunSummary::default();
        for i in 0..25 {
            summary.record_failure(format!("001{}", i), "boom");
        }
        assert_eq!(summary.failed, 25);
        assert_eq!(summary.failures.len(), MAX_FAILURE_DETAILS);
        assert!(!summary.is_total_success());
    }

    #[test]
    fn test_merge_adds_counts() {
        let mut total = RunSummary {
            succeeded: 3,
            skipped: 1,
            ..Default::default()
        };
        let mut chunk = RunSummary::default();
        chunk.record_failure("001X", "INVALID_FIELD");
        chunk.succeeded = 2;
        total.merge(chunk);

        assert_eq!(total.succeeded, 5);
        assert_eq!(total.failed, 1);
        assert_eq!(total.total(), 7);
        assert_eq!(total.failures[0].record_id, "001X");
    }

    #[test]
    fn test_empty_run_is_total_success() {
        assert!(RunSummary::default().is_total_success());
    }

    #[test]
    fn test_transport_errors_break_total_success() {
        let mut total = RunSummary::default();
        total.merge(RunSummary {
            succeeded: 4,
            transport_errors: 1,
            ..Default::default()
        });
        assert_eq!(total.transport_errors, 1);
        assert_eq!(total.failed, 0);
        assert!(!total.is_total_success());
    }

    #[tokio::test]
    async fn test_cancelled_queue_skips_every_chunk() {
        let engine = BatchUpdateEngine::new(
            CrmClient::new("http://127.0.0.1:9", "v59.0", "token").unwrap(),
        );
        let queue = TaskQueue::default();
        queue.cancellation().cancel();

        let records: Vec<UpdateRecord> = (0..5)
            .map(|i| {
                let mut r = UpdateRecord::new();
                r.insert("Id".into(), Value::String(format!("001{}", i)));
                r
            })
            .collect();

        let summary = engine.submit_all(records, 2, &queue).await;
        assert!(summary.cancelled);
        assert_eq!(summary.skipped, 5);
        assert_eq!(summary.chunks_submitted, 0);
    }
}
