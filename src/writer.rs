//! Rate-limited batch submission of sanitized contacts.
//!
//! Records are sent in fixed-size batches, one request at a time. A batch is
//! the unit of success: when its request fails the whole batch is recorded as
//! failed and the writer moves on to the next one.

use std::fmt;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::record::ContactRecord;
use crate::remote::Remote;

/// Contacts per request
pub const DEFAULT_BATCH_SIZE: usize = 25;
/// Largest batch `batchCreateContacts` accepts
pub const MAX_BATCH_SIZE: usize = 200;
/// Pause between two batch requests
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(5);

/// Strategy deciding how long to wait between two batch requests
#[allow(async_fn_in_trait)]
pub trait RateLimit {
    async fn wait(&self);
}

/// Waits the same amount of time before every batch after the first
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl Default for FixedDelay {
    fn default() -> Self {
        FixedDelay(DEFAULT_BATCH_DELAY)
    }
}

impl RateLimit for FixedDelay {
    async fn wait(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}

/// Observer for write progress
pub trait ProgressSink {
    fn report(&self, processed: usize, total: usize);
}

/// Discards progress reports
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _processed: usize, _total: usize) {}
}

/// Terminal progress bar
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub fn new(total: usize, message: &str) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.set_message(message.to_string());
        Self { bar }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl ProgressSink for ProgressBarSink {
    fn report(&self, processed: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(processed as u64);
    }
}

/// A batch the remote rejected, with the records as they were submitted
#[derive(Debug)]
pub struct FailedBatch {
    /// Zero-based position of the batch in the run
    pub index: usize,
    pub records: Vec<ContactRecord>,
    pub error: Error,
}

impl fmt::Display for FailedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} ({} contact(s)): {}",
            self.index + 1,
            self.records.len(),
            self.error
        )
    }
}

/// Outcome of one batch
#[derive(Debug)]
pub enum BatchResult {
    /// Records as stored by the remote
    Succeeded(Vec<ContactRecord>),
    Failed(FailedBatch),
}

/// Aggregate outcome of a write run
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub succeeded: Vec<ContactRecord>,
    pub failed: Vec<FailedBatch>,
    /// Number of requests issued
    pub batches: usize,
}

impl SyncOutcome {
    fn push(&mut self, result: BatchResult) {
        self.batches += 1;
        match result {
            BatchResult::Succeeded(records) => self.succeeded.extend(records),
            BatchResult::Failed(batch) => self.failed.push(batch),
        }
    }

    /// Every record of every failed batch, in submission order
    pub fn failed_records(&self) -> Vec<ContactRecord> {
        self.failed
            .iter()
            .flat_map(|batch| batch.records.iter().cloned())
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.iter().map(|batch| batch.records.len()).sum()
    }
}

/// Sequential batch writer
pub struct BatchWriter<L: RateLimit = FixedDelay> {
    batch_size: usize,
    rate_limit: L,
}

impl BatchWriter<FixedDelay> {
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self::with_rate_limit(batch_size, FixedDelay(delay))
    }
}

impl Default for BatchWriter<FixedDelay> {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_DELAY)
    }
}

impl<L: RateLimit> BatchWriter<L> {
    pub fn with_rate_limit(batch_size: usize, rate_limit: L) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            rate_limit,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Submit `records` batch by batch. Transport failures are recorded on
    /// the outcome; every batch is attempted.
    pub async fn write<R: Remote>(
        &self,
        remote: &R,
        records: &[ContactRecord],
        progress: &dyn ProgressSink,
    ) -> SyncOutcome {
        let total = records.len();
        let mut outcome = SyncOutcome::default();
        let mut processed = 0usize;

        info!(
            total,
            batch_size = self.batch_size,
            batches = total.div_ceil(self.batch_size),
            "writing contacts"
        );

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            if index > 0 {
                self.rate_limit.wait().await;
            }

            debug!(batch = index + 1, size = batch.len(), "submitting batch");
            let result = submit(remote, batch).await;

            match &result {
                Ok(created) => {
                    debug!(
                        batch = index + 1,
                        created = created.len(),
                        first = created.first().and_then(ContactRecord::resource_name),
                        "batch stored"
                    );
                }
                Err(err) => warn!(
                    batch = index + 1,
                    size = batch.len(),
                    transport = err.is_transport(),
                    error = %err,
                    "batch failed, continuing"
                ),
            }

            outcome.push(match result {
                Ok(created) => BatchResult::Succeeded(created),
                Err(error) => BatchResult::Failed(FailedBatch {
                    index,
                    records: batch.to_vec(),
                    error,
                }),
            });

            processed += batch.len();
            progress.report(processed, total);
        }

        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed_count(),
            "write finished"
        );
        outcome
    }
}

async fn submit<R: Remote>(
    remote: &R,
    batch: &[ContactRecord],
) -> crate::error::Result<Vec<ContactRecord>> {
    match batch {
        [single] => remote.create_contact(single).await.map(|created| vec![created]),
        _ => remote.batch_create_contacts(batch).await,
    }
}
