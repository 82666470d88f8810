//! The worker loop: drain this consumer's backlog, then poll for new messages
//! until cancelled.
//!
//! Messages are handled one at a time in delivery order. The cancellation token
//! is checked between messages and between polls; a transaction in flight is
//! never interrupted.

use std::fmt;
use std::time::Duration;

use pulse_events::{normalize, NormalizedMessage, RawMessage};
use pulse_store::EventSink;
use pulse_stream::{MessageSource, BACKLOG_START};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::WorkerError;

const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(1000);

/// How a message that made it to acknowledgement was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Inserted,
    Duplicate,
}

/// Per-batch (or cumulative) message accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Committed and acknowledged, duplicates included.
    pub succeeded: usize,
    pub duplicates: usize,
    /// Left unacknowledged.
    pub failed: usize,
}

impl BatchStats {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn merge(&mut self, other: BatchStats) {
        self.succeeded += other.succeeded;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded ({} duplicates), {} failed",
            self.succeeded, self.duplicates, self.failed
        )
    }
}

pub struct Worker<S, K> {
    source: S,
    sink: K,
    cancel: CancellationToken,
    process_pending_on_startup: bool,
    error_backoff: Duration,
}

impl<S, K> Worker<S, K>
where
    S: MessageSource,
    K: EventSink,
{
    pub fn new(source: S, sink: K, cancel: CancellationToken) -> Self {
        Self {
            source,
            sink,
            cancel,
            process_pending_on_startup: true,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    pub fn with_backlog_on_startup(mut self, enabled: bool) -> Self {
        self.process_pending_on_startup = enabled;
        self
    }

    /// Pause after a failed read before polling again.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Drain the backlog (if enabled), then poll until cancelled.
    pub async fn run(&self) -> BatchStats {
        let mut totals = BatchStats::default();

        if self.process_pending_on_startup {
            let backlog = self.drain_backlog().await;
            info!(%backlog, "Backlog drained");
            totals.merge(backlog);
        }

        info!("Entering live consumption loop");
        totals.merge(self.poll().await);

        info!(%totals, "Worker loop exited");
        totals
    }

    /// Reprocess everything this consumer was handed and never acknowledged.
    ///
    /// Pages forward by id, so a message that fails again is skipped for now
    /// rather than re-read forever. It stays pending for the next start.
    pub async fn drain_backlog(&self) -> BatchStats {
        let mut totals = BatchStats::default();
        let mut cursor = BACKLOG_START.to_string();

        while !self.cancel.is_cancelled() {
            let batch = match self.source.read_backlog(&cursor).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "Backlog read failed");
                    if !self.backoff().await {
                        break;
                    }
                    continue;
                }
            };

            let Some(last) = batch.last() else {
                break;
            };
            cursor = last.stream_id.clone();

            info!(count = batch.len(), "Reprocessing pending messages");
            totals.merge(self.process_batch(&batch).await);
        }

        totals
    }

    /// Fetch and process never-delivered messages until cancelled.
    pub async fn poll(&self) -> BatchStats {
        let mut totals = BatchStats::default();

        while !self.cancel.is_cancelled() {
            // Entries delivered by a read abandoned here stay pending for this
            // consumer and come back through the backlog.
            let read = tokio::select! {
                _ = self.cancel.cancelled() => break,
                read = self.source.read_new() => read,
            };

            match read {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => totals.merge(self.process_batch(&batch).await),
                Err(e) => {
                    error!(error = %e, "Error in consumption loop");
                    if !self.backoff().await {
                        break;
                    }
                }
            }
        }

        totals
    }

    /// Process messages in order. A failure is counted and the batch continues.
    pub async fn process_batch(&self, batch: &[RawMessage]) -> BatchStats {
        let mut stats = BatchStats::default();

        for (i, raw) in batch.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = batch.len() - i, "Shutdown requested, stopping batch");
                break;
            }

            match self.process_message(raw).await {
                Ok(MessageOutcome::Inserted) => stats.succeeded += 1,
                Ok(MessageOutcome::Duplicate) => {
                    stats.succeeded += 1;
                    stats.duplicates += 1;
                }
                Err(_) => stats.failed += 1,
            }
        }

        if !batch.is_empty() {
            info!(
                succeeded = stats.succeeded,
                duplicates = stats.duplicates,
                failed = stats.failed,
                "Batch complete"
            );
        }
        stats
    }

    /// Normalize, commit, then acknowledge one message.
    ///
    /// The ack is issued only after the commit succeeded, for new and duplicate
    /// events alike. On any error the message is left pending.
    pub async fn process_message(&self, raw: &RawMessage) -> Result<MessageOutcome, WorkerError> {
        let NormalizedMessage { stream_id, event } = normalize(raw).map_err(|e| {
            error!(stream_id = %raw.stream_id, error = %e, "Malformed message, leaving unacknowledged");
            e
        })?;

        let outcome = self.sink.process(&event).await.map_err(|e| {
            error!(
                stream_id = %stream_id,
                event_id = %event.id,
                org_id = %event.org_id,
                error = %e,
                "Transaction failed, leaving unacknowledged"
            );
            e
        })?;

        if let Err(e) = self.source.ack(&stream_id).await {
            // Committed but not acked: redelivery will land as a duplicate.
            warn!(stream_id = %stream_id, event_id = %event.id, error = %e, "Acknowledgement failed");
            return Err(e.into());
        }

        if outcome.inserted {
            debug!(
                stream_id = %stream_id,
                event_id = %event.id,
                org_id = %event.org_id,
                event_name = %event.event_name,
                "Processed event"
            );
            Ok(MessageOutcome::Inserted)
        } else {
            debug!(stream_id = %stream_id, event_id = %event.id, "Duplicate acknowledged");
            Ok(MessageOutcome::Duplicate)
        }
    }

    /// Wait out the error backoff. False if cancelled first.
    async fn backoff(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.error_backoff) => true,
        }
    }
}
