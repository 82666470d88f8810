//! The write seam the worker loop depends on.

use std::sync::Arc;

use async_trait::async_trait;
use pulse_events::CanonicalEvent;

use crate::error::StoreError;
use crate::types::ProcessOutcome;

/// Commits a canonical event and every aggregate it feeds as one atomic unit.
///
/// Implemented by `AggregationWriter` (Postgres) and `MemoryAggregates` (tests).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Returns `inserted: false` for an id that was already committed; in that
    /// case nothing changes. On error nothing changes either.
    async fn process(&self, event: &CanonicalEvent) -> Result<ProcessOutcome, StoreError>;
}

#[async_trait]
impl<K: EventSink + ?Sized> EventSink for Arc<K> {
    async fn process(&self, event: &CanonicalEvent) -> Result<ProcessOutcome, StoreError> {
        (**self).process(event).await
    }
}
