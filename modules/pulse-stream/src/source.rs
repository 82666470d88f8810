//! The read/ack surface the worker loop depends on.

use std::sync::Arc;

use async_trait::async_trait;
use pulse_events::RawMessage;

use crate::error::StreamError;

/// Cursor that starts a backlog scan at the beginning of the pending list.
pub const BACKLOG_START: &str = "0";

/// A consumer's view of a grouped stream.
///
/// Implemented by `StreamClient` (Redis) and `MemoryStream` (tests).
/// Also implemented for `Arc<S>` so tests can keep a handle for assertions.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Up to one batch of entries already delivered to this consumer and never
    /// acknowledged, with ids strictly after `after`. Never blocks.
    async fn read_backlog(&self, after: &str) -> Result<Vec<RawMessage>, StreamError>;

    /// Up to one batch of entries never delivered to any group member. Blocks up
    /// to the configured timeout and returns an empty batch if nothing arrived.
    async fn read_new(&self) -> Result<Vec<RawMessage>, StreamError>;

    /// Mark an entry done for the group.
    async fn ack(&self, stream_id: &str) -> Result<(), StreamError>;
}

#[async_trait]
impl<S: MessageSource + ?Sized> MessageSource for Arc<S> {
    async fn read_backlog(&self, after: &str) -> Result<Vec<RawMessage>, StreamError> {
        (**self).read_backlog(after).await
    }

    async fn read_new(&self) -> Result<Vec<RawMessage>, StreamError> {
        (**self).read_new().await
    }

    async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        (**self).ack(stream_id).await
    }
}
