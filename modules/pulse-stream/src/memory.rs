//! MemoryStream — in-process consumer-group stream for tests.
//!
//! Mirrors the parts of Redis Streams the worker relies on: entries are handed
//! to exactly one consumer, stay in that consumer's pending list until acked,
//! and a backlog read only ever returns the caller's own pending entries.
//! Several handles can share one stream to model restarts and competing workers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pulse_events::RawMessage;

use crate::error::StreamError;
use crate::source::MessageSource;

#[derive(Default)]
struct Shared {
    entries: Vec<RawMessage>,
    /// Index of the first entry not yet delivered to any consumer.
    delivered_up_to: usize,
    /// seq → consumer holding it un-acked.
    pending: BTreeMap<u64, String>,
    acked: Vec<String>,
    failing_reads: usize,
    failing_acks: HashSet<String>,
}

#[derive(Clone)]
pub struct MemoryStream {
    shared: Arc<Mutex<Shared>>,
    consumer: String,
    batch_size: usize,
    block: Duration,
}

impl MemoryStream {
    pub fn new(consumer: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            consumer: consumer.into(),
            batch_size: 10,
            block: Duration::from_millis(10),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// How long an empty `read_new` waits before returning.
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Another group member on the same stream. Reusing a name models a restart.
    pub fn consumer(&self, name: impl Into<String>) -> Self {
        Self {
            shared: self.shared.clone(),
            consumer: name.into(),
            batch_size: self.batch_size,
            block: self.block,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer
    }

    /// Append a record and return its id (`<n>-0`).
    pub fn publish(&self, fields: HashMap<String, String>) -> String {
        let mut shared = self.shared.lock().unwrap();
        let id = format!("{}-0", shared.entries.len() + 1);
        shared.entries.push(RawMessage {
            stream_id: id.clone(),
            fields,
        });
        id
    }

    /// Ids pending for `consumer`, in stream order.
    pub fn pending_for(&self, consumer: &str) -> Vec<String> {
        let shared = self.shared.lock().unwrap();
        shared
            .pending
            .iter()
            .filter(|(_, owner)| owner.as_str() == consumer)
            .map(|(seq, _)| format!("{seq}-0"))
            .collect()
    }

    /// Every successful ack, in the order it happened.
    pub fn acked(&self) -> Vec<String> {
        self.shared.lock().unwrap().acked.clone()
    }

    /// Fail the next `n` reads of either mode.
    pub fn fail_next_reads(&self, n: usize) {
        self.shared.lock().unwrap().failing_reads = n;
    }

    /// Fail every ack of `stream_id` until cleared.
    pub fn fail_acks_for(&self, stream_id: impl Into<String>) {
        self.shared.lock().unwrap().failing_acks.insert(stream_id.into());
    }

    pub fn clear_ack_failures(&self) {
        self.shared.lock().unwrap().failing_acks.clear();
    }

    fn take_read_failure(shared: &mut Shared) -> Result<(), StreamError> {
        if shared.failing_reads > 0 {
            shared.failing_reads -= 1;
            return Err(StreamError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }
}

fn seq_of(stream_id: &str) -> u64 {
    stream_id
        .split('-')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl MessageSource for MemoryStream {
    async fn read_backlog(&self, after: &str) -> Result<Vec<RawMessage>, StreamError> {
        let mut shared = self.shared.lock().unwrap();
        Self::take_read_failure(&mut shared)?;

        let after = seq_of(after);
        let batch = shared
            .pending
            .range(after + 1..)
            .filter(|(_, owner)| **owner == self.consumer)
            .take(self.batch_size)
            .map(|(seq, _)| shared.entries[(*seq - 1) as usize].clone())
            .collect();
        Ok(batch)
    }

    async fn read_new(&self) -> Result<Vec<RawMessage>, StreamError> {
        let batch: Vec<RawMessage> = {
            let mut shared = self.shared.lock().unwrap();
            Self::take_read_failure(&mut shared)?;

            let start = shared.delivered_up_to;
            let end = (start + self.batch_size).min(shared.entries.len());
            let batch: Vec<RawMessage> = shared.entries[start..end].to_vec();
            for msg in &batch {
                shared.pending.insert(seq_of(&msg.stream_id), self.consumer.clone());
            }
            shared.delivered_up_to = end;
            batch
        };

        if batch.is_empty() {
            tokio::time::sleep(self.block).await;
        }
        Ok(batch)
    }

    async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        let mut shared = self.shared.lock().unwrap();
        if shared.failing_acks.contains(stream_id) {
            return Err(StreamError::Unavailable(format!("injected ack failure for {stream_id}")));
        }
        if shared.pending.remove(&seq_of(stream_id)).is_some() {
            shared.acked.push(stream_id.to_string());
        }
        Ok(())
    }
}
