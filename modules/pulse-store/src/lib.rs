//! Idempotent aggregation of canonical events into Postgres.
//!
//! Each event is inserted into `ingestion.events` and, only when that insert is
//! new, folded into the `analytics.*` aggregates inside the same transaction.
//! Redelivering an event is a no-op, and a failure leaves no trace.

pub mod error;
pub mod memory;
pub mod migrate;
pub mod sink;
pub mod types;
pub mod writer;

pub use error::StoreError;
pub use memory::MemoryAggregates;
pub use migrate::migrate;
pub use sink::EventSink;
pub use types::ProcessOutcome;
pub use writer::AggregationWriter;
