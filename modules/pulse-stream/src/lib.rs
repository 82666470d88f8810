//! Redis Streams plumbing for the aggregation worker.
//!
//! Owns the broker connection, consumer-group membership, the two read modes
//! (this consumer's backlog, then never-delivered entries) and acknowledgement.
//! Holds no business logic: records come out as [`RawMessage`]s.
//!
//! [`MessageSource`] is the seam the worker consumes; [`StreamClient`] is the
//! Redis implementation and [`MemoryStream`] an in-process one for tests.

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod source;

pub use client::{GroupStatus, StreamClient};
pub use config::{default_consumer_name, StreamConfig};
pub use error::StreamError;
pub use memory::MemoryStream;
pub use pulse_events::RawMessage;
pub use source::{MessageSource, BACKLOG_START};
