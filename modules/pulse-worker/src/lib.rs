//! The aggregation worker: reads product-usage events from a Redis consumer
//! group and commits them, idempotently, into the Postgres aggregates.
//!
//! Per message: received → normalized → committed → acknowledged. A message is
//! acknowledged only after its transaction commits; anything that fails earlier
//! stays pending for the next backlog scan.

pub mod config;
pub mod error;
pub mod shutdown;
pub mod supervise;
pub mod telemetry;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{ConfigError, TaskFault, WorkerError};
pub use supervise::{supervise, Stopped};
pub use worker::{BatchStats, MessageOutcome, Worker};
