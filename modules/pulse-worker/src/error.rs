use pulse_events::NormalizeError;
use pulse_store::StoreError;
use pulse_stream::StreamError;
use thiserror::Error;

/// Why a single message was left unacknowledged.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("acknowledgement failed: {0}")]
    Ack(#[from] StreamError),
}

/// The worker task ended by panicking rather than returning.
#[derive(Debug, Error)]
#[error("worker task faulted: {0}")]
pub struct TaskFault(pub tokio::task::JoinError);

impl TaskFault {
    pub fn is_panic(&self) -> bool {
        self.0.is_panic()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
