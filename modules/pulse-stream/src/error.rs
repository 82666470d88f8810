use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream client is not connected")]
    NotConnected,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Broker unavailable in an in-process stream (tests).
    #[error("stream unavailable: {0}")]
    Unavailable(String),
}
