use thiserror::Error;

/// Reasons a raw stream record cannot become a canonical event.
///
/// Malformed `properties` is deliberately absent: it degrades to an empty map.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
}
