//! Canonical event model for product-usage analytics.
//!
//! Turns raw stream records into [`CanonicalEvent`]s and derives the values the
//! aggregation layer keys on (UTC event date, monetary amount). No I/O.

pub mod error;
pub mod normalize;
pub mod revenue;
pub mod types;

pub use error::NormalizeError;
pub use normalize::{normalize, parse_timestamp, MAX_PROPERTIES_BYTES};
pub use revenue::monetary_amount;
pub use types::{CanonicalEvent, NormalizedMessage, Properties, RawMessage};
