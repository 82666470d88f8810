//! Core types for the canonical event model.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Open, schema-less event properties. Keys are kept in sorted order.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// A record as read off the stream: the broker-assigned id plus flat string fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub stream_id: String,
    pub fields: HashMap<String, String>,
}

impl RawMessage {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// A field value, treating empty strings as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// The normalized event every aggregate is derived from. Immutable once committed.
///
/// `id` is the producer's idempotency key when one was supplied, otherwise the
/// broker message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: String,
    pub org_id: String,
    pub user_id: String,
    pub event_name: String,
    pub properties: Properties,
    pub event_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CanonicalEvent {
    pub fn new(
        id: impl Into<String>,
        org_id: impl Into<String>,
        user_id: impl Into<String>,
        event_name: impl Into<String>,
        event_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            user_id: user_id.into(),
            event_name: event_name.into(),
            properties: Properties::new(),
            event_timestamp,
            created_at: Utc::now(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// The UTC calendar day this event counts towards.
    pub fn event_date(&self) -> NaiveDate {
        self.event_timestamp.date_naive()
    }

    /// Positive revenue carried by this event, if any.
    pub fn monetary_amount(&self) -> Option<f64> {
        crate::revenue::monetary_amount(&self.properties)
    }
}

/// A canonical event together with the broker id used to acknowledge it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub stream_id: String,
    pub event: CanonicalEvent,
}
