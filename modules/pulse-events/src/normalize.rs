//! Raw stream record → canonical event.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::NormalizeError;
use crate::types::{CanonicalEvent, NormalizedMessage, Properties, RawMessage};

/// Encoded size above which properties are flagged. They are still stored.
pub const MAX_PROPERTIES_BYTES: usize = 10 * 1024;

/// Map a raw record into a canonical event.
///
/// `id` is `event_id` when present, else the broker id. The broker id is always
/// kept on the result for acknowledgement. Undecodable properties become an
/// empty map rather than failing the message.
pub fn normalize(raw: &RawMessage) -> Result<NormalizedMessage, NormalizeError> {
    let org_id = required(raw, "org_id")?;
    let user_id = required(raw, "user_id")?;
    let event_name = required(raw, "event_name")?;
    let event_timestamp = parse_timestamp(required(raw, "timestamp")?)?;

    let id = raw.field("event_id").unwrap_or(&raw.stream_id);

    let event = CanonicalEvent::new(id, org_id, user_id, event_name, event_timestamp)
        .with_properties(decode_properties(raw));

    Ok(NormalizedMessage {
        stream_id: raw.stream_id.clone(),
        event,
    })
}

/// Parse a producer timestamp into a UTC instant.
///
/// Accepts RFC 3339, an offset-less ISO-8601 datetime (taken as UTC), or a bare
/// date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| NormalizeError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn required<'a>(raw: &'a RawMessage, key: &'static str) -> Result<&'a str, NormalizeError> {
    raw.field(key).ok_or(NormalizeError::MissingField(key))
}

fn decode_properties(raw: &RawMessage) -> Properties {
    let Some(encoded) = raw.field("properties") else {
        return Properties::new();
    };

    if encoded.len() > MAX_PROPERTIES_BYTES {
        warn!(
            stream_id = %raw.stream_id,
            bytes = encoded.len(),
            limit = MAX_PROPERTIES_BYTES,
            "Properties exceed size limit, storing as-is"
        );
    }

    match serde_json::from_str::<Value>(encoded) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(stream_id = %raw.stream_id, "Properties are not a JSON object, treating as empty");
            Properties::new()
        }
        Err(e) => {
            warn!(stream_id = %raw.stream_id, error = %e, "Failed to decode properties, treating as empty");
            Properties::new()
        }
    }
}
