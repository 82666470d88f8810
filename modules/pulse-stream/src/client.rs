//! StreamClient — Redis Streams consumer-group client.
//!
//! One long-lived `ConnectionManager` per process; it reconnects on its own
//! after connection drops, so transient broker errors surface as per-call
//! failures rather than a dead client.

use std::collections::HashMap;

use async_trait::async_trait;
use pulse_events::RawMessage;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::source::MessageSource;

/// Outcome of `ensure_group`. Both are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Created,
    AlreadyExists,
}

pub struct StreamClient {
    config: StreamConfig,
    conn: Option<ConnectionManager>,
}

impl StreamClient {
    pub fn new(config: StreamConfig) -> Self {
        Self { config, conn: None }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the broker connection. No-op when already connected.
    pub async fn connect(&mut self) -> Result<(), StreamError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let client = Client::open(self.config.redis_url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        self.conn = Some(conn);

        info!(stream = %self.config.stream, consumer = %self.config.consumer, "Connected to Redis");
        Ok(())
    }

    /// Drop the broker connection. Safe to call when not connected.
    pub fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            info!("Disconnected from Redis");
        }
    }

    /// Create `group` on `stream` reading from the beginning, creating the stream
    /// if needed. A group that already exists is success.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<GroupStatus, StreamError> {
        let mut conn = self.conn()?;

        let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;
        match created {
            Ok(()) => {
                info!(stream, group, "Created consumer group");
                Ok(GroupStatus::Created)
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                info!(stream, group, "Consumer group already exists");
                Ok(GroupStatus::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append a record and return its broker-assigned id.
    pub async fn publish(&self, fields: &HashMap<String, String>) -> Result<String, StreamError> {
        let mut conn = self.conn()?;
        let items: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let id: String = conn.xadd(&self.config.stream, "*", &items).await?;
        Ok(id)
    }

    fn conn(&self) -> Result<ConnectionManager, StreamError> {
        self.conn.clone().ok_or(StreamError::NotConnected)
    }

    async fn read_group(&self, id: &str, block: bool) -> Result<Vec<RawMessage>, StreamError> {
        let mut conn = self.conn()?;

        let mut opts = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(self.config.batch_size);
        if block {
            // Never BLOCK 0: that waits forever.
            opts = opts.block(self.config.block_timeout.as_millis().max(1) as usize);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream], &[id], &opts)
            .await?;

        Ok(into_messages(reply))
    }
}

#[async_trait]
impl MessageSource for StreamClient {
    async fn read_backlog(&self, after: &str) -> Result<Vec<RawMessage>, StreamError> {
        let messages = self.read_group(after, false).await?;
        debug!(after, count = messages.len(), "Read backlog");
        Ok(messages)
    }

    async fn read_new(&self) -> Result<Vec<RawMessage>, StreamError> {
        self.read_group(">", true).await
    }

    async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn()?;
        let _: i64 = conn
            .xack(&self.config.stream, &self.config.group, &[stream_id])
            .await?;
        Ok(())
    }
}

/// Flatten an XREADGROUP reply. Non-string field values are dropped.
fn into_messages(reply: Option<StreamReadReply>) -> Vec<RawMessage> {
    reply
        .into_iter()
        .flat_map(|r| r.keys)
        .flat_map(|key| key.ids)
        .map(|entry| {
            let fields = entry
                .map
                .iter()
                .filter_map(|(k, v)| {
                    redis::from_redis_value::<String>(v)
                        .ok()
                        .map(|s| (k.clone(), s))
                })
                .collect();
            RawMessage {
                stream_id: entry.id,
                fields,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::streams::{StreamId, StreamKey};
    use redis::Value;

    #[test]
    fn empty_reply_yields_no_messages() {
        assert!(into_messages(None).is_empty());
    }

    #[test]
    fn reply_is_flattened_in_order() {
        let entry = |id: &str, name: &str| {
            let mut map = HashMap::new();
            map.insert("event_name".to_string(), Value::BulkString(name.as_bytes().to_vec()));
            StreamId { id: id.to_string(), map }
        };
        let reply = StreamReadReply {
            keys: vec![StreamKey {
                key: "events_stream".to_string(),
                ids: vec![entry("1-0", "login"), entry("2-0", "page_view")],
            }],
        };

        let messages = into_messages(Some(reply));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].stream_id, "1-0");
        assert_eq!(messages[0].field("event_name"), Some("login"));
        assert_eq!(messages[1].field("event_name"), Some("page_view"));
    }

    #[tokio::test]
    async fn calls_before_connect_fail() {
        let client = StreamClient::new(StreamConfig::default());
        assert!(!client.is_connected());
        let err = client.read_new().await.unwrap_err();
        assert!(matches!(err, StreamError::NotConnected));
    }
}
