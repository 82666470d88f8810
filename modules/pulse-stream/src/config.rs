use std::time::Duration;

/// Where to read from and who we are within the consumer group.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub redis_url: String,
    pub stream: String,
    pub group: String,
    /// Must be unique per process: the broker keeps one pending list per name.
    pub consumer: String,
    pub block_timeout: Duration,
    pub batch_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream: "events_stream".to_string(),
            group: "events_workers".to_string(),
            consumer: default_consumer_name(),
            block_timeout: Duration::from_millis(5000),
            batch_size: 10,
        }
    }
}

/// `worker-<hostname>-<pid>`.
pub fn default_consumer_name() -> String {
    format!("worker-{}-{}", hostname(), std::process::id())
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_name_carries_pid() {
        let name = default_consumer_name();
        assert!(name.starts_with("worker-"));
        assert!(name.ends_with(&format!("-{}", std::process::id())));
    }

    #[test]
    fn defaults() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.block_timeout, Duration::from_secs(5));
        assert_eq!(cfg.stream, "events_stream");
        assert_eq!(cfg.group, "events_workers");
    }
}
