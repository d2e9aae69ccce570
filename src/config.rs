use std::time::Duration;

use serde::Deserialize;

/// Which transport carries events from the ingestion path to the drain worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Process configuration, read from `MSGPROC_`-prefixed environment variables.
///
/// Every field is optional; accessors fill in the defaults.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    pub db_path: Option<String>,
    pub store_migrate: Option<bool>,

    pub queue_backend: Option<QueueBackend>,
    pub queue_path: Option<String>,
    pub queue_topic: Option<String>,
    pub queue_capacity: Option<usize>,
    pub queue_poll_interval_ms: Option<u64>,

    pub listen_addr: Option<String>,

    pub drain_interval_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        Ok(envy::prefixed("MSGPROC_").from_env::<Self>()?)
    }

    pub fn db_path(&self) -> &str {
        self.db_path.as_deref().unwrap_or("msg-processor.db")
    }

    pub fn store_migrate(&self) -> bool {
        self.store_migrate.unwrap_or(true)
    }

    pub fn queue_backend(&self) -> QueueBackend {
        self.queue_backend.unwrap_or_default()
    }

    pub fn queue_path(&self) -> &str {
        self.queue_path
            .as_deref()
            .unwrap_or("msg-processor-queue.db")
    }

    pub fn queue_topic(&self) -> &str {
        self.queue_topic.as_deref().unwrap_or("messages")
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.filter(|c| *c > 0).unwrap_or(1024)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms.filter(|ms| *ms > 0).unwrap_or(100))
    }

    pub fn listen_addr(&self) -> &str {
        self.listen_addr.as_deref().unwrap_or("127.0.0.1:8080")
    }

    /// Time between drain ticks. Zero falls back to the default since the
    /// scheduler cannot run on a zero interval.
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms.filter(|ms| *ms > 0).unwrap_or(1_000))
    }

    /// Upper bound on a single drain tick.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms.unwrap_or(30_000))
    }

    /// Grace period for in-flight requests and the running tick at shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms.unwrap_or(15_000))
    }

    /// [`Config::shutdown_timeout`] rounded up to whole seconds, the
    /// granularity the HTTP server accepts.
    pub fn shutdown_timeout_secs(&self) -> u64 {
        self.shutdown_timeout().as_secs_f64().ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.db_path(), "msg-processor.db");
        assert!(config.store_migrate());
        assert_eq!(config.queue_backend(), QueueBackend::Sqlite);
        assert_eq!(config.queue_topic(), "messages");
        assert_eq!(config.listen_addr(), "127.0.0.1:8080");
        assert_eq!(config.drain_interval(), Duration::from_secs(1));
        assert_eq!(config.drain_timeout(), Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn reads_prefixed_variables() {
        let vars = vec![
            ("MSGPROC_DB_PATH".to_owned(), "/tmp/store.db".to_owned()),
            ("MSGPROC_QUEUE_BACKEND".to_owned(), "memory".to_owned()),
            ("MSGPROC_DRAIN_TIMEOUT_MS".to_owned(), "500".to_owned()),
            ("UNRELATED".to_owned(), "x".to_owned()),
        ];

        let config: Config = envy::prefixed("MSGPROC_").from_iter(vars).unwrap();

        assert_eq!(config.db_path(), "/tmp/store.db");
        assert_eq!(config.queue_backend(), QueueBackend::Memory);
        assert_eq!(config.drain_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn zero_capacity_falls_back_to_default() {
        let config = Config {
            queue_capacity: Some(0),
            ..Config::default()
        };

        assert_eq!(config.queue_capacity(), 1024);
    }

    #[test]
    fn shutdown_timeout_rounds_up_to_whole_seconds() {
        let config = |ms| Config {
            shutdown_timeout_ms: Some(ms),
            ..Config::default()
        };

        assert_eq!(config(500).shutdown_timeout_secs(), 1);
        assert_eq!(config(2_000).shutdown_timeout_secs(), 2);
        assert_eq!(config(2_001).shutdown_timeout_secs(), 3);
        assert_eq!(config(0).shutdown_timeout_secs(), 0);
        assert_eq!(Config::default().shutdown_timeout_secs(), 15);
    }

    #[test]
    fn zero_intervals_fall_back_to_default() {
        let vars = vec![
            ("MSGPROC_DRAIN_INTERVAL_MS".to_owned(), "0".to_owned()),
            ("MSGPROC_QUEUE_POLL_INTERVAL_MS".to_owned(), "0".to_owned()),
        ];

        let config: Config = envy::prefixed("MSGPROC_").from_iter(vars).unwrap();

        assert_eq!(config.drain_interval(), Duration::from_secs(1));
        assert_eq!(config.queue_poll_interval(), Duration::from_millis(100));
    }
}
