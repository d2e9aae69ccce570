//! SQLite-backed event queue.
//!
//! Events are rows in a shared `queue_events` table, partitioned by topic.
//! Consuming an event deletes its row in the same statement that selects it,
//! so the table itself is the consumer cursor and nothing else has to be
//! tracked. Consumers poll at a fixed interval while the topic is empty.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::SqlitePool;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{db, error::Error};

use super::{Event, EventQueue};

/// Default delay between polls of an empty topic.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct SqliteEventQueue {
    pool: SqlitePool,
    topic: String,
    poll_interval: Duration,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    key: Vec<u8>,
    value: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            key: row.key.into(),
            value: row.value.into(),
            timestamp: row.created_at,
        }
    }
}

impl SqliteEventQueue {
    /// Opens the queue database at `path` and ensures the events table exists.
    pub async fn connect(path: &str, topic: impl Into<String>) -> Result<Self, Error> {
        let pool = db::connect(path)
            .await
            .map_err(Error::queue_transport)?;

        let queue = Self::with_pool(pool, topic).await?;

        tracing::info!(path, topic = %queue.topic, "connected event queue");

        Ok(queue)
    }

    /// Opens a queue on a private in-memory database.
    pub async fn in_memory(topic: impl Into<String>) -> Result<Self, Error> {
        let pool = db::connect_in_memory()
            .await
            .map_err(Error::queue_transport)?;

        Self::with_pool(pool, topic).await
    }

    /// Builds a queue on an existing pool.
    ///
    /// The events table lives outside the message store migrations since the
    /// queue may point at a different database file than the store.
    pub async fn with_pool(pool: SqlitePool, topic: impl Into<String>) -> Result<Self, Error> {
        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS queue_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                key BLOB NOT NULL,
                value BLOB NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&pool)
        .await
        .map_err(Error::queue_transport)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS queue_events_topic_idx ON queue_events (topic, seq)")
            .execute(&pool)
            .await
            .map_err(Error::queue_transport)?;

        Ok(Self {
            pool,
            topic: topic.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Number of unconsumed events on this topic.
    pub async fn len(&self) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(seq) FROM queue_events WHERE topic = $1")
            .bind(self.topic.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::queue_transport)?;

        Ok(count as u64)
    }

    /// Removes and returns the oldest event on the topic, if any.
    async fn pop(&self) -> Result<Option<Event>, Error> {
        let row: Option<EventRow> = sqlx::query_as(
            "
            DELETE FROM queue_events
            WHERE seq = (
                SELECT seq FROM queue_events
                WHERE topic = $1
                ORDER BY seq
                LIMIT 1
            )
            RETURNING key, value, created_at
            ",
        )
        .bind(self.topic.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::queue_transport)?;

        Ok(row.map(Event::from))
    }
}

impl EventQueue for SqliteEventQueue {
    fn publish(&self, events: Vec<Event>) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            let count = events.len();

            let mut tx = self.pool.begin().await.map_err(Error::queue_transport)?;

            for event in events {
                sqlx::query(
                    "
                    INSERT INTO queue_events (topic, key, value, created_at)
                    VALUES ($1, $2, $3, $4)
                    ",
                )
                .bind(self.topic.as_str())
                .bind(event.key.as_ref())
                .bind(event.value.as_ref())
                .bind(event.timestamp)
                .execute(&mut *tx)
                .await
                .map_err(Error::queue_transport)?;
            }

            tx.commit().await.map_err(Error::queue_transport)?;

            tracing::debug!(topic = %self.topic, count, "published events");

            Ok(())
        })
    }

    fn consume_one<'a>(
        &'a self,
        deadline: Instant,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Event, Error>> {
        Box::pin(async move {
            loop {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::Timeout);
                }

                // The delete is never raced against the deadline; dropping it
                // midway could remove a row without handing it to anyone.
                if let Some(event) = self.pop().await? {
                    tracing::debug!(topic = %self.topic, "consumed event");
                    return Ok(event);
                }

                let wake = deadline.min(now + self.poll_interval);
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep_until(wake) => {}
                }
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.pool.close().await;
            tracing::info!(topic = %self.topic, "closed event queue");
        })
    }
}
