//! SQLite-backed implementation of the message store.
//!
//! Messages live in a single `messages` table created by the embedded
//! migrations. Ids come from an `AUTOINCREMENT` primary key, so they are
//! monotonic and never reused even after deletes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    db,
    error::Error,
    message::{Message, MessageStatus},
};

use super::MessageStore;

/// SQLite caps the number of bound parameters per statement.
const UPDATE_CHUNK_SIZE: usize = 500;

/// Message store persisting to a SQLite database through a connection pool.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    text: String,
    status: MessageStatus,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
            text: row.text,
            status: row.status,
        }
    }
}

impl SqliteMessageStore {
    /// Opens (creating if needed) the database at `path` and optionally runs
    /// the embedded migrations.
    pub async fn connect(path: &str, migrate: bool) -> Result<Self, Error> {
        let pool = db::connect(path).await?;

        if migrate {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        tracing::info!(path, migrate, "connected message store");

        Ok(Self { pool })
    }

    /// Opens a migrated in-memory database.
    pub async fn in_memory() -> Result<Self, Error> {
        let pool = db::connect_in_memory().await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    async fn update_chunk(
        &self,
        ids: &[i64],
        status: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE messages SET status = ");
        query
            .push_bind(status)
            .push(", updated_at = ")
            .push_bind(now)
            .push(" WHERE id IN (");

        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }

        query.push(") AND status IN (");
        let mut separated = query.separated(", ");
        for prev in status.predecessors() {
            separated.push_bind(*prev);
        }
        query.push(")");

        let res = query.build().execute(&self.pool).await?;

        Ok(res.rows_affected())
    }
}

impl MessageStore for SqliteMessageStore {
    fn create_message<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<u64, Error>> {
        Box::pin(async move {
            let now = Utc::now();

            let id: i64 = sqlx::query_scalar(
                "
                INSERT INTO messages (created_at, updated_at, message, status)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                ",
            )
            .bind(now)
            .bind(now)
            .bind(text)
            .bind(MessageStatus::Created)
            .fetch_one(&self.pool)
            .await?;

            tracing::debug!(query = "create_message", id, "executed query");

            Ok(id as u64)
        })
    }

    fn get_message(&self, id: u64) -> BoxFuture<'_, Result<Message, Error>> {
        Box::pin(async move {
            // Ids beyond the signed range can never have been assigned.
            let Ok(row_id) = i64::try_from(id) else {
                return Err(Error::message_not_found(id));
            };

            let row: Option<MessageRow> = sqlx::query_as(
                "
                SELECT id, created_at, updated_at, message AS text, status
                FROM messages
                WHERE id = $1
                LIMIT 1
                ",
            )
            .bind(row_id)
            .fetch_optional(&self.pool)
            .await?;

            tracing::debug!(query = "get_message", id, found = row.is_some(), "executed query");

            row.map(Message::from)
                .ok_or_else(|| Error::message_not_found(id))
        })
    }

    fn update_status<'a>(
        &'a self,
        ids: &'a BTreeSet<u64>,
        status: MessageStatus,
    ) -> BoxFuture<'a, Result<u64, Error>> {
        Box::pin(async move {
            let ids = ids
                .iter()
                .filter_map(|id| i64::try_from(*id).ok())
                .collect::<Vec<_>>();

            if ids.is_empty() || status.predecessors().is_empty() {
                return Ok(0);
            }

            let now = Utc::now();
            let mut updated = 0;
            for chunk in ids.chunks(UPDATE_CHUNK_SIZE) {
                updated += self.update_chunk(chunk, status, now).await?;
            }

            tracing::debug!(
                query = "update_status",
                %status,
                requested = ids.len(),
                updated,
                "executed query"
            );

            Ok(updated)
        })
    }

    fn count_by_status(&self, status: MessageStatus) -> BoxFuture<'_, Result<u64, Error>> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar(
                "
                SELECT COUNT(id)
                FROM messages
                WHERE status = $1
                ",
            )
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

            tracing::debug!(query = "count_by_status", %status, count, "executed query");

            Ok(count as u64)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.pool.close().await;
            tracing::info!("closed message store");
        })
    }
}
