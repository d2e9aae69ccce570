//! Message store abstraction.
//!
//! The store owns message identity, status persistence and aggregate counts.
//! Both the ingestion path and the drain worker talk to it exclusively
//! through [`MessageStore`], so the pipeline can run against SQLite in
//! production and against [`memory::InMemoryMessageStore`] in tests.

use std::collections::BTreeSet;

use futures_util::future::BoxFuture;

use crate::{
    error::Error,
    message::{Message, MessageStatus},
};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryMessageStore;
pub use sqlite::SqliteMessageStore;

/// Core trait for message persistence.
///
/// Implementations must be safe to share between the HTTP workers and the
/// drain worker. No locking is done by callers; concurrent writes to the same
/// record resolve as last-write-wins per call, subject to the forward-only
/// status rule enforced by [`MessageStore::update_status`].
pub trait MessageStore: Send + Sync + 'static {
    /// Persists a new message in `Created` status and returns its id.
    ///
    /// Ids are assigned by the store, strictly increasing and never reused.
    fn create_message<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<u64, Error>>;

    /// Fetches a message by id.
    ///
    /// # Errors
    /// [`Error::NotFound`] when no message has this id. Any other failure is
    /// reported as a store error.
    fn get_message(&self, id: u64) -> BoxFuture<'_, Result<Message, Error>>;

    /// Moves every listed message to `status` and refreshes its `updated_at`.
    ///
    /// The update is permissive: ids that do not exist, and records already
    /// at or past `status`, are skipped without error. An empty id set is a
    /// successful no-op.
    ///
    /// # Returns
    /// The number of records that were actually transitioned.
    fn update_status<'a>(
        &'a self,
        ids: &'a BTreeSet<u64>,
        status: MessageStatus,
    ) -> BoxFuture<'a, Result<u64, Error>>;

    /// Counts messages currently in `status`, returning 0 when none match.
    fn count_by_status(&self, status: MessageStatus) -> BoxFuture<'_, Result<u64, Error>>;

    /// Releases the store's resources. Calls made afterwards fail.
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}
