//! In-memory implementation of the message store.
//!
//! Keeps messages in a concurrent hash map. Used by unit tests and for
//! running the service without a database file.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::Utc;
use futures_util::future::BoxFuture;

use crate::{
    error::Error,
    message::{Message, MessageStatus},
};

use super::MessageStore;

/// Thread-safe in-memory message store.
///
/// Clones share the same underlying map.
#[derive(Clone)]
pub struct InMemoryMessageStore {
    messages: Arc<papaya::HashMap<u64, Message>>,
    next_id: Arc<AtomicU64>,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageStore {
    /// Creates a new empty store. The first assigned id is 1.
    pub fn new() -> Self {
        Self {
            messages: Arc::new(papaya::HashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Number of stored messages regardless of status.
    pub fn len(&self) -> usize {
        self.messages.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageStore for InMemoryMessageStore {
    fn create_message<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<u64, Error>> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let now = Utc::now();

            self.messages.pin().insert(
                id,
                Message {
                    id,
                    created_at: now,
                    updated_at: now,
                    text: text.to_owned(),
                    status: MessageStatus::Created,
                },
            );

            Ok(id)
        })
    }

    fn get_message(&self, id: u64) -> BoxFuture<'_, Result<Message, Error>> {
        Box::pin(async move {
            self.messages
                .pin()
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::message_not_found(id))
        })
    }

    fn update_status<'a>(
        &'a self,
        ids: &'a BTreeSet<u64>,
        status: MessageStatus,
    ) -> BoxFuture<'a, Result<u64, Error>> {
        Box::pin(async move {
            let now = Utc::now();
            let messages = self.messages.pin();

            let mut updated = 0;
            for id in ids {
                let next = messages.update(*id, |msg| {
                    if msg.status.can_advance_to(status) {
                        Message {
                            status,
                            updated_at: now,
                            ..msg.clone()
                        }
                    } else {
                        msg.clone()
                    }
                });

                if next.is_some_and(|msg| msg.status == status && msg.updated_at == now) {
                    updated += 1;
                }
            }

            Ok(updated)
        })
    }

    fn count_by_status(&self, status: MessageStatus) -> BoxFuture<'_, Result<u64, Error>> {
        Box::pin(async move {
            let count = self
                .messages
                .pin()
                .values()
                .filter(|msg| msg.status == status)
                .count();

            Ok(count as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assigns_fresh_ids() {
        let store = InMemoryMessageStore::new();

        let a = store.create_message("a").await.unwrap();
        let b = store.create_message("b").await.unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn missing_message_is_not_found() {
        let store = InMemoryMessageStore::new();

        assert!(matches!(
            store.get_message(9).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_is_permissive_and_forward_only() {
        let store = InMemoryMessageStore::new();
        let id = store.create_message("hello").await.unwrap();

        let ids = BTreeSet::from([id, 1000]);
        assert_eq!(
            store
                .update_status(&ids, MessageStatus::Completed)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .update_status(&ids, MessageStatus::Processing)
                .await
                .unwrap(),
            0
        );

        let msg = store.get_message(id).await.unwrap();
        assert_eq!(msg.status, MessageStatus::Completed);
        assert!(msg.updated_at >= msg.created_at);
    }

    #[tokio::test]
    async fn counts_by_status() {
        let store = InMemoryMessageStore::new();
        let a = store.create_message("a").await.unwrap();
        store.create_message("b").await.unwrap();

        store
            .update_status(&BTreeSet::from([a]), MessageStatus::Processing)
            .await
            .unwrap();

        assert_eq!(
            store.count_by_status(MessageStatus::Created).await.unwrap(),
            1
        );
        assert_eq!(
            store
                .count_by_status(MessageStatus::Processing)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .count_by_status(MessageStatus::Completed)
                .await
                .unwrap(),
            0
        );
    }
}
