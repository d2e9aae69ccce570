use std::{collections::BTreeSet, sync::Arc};

use crate::{
    config::{Config, QueueBackend},
    error::Error,
    message::{Message, MessageStatistics, MessageStatus},
    queue::{Event, EventQueue, InMemoryEventQueue, SqliteEventQueue},
    store::{MessageStore, SqliteMessageStore},
};

/// The ingestion side of the pipeline, shared by every HTTP worker.
///
/// Holds the store and queue the drain worker also uses; cloning is cheap.
#[derive(Clone)]
pub struct Service {
    store: Arc<dyn MessageStore>,
    queue: Arc<dyn EventQueue>,
}

impl Service {
    pub fn new(store: Arc<dyn MessageStore>, queue: Arc<dyn EventQueue>) -> Self {
        Self { store, queue }
    }

    /// Connects the store and queue described by `config`.
    pub async fn connect_with(config: &Config) -> Result<Self, Error> {
        let store = SqliteMessageStore::connect(config.db_path(), config.store_migrate()).await?;

        let queue: Arc<dyn EventQueue> = match config.queue_backend() {
            QueueBackend::Sqlite => Arc::new(
                SqliteEventQueue::connect(config.queue_path(), config.queue_topic())
                    .await?
                    .with_poll_interval(config.queue_poll_interval()),
            ),
            QueueBackend::Memory => Arc::new(InMemoryEventQueue::new(config.queue_capacity())),
        };

        tracing::info!(backend = %config.queue_backend(), "event queue ready");

        Ok(Self::new(Arc::new(store), queue))
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn EventQueue> {
        &self.queue
    }

    /// Accepts a new message and hands it to the pipeline.
    ///
    /// The message is created, published to the queue as `processing`, and
    /// only then persisted as `processing`. Any failure aborts the submission
    /// without undoing earlier steps: a failed publish leaves the message in
    /// `created` with no event behind it.
    #[tracing::instrument(skip_all, fields(id = tracing::field::Empty))]
    pub async fn submit(&self, text: &str) -> Result<Message, Error> {
        if text.trim().is_empty() {
            return Err(Error::invalid_parameter("message must not be empty"));
        }

        let id = self.store.create_message(text).await?;
        tracing::Span::current().record("id", id);

        let mut message = self.store.get_message(id).await?;
        message.status = MessageStatus::Processing;

        self.queue.publish(vec![Event::for_message(&message)?]).await?;

        self.store
            .update_status(&BTreeSet::from([id]), MessageStatus::Processing)
            .await?;

        tracing::debug!("message submitted");

        Ok(message)
    }

    pub async fn get_message(&self, id: u64) -> Result<Message, Error> {
        self.store.get_message(id).await
    }

    /// Counts of messages still in flight and already completed.
    pub async fn statistics(&self) -> Result<MessageStatistics, Error> {
        let processing = self
            .store
            .count_by_status(MessageStatus::Processing)
            .await?;
        let completed = self
            .store
            .count_by_status(MessageStatus::Completed)
            .await?;

        Ok(MessageStatistics {
            processing,
            completed,
        })
    }

    /// Closes the queue and the store, flushing their connections.
    pub async fn close(&self) {
        self.queue.close().await;
        self.store.close().await;
    }
}
