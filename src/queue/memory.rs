//! In-memory queue for testing and single-process deployments.
//!
//! Backed by a bounded tokio channel. Publishing never waits: when the
//! buffer is full the publish fails, leaving already-sent events in place.

use futures_util::future::BoxFuture;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        Mutex,
    },
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::error::Error;

use super::{Event, EventQueue};

/// Bounded in-process FIFO with a single consumer cursor.
pub struct InMemoryEventQueue {
    tx: mpsc::Sender<Event>,
    rx: Mutex<mpsc::Receiver<Event>>,
}

impl InMemoryEventQueue {
    /// Creates a queue holding at most `capacity` unconsumed events.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);

        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Number of published events not yet consumed.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventQueue for InMemoryEventQueue {
    fn publish(&self, events: Vec<Event>) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            let count = events.len();

            for event in events {
                self.tx.try_send(event).map_err(|e| match e {
                    TrySendError::Full(_) => Error::queue("queue is full"),
                    TrySendError::Closed(_) => Error::queue("queue is closed"),
                })?;
            }

            tracing::debug!(count, "published events");

            Ok(())
        })
    }

    fn consume_one<'a>(
        &'a self,
        deadline: Instant,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Event, Error>> {
        Box::pin(async move {
            let next = async {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            };

            tokio::select! {
                biased;

                _ = cancel.cancelled() => Err(Error::Cancelled),
                event = next => {
                    tracing::debug!("consumed event");
                    event.ok_or_else(|| Error::queue("queue is closed"))
                }
                _ = tokio::time::sleep_until(deadline) => Err(Error::Timeout),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let queue = InMemoryEventQueue::new(8);
        let cancel = CancellationToken::new();

        queue
            .publish(vec![Event::new("1", "a"), Event::new("2", "b")])
            .await
            .unwrap();
        assert_eq!(queue.len(), 2);

        let first = queue.consume_one(far_deadline(), &cancel).await.unwrap();
        let second = queue.consume_one(far_deadline(), &cancel).await.unwrap();

        assert_eq!(first.key, "1");
        assert_eq!(second.key, "2");
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_empty() {
        let queue = InMemoryEventQueue::new(8);
        let cancel = CancellationToken::new();

        let res = queue
            .consume_one(Instant::now() + Duration::from_millis(50), &cancel)
            .await;

        assert!(matches!(res, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn cancellation_wins_over_waiting() {
        let queue = InMemoryEventQueue::new(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res = queue.consume_one(far_deadline(), &cancel).await;

        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn full_queue_rejects_publish_after_partial_accept() {
        let queue = InMemoryEventQueue::new(2);

        let res = queue
            .publish(vec![
                Event::new("1", "a"),
                Event::new("2", "b"),
                Event::new("3", "c"),
            ])
            .await;

        assert!(matches!(res, Err(Error::Queue { .. })));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn waiting_consumer_wakes_on_publish() {
        let queue = std::sync::Arc::new(InMemoryEventQueue::new(8));
        let cancel = CancellationToken::new();

        let consumer = tokio::spawn({
            let queue = queue.clone();
            let cancel = cancel.clone();
            async move { queue.consume_one(far_deadline(), &cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.publish(vec![Event::new("7", "x")]).await.unwrap();

        let event = consumer.await.unwrap().unwrap();
        assert_eq!(event.key, "7");
    }
}
