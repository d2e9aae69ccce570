//! Event queue abstraction.
//!
//! The queue carries one event per ingested message from the HTTP path to
//! the drain worker. Publishing is concurrent; consumption goes through a
//! single logical cursor, and every consumed event is gone from the queue.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{error::Error, message::Message};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryEventQueue;
pub use sqlite::SqliteEventQueue;

/// An immutable record on the queue.
///
/// `timestamp` is assigned when the event is built for publishing, not by
/// the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub key: Bytes,
    pub value: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds the event announcing `message`: the key is the decimal id and
    /// the value is the JSON-encoded message as it stands in memory.
    pub fn for_message(message: &Message) -> Result<Self, Error> {
        let value = serde_json::to_vec(message)?;

        Ok(Self::new(message.id.to_string(), value))
    }

    /// Decodes the message snapshot carried in `value`.
    pub fn decode_message(&self) -> Result<Message, Error> {
        Ok(serde_json::from_slice(&self.value)?)
    }
}

/// Core trait for queue transports.
pub trait EventQueue: Send + Sync + 'static {
    /// Appends `events` in order.
    ///
    /// Publishing several events is not atomic: on error, a prefix of
    /// `events` may already have been accepted.
    fn publish(&self, events: Vec<Event>) -> BoxFuture<'_, Result<(), Error>>;

    /// Takes the next event off the queue, waiting for one to arrive.
    ///
    /// # Errors
    /// * [`Error::Timeout`] when `deadline` passes with nothing available
    /// * [`Error::Cancelled`] when `cancel` fires first
    /// * [`Error::Queue`] on transport failure
    fn consume_one<'a>(
        &'a self,
        deadline: Instant,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Event, Error>>;

    /// Releases the transport. Calls made afterwards fail.
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageStatus;

    #[test]
    fn message_event_round_trips_snapshot() {
        let now = Utc::now();
        let message = Message {
            id: 12,
            created_at: now,
            updated_at: now,
            text: "hello".to_owned(),
            status: MessageStatus::Processing,
        };

        let event = Event::for_message(&message).unwrap();

        assert_eq!(event.key, Bytes::from_static(b"12"));
        assert_eq!(event.decode_message().unwrap(), message);
    }

    #[test]
    fn garbage_value_fails_to_decode() {
        let event = Event::new("1", "not json");

        assert!(matches!(event.decode_message(), Err(Error::Codec { .. })));
    }
}
