//! Message types and status management for the processing pipeline.
//!
//! A message is accepted over HTTP, persisted, announced on the event queue
//! and eventually completed by the drain worker.
//!
//! # Message Lifecycle
//!
//! 1. Messages are created in `Created` status by the store
//! 2. The ingestion path publishes an event and moves them to `Processing`
//! 3. The drain worker consumes the event and moves them to `Completed`
//!
//! Transitions only ever move forward. The store refuses to apply a status
//! write to a record that is already at or past the target status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents the current status of a message in the pipeline.
///
/// The status transitions follow:
/// `Created` -> `Processing` -> `Completed`
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    /// Message has been stored but no event has been published for it yet
    Created,
    /// An event for the message is on the queue, waiting for the drain worker
    Processing,
    /// The drain worker consumed the event and marked the message done
    Completed,
}

impl MessageStatus {
    /// Statuses a record may be in for a write of `self` to apply.
    pub fn predecessors(self) -> &'static [MessageStatus] {
        match self {
            Self::Created => &[],
            Self::Processing => &[Self::Created],
            Self::Completed => &[Self::Created, Self::Processing],
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        next.predecessors().contains(&self)
    }
}

/// A text message tracked by the pipeline.
///
/// Serialized in camelCase; the same encoding is used for HTTP responses and
/// for the value of queue events.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier assigned by the store
    pub id: u64,

    pub created_at: DateTime<Utc>,
    /// Refreshed on every status transition
    pub updated_at: DateTime<Utc>,

    /// The payload supplied by the client
    pub text: String,

    /// Current status of the message
    pub status: MessageStatus,
}

/// Aggregate counts of messages per status, as served by `GET /api/messages`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageStatistics {
    pub processing: u64,
    pub completed: u64,
}
