//! Background completion of processed messages.
//!
//! Each tick of the [`DrainWorker`] walks a small state machine:
//!
//! ```text
//! Idle -> Checking -> Draining -> Completing -> Idle
//!            |                                   ^
//!            +------- nothing processing --------+
//! ```
//!
//! * **Checking** counts `processing` messages and ends the tick early when
//!   there are none, without touching the queue.
//! * **Draining** consumes events until half the tick budget is spent, the
//!   queue stays empty, the tick is cancelled, or an event fails to read or
//!   decode. Whatever was collected so far moves on.
//! * **Completing** marks every collected id `completed` in one bulk write.
//!
//! Events are consumed before the completion write. If that write fails, the
//! consumed events are gone and their messages stay `processing`.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Error,
    message::MessageStatus,
    queue::EventQueue,
    scheduler::{Job, Scheduler},
    service::Service,
    store::MessageStore,
};

pub const TASK_NAME: &str = "drain_processing_messages";

/// Where a tick currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DrainState {
    Idle,
    Checking,
    Draining { processing: u64 },
    Completing { ids: BTreeSet<u64>, events: usize },
}

/// What a finished tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No message was `processing`; the queue and the store were left alone.
    Skipped,
    /// The drain ran and its batch was written back.
    Completed {
        /// Events taken off the queue
        events: usize,
        /// Distinct ids in the completion batch
        ids: usize,
        /// Records the store actually transitioned
        updated: u64,
    },
}

pub struct DrainWorker {
    store: Arc<dyn MessageStore>,
    queue: Arc<dyn EventQueue>,
    run_timeout: Duration,
}

impl DrainWorker {
    pub fn new(
        store: Arc<dyn MessageStore>,
        queue: Arc<dyn EventQueue>,
        run_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            run_timeout,
        }
    }

    pub fn from_service(service: &Service, run_timeout: Duration) -> Self {
        Self::new(service.store().clone(), service.queue().clone(), run_timeout)
    }

    /// Registers a worker on `scheduler`, firing every `interval`.
    pub fn register(
        scheduler: &Scheduler,
        service: &Service,
        interval: Duration,
        run_timeout: Duration,
    ) {
        let worker = Arc::new(Self::from_service(service, run_timeout));

        scheduler.schedule(TASK_NAME, interval, worker);
    }

    /// Runs one full cycle, bounded by the run timeout.
    ///
    /// Cancelling `cancel` cuts the drain short; the tick still writes back
    /// what it collected before returning.
    ///
    /// # Errors
    /// * [`Error::Timeout`] when the whole cycle overruns the run timeout
    /// * Store errors from the count or the completion write
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<TickOutcome, Error> {
        let cancel = cancel.child_token();
        let _guard = cancel.clone().drop_guard();

        match tokio::time::timeout(self.run_timeout, self.cycle(&cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn cycle(&self, cancel: &CancellationToken) -> Result<TickOutcome, Error> {
        let drain_deadline = Instant::now() + self.run_timeout / 2;

        let mut outcome = TickOutcome::Skipped;
        let mut state = DrainState::Checking;

        loop {
            state = match state {
                DrainState::Idle => break,

                DrainState::Checking => {
                    let processing = self
                        .store
                        .count_by_status(MessageStatus::Processing)
                        .await
                        .inspect_err(|e| tracing::error!(error = %e, "failed to count messages"))?;

                    if processing == 0 {
                        tracing::debug!("no messages to process");
                        DrainState::Idle
                    } else {
                        DrainState::Draining { processing }
                    }
                }

                DrainState::Draining { processing } => {
                    let (ids, events) = self.drain(drain_deadline, cancel).await;
                    tracing::debug!(processing, events, ids = ids.len(), "drained queue");

                    DrainState::Completing { ids, events }
                }

                DrainState::Completing { ids, events } => {
                    let updated = self
                        .store
                        .update_status(&ids, MessageStatus::Completed)
                        .await
                        .inspect_err(|e| {
                            tracing::error!(error = %e, "failed to update messages status")
                        })?;

                    outcome = TickOutcome::Completed {
                        events,
                        ids: ids.len(),
                        updated,
                    };

                    DrainState::Idle
                }
            };
        }

        Ok(outcome)
    }

    /// Consumes events until the deadline, cancellation, or the first failure.
    ///
    /// Returns the distinct message ids found and the number of events read.
    /// Ids are not checked against the store.
    async fn drain(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> (BTreeSet<u64>, usize) {
        let mut ids = BTreeSet::new();
        let mut events = 0;

        loop {
            let event = match self.queue.consume_one(deadline, cancel).await {
                Ok(event) => event,
                Err(e) if e.is_interrupted() => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read event");
                    break;
                }
            };
            events += 1;

            match event.decode_message() {
                Ok(message) => {
                    ids.insert(message.id);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to decode event");
                    break;
                }
            }
        }

        (ids, events)
    }
}

impl Job for DrainWorker {
    fn run<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            tracing::info!("starting");

            let outcome = self.tick(cancel).await?;
            if let TickOutcome::Completed {
                events,
                ids,
                updated,
            } = outcome
            {
                tracing::info!(events, ids, updated, "completed messages");
            }

            tracing::info!("finished");

            Ok(())
        })
    }
}
