use std::sync::{Arc, Mutex, PoisonError};

use stream_cancel::{Trigger, Tripwire};

use super::{
    backoff::{BackoffConfig, EqualJitterBackoff},
    observer::Observer,
};
use crate::{
    event::{Batch, Event},
    internal_events::{EventsDropped, EventsRetried},
};

/// A failed publish attempt: the events to hand back and the error that
/// stopped transmission.
#[derive(Debug)]
pub struct PublishError {
    pub retry: Vec<Event>,
    pub error: crate::Error,
}

impl PublishError {
    pub fn new(retry: Vec<Event>, error: impl Into<crate::Error>) -> Self {
        Self {
            retry,
            error: error.into(),
        }
    }
}

/// Runs `build` over every event, keeping the events that produced a payload.
///
/// The two returned vectors are index aligned and keep the input order, so a
/// failure at payload `i` maps back to event `i`.
pub fn extract_payloads<T>(
    events: &[Event],
    mut build: impl FnMut(&Event) -> Option<T>,
) -> (Vec<Event>, Vec<T>) {
    let mut accepted = Vec::with_capacity(events.len());
    let mut payloads = Vec::with_capacity(events.len());
    for event in events {
        if let Some(payload) = build(event) {
            payloads.push(payload);
            accepted.push(event.clone());
        }
    }
    (accepted, payloads)
}

/// Batch bookkeeping shared by every network client: observer reporting,
/// settling the batch, and backoff after failures.
pub struct Publisher {
    sink: &'static str,
    observer: Arc<dyn Observer>,
    backoff: EqualJitterBackoff,
    done: Mutex<Option<Trigger>>,
}

impl Publisher {
    pub fn new(sink: &'static str, observer: Arc<dyn Observer>, backoff: BackoffConfig) -> Self {
        let (trigger, tripwire): (Trigger, Tripwire) = Tripwire::new();
        Self {
            sink,
            observer,
            backoff: EqualJitterBackoff::new(tripwire, backoff.init(), backoff.max()),
            done: Mutex::new(Some(trigger)),
        }
    }

    pub fn new_batch(&self, count: usize) {
        self.observer.new_batch(count);
    }

    /// Reports events that could not be turned into payloads. They are never
    /// retried.
    pub fn dropped(&self, total: usize, accepted: usize, reason: &'static str) {
        let dropped = total - accepted;
        debug!(message = "Checked batch.", total, dropped);
        if dropped > 0 {
            emit!(EventsDropped {
                sink: self.sink,
                count: dropped,
                reason,
            });
            self.observer.dropped(dropped);
        }
    }

    pub fn acked(&self, count: usize) {
        self.observer.acked(count);
    }

    /// Settles the batch according to `result` and applies backoff.
    ///
    /// A non-empty retry set is reported as failed and handed back; anything
    /// else acknowledges the whole batch. On error the caller is held in
    /// backoff before the error is returned.
    pub async fn finalize(
        &self,
        batch: Box<dyn Batch>,
        result: Result<(), PublishError>,
    ) -> crate::Result<()> {
        match result {
            Ok(()) => {
                batch.ack();
                self.backoff.wait_on_error(false).await;
                Ok(())
            }
            Err(PublishError { retry, error }) => {
                if retry.is_empty() {
                    batch.ack();
                } else {
                    emit!(EventsRetried {
                        sink: self.sink,
                        count: retry.len(),
                        error: &error,
                    });
                    self.observer.failed(retry.len());
                    batch.retry_events(retry);
                }
                self.backoff.wait_on_error(true).await;
                Err(error)
            }
        }
    }

    /// Trips the shutdown signal, interrupting any backoff in progress.
    /// Only the first call has an effect.
    pub fn shutdown(&self) {
        let trigger = self
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(trigger) = trigger {
            trigger.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
