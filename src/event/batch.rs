use tokio::sync::oneshot;

use super::Event;

/// A group of events handed to a sink by the upstream pipeline.
///
/// Both outcome methods consume the batch, so a sink settles it exactly once:
/// either everything is acknowledged or the given subset is queued again.
pub trait Batch: Send + Sync {
    fn events(&self) -> &[Event];

    fn ack(self: Box<Self>);

    fn retry_events(self: Box<Self>, events: Vec<Event>);
}

/// How a [`EventBatch`] was settled.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchStatus {
    Acked,
    Retry(Vec<Event>),
}

pub type BatchStatusReceiver = oneshot::Receiver<BatchStatus>;

/// A [`Batch`] that reports its outcome over a oneshot channel.
#[derive(Debug)]
pub struct EventBatch {
    events: Vec<Event>,
    notifier: oneshot::Sender<BatchStatus>,
}

impl EventBatch {
    pub fn new(events: Vec<Event>) -> (Self, BatchStatusReceiver) {
        let (notifier, receiver) = oneshot::channel();
        (Self { events, notifier }, receiver)
    }

    fn settle(self, status: BatchStatus) {
        // The receiver going away means nobody is waiting on this outcome.
        let _ = self.notifier.send(status);
    }
}

impl Batch for EventBatch {
    fn events(&self) -> &[Event] {
        &self.events
    }

    fn ack(self: Box<Self>) {
        self.settle(BatchStatus::Acked);
    }

    fn retry_events(self: Box<Self>, events: Vec<Event>) {
        self.settle(BatchStatus::Retry(events));
    }
}
