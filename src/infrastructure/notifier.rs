use crate::domain::events::EnrollmentEvent;
use crate::domain::ports::EnrollmentNotifier;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Fans verification outcomes out to in-process subscribers.
///
/// Publishing with no subscribers is not an error; lagging subscribers lose
/// the oldest events.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<EnrollmentEvent>,
}

impl BroadcastNotifier {
    /// A `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnrollmentEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EnrollmentNotifier for BroadcastNotifier {
    async fn publish(&self, event: EnrollmentEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("no subscribers for enrollment event");
        }
    }
}

/// Discards every event.
#[derive(Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl EnrollmentNotifier for NoopNotifier {
    async fn publish(&self, _event: EnrollmentEvent) {}
}
