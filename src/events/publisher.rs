use super::types::LifecycleEvent;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Fan-out of lifecycle events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: LifecycleEvent,
    pub published_at: DateTime<Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event and log its milestone marker.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: LifecycleEvent) {
        log_milestone(&event);

        let published = PublishedEvent {
            event,
            published_at: Utc::now(),
        };
        if self.sender.send(published).is_err() {
            debug!("No subscribers for lifecycle event");
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

fn log_milestone(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::DecommissioningStarted {
            node_id,
            attempt_id,
        } => info!(node_id = %node_id, attempt_id = %attempt_id, "DECOMMISSIONING"),
        LifecycleEvent::RangeTransferSkipped {
            node_id,
            keyspace,
            range,
            target,
        } => debug!(
            node_id = %node_id,
            keyspace = %keyspace,
            range = %range,
            target = %target,
            "Skipping transferred range"
        ),
        LifecycleEvent::RangeTransferred {
            node_id,
            keyspace,
            range,
            target,
            rows,
            bytes,
        } => debug!(
            node_id = %node_id,
            keyspace = %keyspace,
            range = %range,
            target = %target,
            rows = rows,
            bytes = bytes,
            "Range transferred"
        ),
        LifecycleEvent::DecommissionFailed {
            node_id,
            attempt_id,
            reason,
        } => warn!(
            node_id = %node_id,
            attempt_id = %attempt_id,
            reason = %reason,
            "Error while decommissioning node"
        ),
        LifecycleEvent::Decommissioned {
            node_id,
            attempt_id,
        } => info!(node_id = %node_id, attempt_id = %attempt_id, "DECOMMISSIONED"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptId, NodeId};

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let publisher = EventPublisher::new(8);
        let mut receiver = publisher.subscribe();
        let node_id = NodeId::from("node2");
        let attempt_id = AttemptId::new();

        publisher.publish(LifecycleEvent::DecommissioningStarted {
            node_id: node_id.clone(),
            attempt_id,
        });
        publisher.publish(LifecycleEvent::Decommissioned {
            node_id: node_id.clone(),
            attempt_id,
        });

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.event.name(), "DECOMMISSIONING_STARTED");
        let second = receiver.recv().await.unwrap();
        assert!(second.event.is_terminal());
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::default();
        publisher.publish(LifecycleEvent::DecommissionFailed {
            node_id: NodeId::from("node2"),
            attempt_id: AttemptId::new(),
            reason: "target unreachable".to_string(),
        });
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
