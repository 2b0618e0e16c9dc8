//! Fan-out of changed-unit snapshots to observers.

use auralis_audio::UnitSnapshot;
use tokio::sync::broadcast;

/// Broadcasts every unit the handler reports as changed.
///
/// Slow receivers lag and skip snapshots rather than holding up the
/// command path.
#[derive(Debug, Clone)]
pub struct ObserverHub {
    tx: broadcast::Sender<UnitSnapshot>,
}

impl ObserverHub {
    /// Create a hub buffering up to `capacity` snapshots per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UnitSnapshot> {
        self.tx.subscribe()
    }

    /// Send a snapshot to every current observer.
    pub fn publish(&self, snapshot: UnitSnapshot) {
        let _ = self.tx.send(snapshot);
    }

    /// Send a batch of snapshots in order.
    pub fn publish_all(&self, snapshots: impl IntoIterator<Item = UnitSnapshot>) {
        for snapshot in snapshots {
            self.publish(snapshot);
        }
    }

    /// Number of live observers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auralis_audio::{AudioHandler, SimulatedEngine, UnitKind};

    #[test]
    fn test_publish_reaches_subscribers() {
        let hub = ObserverHub::new(8);
        let mut rx = hub.subscribe();
        assert_eq!(hub.receiver_count(), 1);

        let handler = AudioHandler::new(SimulatedEngine::new());
        let snapshot = handler.recently_modified_unit().expect("listener nominated");
        hub.publish(snapshot);

        let received = rx.try_recv().expect("snapshot");
        assert_eq!(received.kind(), UnitKind::Listener);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = ObserverHub::new(8);
        let handler = AudioHandler::new(SimulatedEngine::new());
        hub.publish_all(handler.recently_modified_unit());
        assert_eq!(hub.receiver_count(), 0);
    }
}
