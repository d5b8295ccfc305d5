//! In-process fan-out of [`RunEvent`]s backed by `tokio::sync::broadcast`.

use dreamchain_contracts::events::RunEvent;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Any number of subscribers independently receive every published event.
/// Slow subscribers observe `RecvError::Lagged` once the buffer wraps.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: RunEvent) {
        // A send error only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use dreamchain_contracts::events::{RunEvent, RunEventKind};

    use super::EventBus;

    fn log_event(line: &str) -> RunEvent {
        RunEvent::new(
            "run-1",
            RunEventKind::LogLine {
                line: line.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn every_subscriber_receives_events_in_order() -> anyhow::Result<()> {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(log_event("one"));
        bus.publish(log_event("two"));

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await?.kind, log_event("one").kind);
            assert_eq!(rx.recv().await?.kind, log_event("two").kind);
        }
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(log_event("dropped"));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
