//! Fan-out of switch changes and accelerometer readings to host listeners.
//!
//! The platform publishes from the event-processing path, so publishing must
//! never wait on a listener. A listener that falls more than `capacity`
//! events behind loses the oldest ones and sees [`broadcast::error::RecvError::Lagged`].

use std::future::Future;

use tokio::sync::broadcast;

use rocwire_domain::error::BoardError;
use rocwire_domain::event::BoardEvent;

use crate::ports::EventPublisher;

/// Lossy [`broadcast`] bus for [`BoardEvent`]s.
///
/// With no listener attached, events are discarded.
pub struct InProcessEventBus {
    sender: broadcast::Sender<BoardEvent>,
}

impl InProcessEventBus {
    /// `capacity` bounds how far a slow listener may fall behind.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Attach a listener. It only sees events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: BoardEvent) -> impl Future<Output = Result<(), BoardError>> + Send {
        if self.sender.send(event).is_err() {
            tracing::trace!("board event dropped, no listener");
        }
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocwire_domain::event::BoardEventKind;
    use rocwire_domain::id::SwitchNumber;

    fn switch_event(number: u16, active: bool) -> BoardEvent {
        BoardEvent::new(BoardEventKind::SwitchChanged {
            switch: SwitchNumber::new(number),
            active,
        })
    }

    #[tokio::test]
    async fn should_deliver_event_to_subscriber() {
        let bus = InProcessEventBus::new(16);
        let mut rx = bus.subscribe();

        let event = switch_event(23, true);
        let event_id = event.id;

        bus.publish(event).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event_id);
    }

    #[tokio::test]
    async fn should_deliver_event_to_multiple_subscribers() {
        let bus = InProcessEventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = BoardEvent::new(BoardEventKind::Acceleration {
            x: 0.0,
            y: 0.0,
            z: 1.0,
        });
        let event_id = event.id;

        bus.publish(event).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().id, event_id);
        assert_eq!(rx2.recv().await.unwrap().id, event_id);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        assert!(bus.publish(switch_event(1, false)).await.is_ok());
    }

    #[tokio::test]
    async fn should_report_lag_when_listener_falls_behind() {
        let bus = InProcessEventBus::new(2);
        let mut rx = bus.subscribe();

        for active in [true, false, true] {
            bus.publish(switch_event(5, active)).await.unwrap();
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        let oldest_kept = rx.recv().await.unwrap();
        assert_eq!(
            oldest_kept.kind,
            BoardEventKind::SwitchChanged {
                switch: SwitchNumber::new(5),
                active: false
            }
        );
    }

    #[tokio::test]
    async fn should_not_deliver_events_published_before_subscription() {
        let bus = InProcessEventBus::new(16);
        bus.publish(switch_event(1, true)).await.unwrap();

        let mut rx = bus.subscribe();

        let later = switch_event(1, false);
        let later_id = later.id;
        bus.publish(later).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().id, later_id);
    }
}
