//! Outbound port for board events the host should hear about.

use std::future::Future;

use rocwire_domain::error::BoardError;
use rocwire_domain::event::BoardEvent;

/// Sink for debounced switch changes and tilt readings.
///
/// Called from the event-processing path; implementations must not block
/// on slow listeners.
pub trait EventPublisher {
    /// Hand `event` to whoever is listening.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the platform propagates it from
    /// `process_event`.
    fn publish(&self, event: BoardEvent) -> impl Future<Output = Result<(), BoardError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: BoardEvent) -> impl Future<Output = Result<(), BoardError>> + Send {
        (**self).publish(event)
    }
}
