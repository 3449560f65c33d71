//! Common error types used across the workspace.
//!
//! Each failure class is its own typed error; [`BoardError`] aggregates them
//! through `#[from]` so callers can propagate with `?` across layers.

use crate::id::{AxisNumber, DriverNumber, SwitchNumber};

/// Top-level error for operations on the control board.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// A sustained drive was requested on a driver that does not allow it.
    #[error("capability violation")]
    Capability(#[from] CapabilityViolation),

    /// The worker could not complete a submitted command.
    #[error("dispatch failure")]
    Dispatch(#[from] DispatchError),

    /// A referenced switch, driver, or axis is not mapped.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A value failed a domain invariant.
    #[error("validation error")]
    Validation(#[from] ValidationError),
}

/// Raised when an enable/hold action targets a driver lacking `allow_enable`.
///
/// This is a programming-contract failure: the request is rejected before
/// anything is sent to the board and is never downgraded to a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("driver {driver} does not allow sustained enable")]
pub struct CapabilityViolation {
    pub driver: DriverNumber,
}

/// Failure delivering a command through the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The hardware link reported an error while executing the command.
    #[error("hardware link error")]
    Link(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The worker is gone: the queue is closed or the reply was dropped.
    #[error("dispatcher worker stopped")]
    WorkerStopped,

    /// A synchronous round-trip was requested from the worker thread itself.
    #[error("synchronous dispatch from the worker thread would deadlock")]
    WouldDeadlock,

    /// The worker answered with a reply of the wrong shape.
    #[error("unexpected reply {0}")]
    UnexpectedReply(&'static str),
}

/// A lookup by board number found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("switch {0} is not mapped")]
    Switch(SwitchNumber),
    #[error("driver {0} is not mapped")]
    Driver(DriverNumber),
    #[error("stepper axis {0} is not mapped")]
    Axis(AxisNumber),
    #[error("servo channel {0} is not mapped")]
    Servo(u8),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("power {0} is outside 0.0..=1.0")]
    PowerOutOfRange(f32),
    #[error("servo position {0} is outside 0.0..=1.0")]
    ServoPositionOutOfRange(f32),
    #[error("servo channel {0} does not exist")]
    ServoChannelOutOfRange(u8),
    #[error("servo pulse range {min}..{max} is empty")]
    EmptyServoRange { min: u16, max: u16 },
    #[error("hold power {0} must be positive")]
    ZeroHoldPower(f32),
}
