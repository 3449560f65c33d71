//! Inbound telemetry from the board and the domain events derived from it.
//!
//! The worker polls [`RawEvent`]s (a numeric type code plus a value); the
//! switch classifier and accelerometer decoder turn the ones they understand
//! into [`BoardEvent`]s for the rest of the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EventId, SwitchNumber};

/// UTC time at which the host observed an event.
pub type Timestamp = DateTime<Utc>;

/// Event type codes reported by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SwitchClosedDebounced,
    SwitchOpenDebounced,
    SwitchClosedNondebounced,
    SwitchOpenNondebounced,
    DmdFrameDisplayed,
    BurstSwitchOpen,
    BurstSwitchClosed,
    AccelerometerX,
    AccelerometerY,
    AccelerometerZ,
    AccelerometerIrq,
}

impl EventType {
    /// Decode a raw board code. Unknown codes yield `None`.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::SwitchClosedDebounced,
            2 => Self::SwitchOpenDebounced,
            3 => Self::SwitchClosedNondebounced,
            4 => Self::SwitchOpenNondebounced,
            5 => Self::DmdFrameDisplayed,
            6 => Self::BurstSwitchOpen,
            7 => Self::BurstSwitchClosed,
            8 => Self::AccelerometerX,
            9 => Self::AccelerometerY,
            10 => Self::AccelerometerZ,
            11 => Self::AccelerometerIrq,
            _ => return None,
        })
    }

    /// The board code for this event type.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::SwitchClosedDebounced => 1,
            Self::SwitchOpenDebounced => 2,
            Self::SwitchClosedNondebounced => 3,
            Self::SwitchOpenNondebounced => 4,
            Self::DmdFrameDisplayed => 5,
            Self::BurstSwitchOpen => 6,
            Self::BurstSwitchClosed => 7,
            Self::AccelerometerX => 8,
            Self::AccelerometerY => 9,
            Self::AccelerometerZ => 10,
            Self::AccelerometerIrq => 11,
        }
    }
}

/// One event as polled from the board: a type code and a numeric payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub code: u32,
    pub value: u32,
}

impl RawEvent {
    #[must_use]
    pub const fn new(event_type: EventType, value: u32) -> Self {
        Self {
            code: event_type.code(),
            value,
        }
    }

    /// The decoded event type, or `None` for codes the core does not know.
    #[must_use]
    pub const fn event_type(&self) -> Option<EventType> {
        EventType::from_code(self.code)
    }
}

/// Something observed on the board, ready for domain callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEvent {
    pub id: EventId,
    pub kind: BoardEventKind,
    pub timestamp: Timestamp,
}

impl BoardEvent {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(kind: BoardEventKind) -> Self {
        Self {
            id: EventId::new(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Payload of a [`BoardEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardEventKind {
    /// A switch changed logical state.
    SwitchChanged { switch: SwitchNumber, active: bool },
    /// A complete accelerometer sample, in g.
    Acceleration { x: f64, y: f64, z: f64 },
}

impl std::fmt::Display for BoardEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SwitchChanged { switch, active } => {
                let state = if *active { "active" } else { "inactive" };
                write!(f, "switch({switch}) -> {state}")
            }
            Self::Acceleration { x, y, z } => write!(f, "acceleration({x}, {y}, {z})"),
        }
    }
}
