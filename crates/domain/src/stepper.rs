//! Stepper motion sequencing.
//!
//! Each axis is idle or moving. A move on an idle axis goes out at once as
//! three register writes on the motion controller; a move on a moving axis
//! only replaces the single pending target, which is issued when the axis
//! reports completion. An axis that has been moving for its settle time is
//! treated as finished.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{Module, RegisterWrite};
use crate::error::NotFoundError;
use crate::id::AxisNumber;

/// Motion-controller address every stepper write goes to.
pub const MOTION_ADDRESS: u16 = 0x0C00;

const WRITE_PREFIX: u32 = 0x0100_0000 | (0x04 << 16);
const REG_POSITION_LOW: u8 = 0x00;
const REG_POSITION_HIGH: u8 = 0x06;
const REG_START: u8 = 0x07;

/// Static description of a stepper axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepperConfig {
    pub axis: AxisNumber,
    /// How long a move is assumed to take when no completion is signalled.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u32,
}

fn default_settle_ms() -> u32 {
    500
}

impl StepperConfig {
    #[must_use]
    pub fn new(axis: AxisNumber) -> Self {
        Self {
            axis,
            settle_ms: default_settle_ms(),
        }
    }

    #[must_use]
    pub fn settle_ms(mut self, settle_ms: u32) -> Self {
        self.settle_ms = settle_ms;
        self
    }
}

/// Per-axis motion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    Idle,
    /// A move is in flight; `pending` is the latest target requested since.
    Moving { pending: Option<u16> },
}

#[derive(Debug, Clone)]
struct Axis {
    settle: Duration,
    state: AxisState,
}

/// Issues absolute moves for a set of axes, coalescing moves on busy axes.
#[derive(Debug, Clone, Default)]
pub struct StepperSequencer {
    axes: BTreeMap<AxisNumber, Axis>,
    sequence: u8,
}

impl StepperSequencer {
    /// A sequencer with every configured axis idle.
    #[must_use]
    pub fn new(configs: impl IntoIterator<Item = StepperConfig>) -> Self {
        let axes = configs
            .into_iter()
            .map(|config| {
                (
                    config.axis,
                    Axis {
                        settle: Duration::from_millis(u64::from(config.settle_ms)),
                        state: AxisState::Idle,
                    },
                )
            })
            .collect();
        Self { axes, sequence: 0 }
    }

    /// Request a move to `position`.
    ///
    /// Returns the writes to send now: three when the axis was idle, none
    /// when the target was queued behind a move in flight.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError::Axis`] for an unconfigured axis.
    pub fn move_to(
        &mut self,
        axis: AxisNumber,
        position: u16,
    ) -> Result<Vec<RegisterWrite>, NotFoundError> {
        let entry = self.axes.get_mut(&axis).ok_or(NotFoundError::Axis(axis))?;
        if let AxisState::Moving { pending } = &mut entry.state {
            *pending = Some(position);
            return Ok(Vec::new());
        }
        Ok(self.issue(axis, position))
    }

    /// Signal that the move in flight on `axis` finished.
    ///
    /// Flushes the pending target if there is one, otherwise the axis goes
    /// idle.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError::Axis`] for an unconfigured axis.
    pub fn complete(&mut self, axis: AxisNumber) -> Result<Vec<RegisterWrite>, NotFoundError> {
        let entry = self.axes.get_mut(&axis).ok_or(NotFoundError::Axis(axis))?;
        match entry.state {
            AxisState::Moving {
                pending: Some(position),
            } => Ok(self.issue(axis, position)),
            AxisState::Moving { pending: None } | AxisState::Idle => {
                entry.state = AxisState::Idle;
                Ok(Vec::new())
            }
        }
    }

    /// Current state of an axis.
    #[must_use]
    pub fn state(&self, axis: AxisNumber) -> Option<AxisState> {
        self.axes.get(&axis).map(|entry| entry.state)
    }

    /// How long a move on an axis is given before it counts as finished.
    #[must_use]
    pub fn settle_time(&self, axis: AxisNumber) -> Option<Duration> {
        self.axes.get(&axis).map(|entry| entry.settle)
    }

    fn issue(&mut self, axis: AxisNumber, position: u16) -> Vec<RegisterWrite> {
        self.sequence = self.sequence.wrapping_add(1);
        if let Some(entry) = self.axes.get_mut(&axis) {
            entry.state = AxisState::Moving { pending: None };
        }
        let [low, high] = position.to_le_bytes();
        vec![
            motion_write(REG_POSITION_LOW, low),
            motion_write(REG_POSITION_HIGH, high),
            motion_write(REG_START, self.sequence),
        ]
    }
}

fn motion_write(register: u8, byte: u8) -> RegisterWrite {
    let value = WRITE_PREFIX | (u32::from(register) << 8) | u32::from(byte);
    RegisterWrite::new(Module::MotionController, MOTION_ADDRESS, value)
}
