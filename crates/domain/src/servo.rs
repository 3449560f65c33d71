//! Servo positioning through the board's I2C bridge.
//!
//! Servos hang off a 16-channel PWM expander reached via the I2C module.
//! Each channel owns four registers (on-low, on-high, off-low, off-high);
//! the on time is always 0 and the off time sets the pulse width.

use serde::{Deserialize, Serialize};

use crate::command::{Module, RegisterWrite};
use crate::error::ValidationError;

const I2C_BASE: u16 = 0x8000;
const MODE1: u16 = 0x00;
const MODE2: u16 = 0x01;
const PRESCALE: u16 = 0xFE;
const CHANNEL0_ON_L: u16 = 0x06;
const REGISTERS_PER_CHANNEL: u16 = 4;

/// Channels on one expander.
pub const CHANNELS: u8 = 16;

/// Pulse-width limits of one servo, in expander ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Expander channel, 0–15.
    pub channel: u8,
    #[serde(default = "default_min_pulse")]
    pub min_pulse: u16,
    #[serde(default = "default_max_pulse")]
    pub max_pulse: u16,
}

fn default_min_pulse() -> u16 {
    150
}

fn default_max_pulse() -> u16 {
    600
}

impl ServoConfig {
    #[must_use]
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            min_pulse: default_min_pulse(),
            max_pulse: default_max_pulse(),
        }
    }

    /// Check the channel exists and the pulse range is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ServoChannelOutOfRange`] for channels past
    /// the expander, [`ValidationError::EmptyServoRange`] when `min >= max`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel >= CHANNELS {
            return Err(ValidationError::ServoChannelOutOfRange(self.channel));
        }
        if self.min_pulse >= self.max_pulse {
            return Err(ValidationError::EmptyServoRange {
                min: self.min_pulse,
                max: self.max_pulse,
            });
        }
        Ok(())
    }

    /// Pulse width for a position in `0.0..=1.0`, truncated to whole ticks.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ServoPositionOutOfRange`] outside that range.
    pub fn pulse_width(&self, position: f32) -> Result<u16, ValidationError> {
        if !(0.0..=1.0).contains(&position) {
            return Err(ValidationError::ServoPositionOutOfRange(position));
        }
        let span = f32::from(self.max_pulse - self.min_pulse);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let offset = (position * span) as u16;
        Ok(self.min_pulse + offset)
    }

    /// Register writes moving the servo to `position`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ServoPositionOutOfRange`] outside `0.0..=1.0`.
    pub fn position_writes(&self, position: f32) -> Result<[RegisterWrite; 4], ValidationError> {
        let [off_low, off_high] = self.pulse_width(position)?.to_le_bytes();
        let base = CHANNEL0_ON_L + REGISTERS_PER_CHANNEL * u16::from(self.channel);
        Ok([
            i2c_write(base, 0),
            i2c_write(base + 1, 0),
            i2c_write(base + 2, off_low),
            i2c_write(base + 3, off_high),
        ])
    }
}

/// Expander bring-up: sleep, totem-pole outputs, 50 Hz prescale, wake.
#[must_use]
pub fn init_writes() -> [RegisterWrite; 4] {
    [
        i2c_write(MODE1, 0x11),
        i2c_write(MODE2, 0x04),
        i2c_write(PRESCALE, 130),
        i2c_write(MODE1, 0x01),
    ]
}

fn i2c_write(register: u16, value: u8) -> RegisterWrite {
    RegisterWrite::new(Module::I2c, I2C_BASE | register, u32::from(value))
}
