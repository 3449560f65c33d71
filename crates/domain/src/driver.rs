//! Driver outputs and the fixed-format state record the board executes.
//!
//! Every driver behaviour — pulse, sustained enable, PWM hold, schedule,
//! disable — is expressed as one [`DriverStateRecord`] with different field
//! values. [`encode`] is the single pure mapping from a logical
//! [`DriverAction`] to that record.

use serde::{Deserialize, Serialize};

use crate::error::{CapabilityViolation, ValidationError};
use crate::id::DriverNumber;
use crate::pwm::{self, DEFAULT_MAX_PERIOD_MS};

/// Static description of a driver output, created at board-mapping time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub number: DriverNumber,
    /// `true` when the output is driven active-high.
    #[serde(default = "default_polarity")]
    pub polarity: bool,
    /// Whether sustained drive (enable, hold) is permitted.
    #[serde(default)]
    pub allow_enable: bool,
    /// Whether pulses honour the board's recycle (re-trigger) delay.
    #[serde(default)]
    pub recycle: bool,
    /// Pulse length used when a caller does not name one.
    #[serde(default = "default_pulse_ms")]
    pub default_pulse_ms: u8,
    /// Power used for sustained drive, `0.0..=1.0`.
    #[serde(default = "default_hold_power")]
    pub hold_power: f32,
}

fn default_polarity() -> bool {
    true
}

fn default_pulse_ms() -> u8 {
    10
}

fn default_hold_power() -> f32 {
    1.0
}

impl DriverConfig {
    /// A driver with default settings: active-high, no enable, no recycle.
    #[must_use]
    pub fn new(number: DriverNumber) -> Self {
        Self {
            number,
            polarity: default_polarity(),
            allow_enable: false,
            recycle: false,
            default_pulse_ms: default_pulse_ms(),
            hold_power: default_hold_power(),
        }
    }

    #[must_use]
    pub fn allow_enable(mut self, allow: bool) -> Self {
        self.allow_enable = allow;
        self
    }

    #[must_use]
    pub fn recycle(mut self, recycle: bool) -> Self {
        self.recycle = recycle;
        self
    }

    #[must_use]
    pub fn hold_power(mut self, power: f32) -> Self {
        self.hold_power = power;
        self
    }

    /// Check the configured powers.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroHoldPower`] when `hold_power` is not
    /// positive, or [`ValidationError::PowerOutOfRange`] when it exceeds 1.0.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hold_power.is_nan() || self.hold_power <= 0.0 {
            return Err(ValidationError::ZeroHoldPower(self.hold_power));
        }
        if self.hold_power > 1.0 {
            return Err(ValidationError::PowerOutOfRange(self.hold_power));
        }
        Ok(())
    }

    /// Fail with [`CapabilityViolation`] unless sustained drive is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityViolation`] when `allow_enable` is not set.
    pub fn require_enable(&self) -> Result<(), CapabilityViolation> {
        if self.allow_enable {
            Ok(())
        } else {
            Err(CapabilityViolation {
                driver: self.number,
            })
        }
    }
}

/// The board's canonical driver state bitfield.
///
/// Field names serialize in the board's own vocabulary (`driverNum`,
/// `outputDriveTime`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStateRecord {
    pub driver_num: DriverNumber,
    pub polarity: bool,
    pub state: bool,
    /// Drive time in ms for pulses, in seconds for schedules; 0 = forever.
    pub output_drive_time: u8,
    pub wait_for_first_time_slot: bool,
    /// 32-slot on/off schedule mask.
    pub timeslots: u32,
    pub patter_on_time: u8,
    pub patter_off_time: u8,
    pub patter_enable: bool,
    pub future_enable: bool,
}

impl DriverStateRecord {
    /// A driver switched off with every timing field zeroed.
    #[must_use]
    pub fn disabled(driver: &DriverConfig) -> Self {
        Self {
            driver_num: driver.number,
            polarity: driver.polarity,
            state: false,
            output_drive_time: 0,
            wait_for_first_time_slot: false,
            timeslots: 0,
            patter_on_time: 0,
            patter_off_time: 0,
            patter_enable: false,
            future_enable: false,
        }
    }

    /// `true` when the record keeps the driver energised indefinitely.
    #[must_use]
    pub fn is_sustained(&self) -> bool {
        self.state && self.output_drive_time == 0
    }
}

/// Logical driver behaviour to encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverAction {
    /// Energise for `duration_ms`; below full power the pulse is pattered.
    Pulse,
    /// Energise indefinitely at `power` (full-on, or patter below full).
    Enable,
    /// Kick at full power for `duration_ms`, then hold at `power`.
    Hold,
    /// Run a 32-slot timeslot schedule for `cycle_seconds` (0 = forever).
    Schedule { timeslots: u32, cycle_seconds: u8 },
    /// Switch the output off.
    Disable,
}

/// Encode a driver action into a [`DriverStateRecord`].
///
/// Pure and deterministic: identical inputs always give identical records.
/// `recycle` only affects pulses: a recycled pulse may fire immediately,
/// otherwise it waits for the first free timeslot.
///
/// # Errors
///
/// Returns [`CapabilityViolation`] for [`DriverAction::Enable`],
/// [`DriverAction::Hold`] and a zero-length [`DriverAction::Pulse`] (a drive
/// time of 0 never expires) on a driver without `allow_enable`.
pub fn encode(
    driver: &DriverConfig,
    action: DriverAction,
    duration_ms: u8,
    power: f32,
    recycle: bool,
) -> Result<DriverStateRecord, CapabilityViolation> {
    let off = DriverStateRecord::disabled(driver);
    let record = match action {
        DriverAction::Disable => off,
        DriverAction::Pulse => {
            if duration_ms == 0 {
                driver.require_enable()?;
            }
            let mut record = DriverStateRecord {
                state: true,
                output_drive_time: duration_ms,
                wait_for_first_time_slot: !recycle,
                ..off
            };
            if power < 1.0 {
                let (on, off_ms) = pwm::power_to_on_off(power, DEFAULT_MAX_PERIOD_MS);
                record.patter_enable = true;
                record.patter_on_time = on;
                record.patter_off_time = off_ms;
            }
            record
        }
        DriverAction::Enable => {
            driver.require_enable()?;
            patter_or_full(off, power, 0)
        }
        DriverAction::Hold => {
            driver.require_enable()?;
            let initial = if power < 1.0 { duration_ms } else { 0 };
            patter_or_full(off, power, initial)
        }
        DriverAction::Schedule {
            timeslots,
            cycle_seconds,
        } => DriverStateRecord {
            state: true,
            output_drive_time: cycle_seconds,
            timeslots,
            ..off
        },
    };
    Ok(record)
}

fn patter_or_full(off: DriverStateRecord, power: f32, initial_ms: u8) -> DriverStateRecord {
    if power >= 1.0 {
        return DriverStateRecord {
            state: true,
            ..off
        };
    }
    let (on, off_ms) = pwm::power_to_on_off(power, DEFAULT_MAX_PERIOD_MS);
    DriverStateRecord {
        state: true,
        output_drive_time: initial_ms,
        patter_on_time: on,
        patter_off_time: off_ms,
        patter_enable: true,
        ..off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coil() -> DriverConfig {
        DriverConfig::new(DriverNumber::new(8))
    }

    #[test]
    fn should_encode_full_power_pulse() {
        let record = encode(&coil(), DriverAction::Pulse, 23, 1.0, false).unwrap();
        assert!(record.state);
        assert_eq!(record.output_drive_time, 23);
        assert!(!record.patter_enable);
        assert!(record.wait_for_first_time_slot);
        assert_eq!(record.driver_num, DriverNumber::new(8));
    }

    #[test]
    fn should_not_wait_for_timeslot_when_recycle_is_set() {
        let record = encode(&coil(), DriverAction::Pulse, 10, 1.0, true).unwrap();
        assert!(!record.wait_for_first_time_slot);
    }

    #[test]
    fn should_encode_identical_records_regardless_of_call_order() {
        let first = encode(&coil(), DriverAction::Pulse, 23, 1.0, false).unwrap();
        let _ = encode(&coil(), DriverAction::Disable, 0, 0.0, false).unwrap();
        let _ = encode(&coil(), DriverAction::Pulse, 40, 0.5, true).unwrap();
        let second = encode(&coil(), DriverAction::Pulse, 23, 1.0, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn should_patter_pulse_below_full_power() {
        let record = encode(&coil(), DriverAction::Pulse, 30, 0.5, false).unwrap();
        assert!(record.patter_enable);
        assert_eq!((record.patter_on_time, record.patter_off_time), (1, 1));
        assert_eq!(record.output_drive_time, 30);
    }

    #[test]
    fn should_reject_enable_without_capability() {
        let err = encode(&coil(), DriverAction::Enable, 0, 1.0, false).unwrap_err();
        assert_eq!(err.driver, DriverNumber::new(8));
    }

    #[test]
    fn should_reject_hold_without_capability() {
        assert!(encode(&coil(), DriverAction::Hold, 23, 0.5, false).is_err());
    }

    #[test]
    fn should_reject_zero_length_pulse_without_capability() {
        let err = encode(&coil(), DriverAction::Pulse, 0, 1.0, false).unwrap_err();
        assert_eq!(err.driver, DriverNumber::new(8));
    }

    #[test]
    fn should_allow_zero_length_pulse_on_enable_driver() {
        let driver = coil().allow_enable(true);
        let record = encode(&driver, DriverAction::Pulse, 0, 1.0, false).unwrap();
        assert!(record.is_sustained());
    }

    #[test]
    fn should_reject_non_positive_hold_power() {
        assert_eq!(
            coil().hold_power(0.0).validate(),
            Err(ValidationError::ZeroHoldPower(0.0))
        );
        assert!(coil().hold_power(-0.5).validate().is_err());
        assert!(coil().hold_power(f32::NAN).validate().is_err());
    }

    #[test]
    fn should_reject_hold_power_above_full() {
        assert_eq!(
            coil().hold_power(1.5).validate(),
            Err(ValidationError::PowerOutOfRange(1.5))
        );
        assert!(coil().hold_power(0.25).validate().is_ok());
        assert!(coil().validate().is_ok());
    }

    #[test]
    fn should_encode_enable_as_infinite_drive() {
        let driver = coil().allow_enable(true);
        let record = encode(&driver, DriverAction::Enable, 23, 1.0, false).unwrap();
        assert!(record.state);
        assert_eq!(record.output_drive_time, 0);
        assert!(record.is_sustained());
        assert!(!record.patter_enable);
    }

    #[test]
    fn should_encode_partial_hold_as_pulsed_patter() {
        let driver = coil().allow_enable(true);
        let record = encode(&driver, DriverAction::Hold, 23, 0.25, false).unwrap();
        assert!(record.patter_enable);
        assert_eq!(record.output_drive_time, 23);
        assert_eq!((record.patter_on_time, record.patter_off_time), (1, 3));
    }

    #[test]
    fn should_zero_every_timing_field_on_disable() {
        let record = encode(&coil(), DriverAction::Disable, 23, 1.0, true).unwrap();
        assert_eq!(record, DriverStateRecord::disabled(&coil()));
        assert!(!record.state);
        assert_eq!(record.output_drive_time, 0);
        assert_eq!(record.timeslots, 0);
    }

    #[test]
    fn should_encode_schedule_with_timeslot_mask() {
        let action = DriverAction::Schedule {
            timeslots: 0xFFFF_FFFF,
            cycle_seconds: 0,
        };
        let record = encode(&coil(), action, 0, 1.0, false).unwrap();
        assert_eq!(record.timeslots, 0xFFFF_FFFF);
        assert!(record.is_sustained());
    }

    #[test]
    fn should_serialize_in_board_vocabulary() {
        let record = DriverStateRecord::disabled(&coil());
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["driverNum"], 8);
        assert_eq!(json["waitForFirstTimeSlot"], false);
        assert_eq!(json["patterOffTime"], 0);
    }

    #[test]
    fn should_deserialize_driver_config_with_defaults() {
        let config: DriverConfig = toml::from_str("number = 20\nallow_enable = true").unwrap();
        assert_eq!(config.number, DriverNumber::new(20));
        assert!(config.allow_enable);
        assert!(config.polarity);
        assert_eq!(config.default_pulse_ms, 10);
        assert!((config.hold_power - 1.0).abs() < f32::EPSILON);
    }
}
