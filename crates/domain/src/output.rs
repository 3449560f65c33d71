//! Direct driver and light commands.
//!
//! Callers outside the rule engine drive outputs directly: coils are pulsed,
//! enabled and disabled; GI strings and matrix lamps take an 8-bit
//! intensity; serial LEDs take a per-channel value. Each driver operation
//! produces the board command together with the [`DriverStateRecord`] it
//! leaves the driver in.

use crate::command::Command;
use crate::driver::{DriverAction, DriverConfig, DriverStateRecord, encode};
use crate::error::CapabilityViolation;
use crate::pwm::{self, DEFAULT_MAX_PERIOD_MS, FULL_INTENSITY};

/// Schedule mask with every timeslot on.
pub const ALWAYS_ON: u32 = 0xFFFF_FFFF;

/// A command to send and the driver state it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectDrive {
    pub command: Command,
    pub record: DriverStateRecord,
}

/// Pulse a driver for `milliseconds`, pattered when `power` is below 1.0.
///
/// # Errors
///
/// Returns [`CapabilityViolation`] for a zero-length pulse (which never
/// expires) on a driver without `allow_enable`.
pub fn pulse(
    driver: &DriverConfig,
    milliseconds: u8,
    power: f32,
) -> Result<DirectDrive, CapabilityViolation> {
    let record = encode(driver, DriverAction::Pulse, milliseconds, power, driver.recycle)?;
    let command = if record.patter_enable {
        Command::DriverPulsedPatter {
            driver: driver.number,
            on_ms: record.patter_on_time,
            off_ms: record.patter_off_time,
            duration_ms: milliseconds,
            now: true,
        }
    } else {
        Command::DriverPulse {
            driver: driver.number,
            milliseconds,
        }
    };
    Ok(DirectDrive { command, record })
}

/// Energise a driver indefinitely at its configured hold power.
///
/// # Errors
///
/// Returns [`CapabilityViolation`] when the driver does not allow
/// sustained enable; no command is produced in that case.
pub fn enable(driver: &DriverConfig) -> Result<DirectDrive, CapabilityViolation> {
    let record = encode(driver, DriverAction::Enable, 0, driver.hold_power, false)?;
    let command = if record.patter_enable {
        Command::DriverPatter {
            driver: driver.number,
            on_ms: record.patter_on_time,
            off_ms: record.patter_off_time,
            original_on_ms: 0,
            now: true,
        }
    } else {
        Command::DriverSchedule {
            driver: driver.number,
            schedule: ALWAYS_ON,
            cycle_seconds: 0,
            now: true,
        }
    };
    Ok(DirectDrive { command, record })
}

/// Switch a driver off.
#[must_use]
pub fn disable(driver: &DriverConfig) -> DirectDrive {
    DirectDrive {
        command: Command::DriverDisable {
            driver: driver.number,
        },
        record: DriverStateRecord::disabled(driver),
    }
}

/// Drive a light-type output at an 8-bit intensity.
///
/// Full off and full on map to the plain disable and always-on schedule;
/// everything in between patters at the nearest achievable ratio.
#[must_use]
pub fn intensity(driver: &DriverConfig, value: u8) -> DirectDrive {
    match value {
        0 => disable(driver),
        FULL_INTENSITY => DirectDrive {
            command: Command::DriverSchedule {
                driver: driver.number,
                schedule: ALWAYS_ON,
                cycle_seconds: 0,
                now: true,
            },
            record: DriverStateRecord {
                state: true,
                timeslots: ALWAYS_ON,
                ..DriverStateRecord::disabled(driver)
            },
        },
        _ => {
            let (on_ms, off_ms) =
                pwm::power_to_on_off(pwm::intensity_to_power(value), DEFAULT_MAX_PERIOD_MS);
            DirectDrive {
                command: Command::DriverPatter {
                    driver: driver.number,
                    on_ms,
                    off_ms,
                    original_on_ms: 0,
                    now: true,
                },
                record: DriverStateRecord {
                    state: true,
                    patter_on_time: on_ms,
                    patter_off_time: off_ms,
                    patter_enable: true,
                    ..DriverStateRecord::disabled(driver)
                },
            }
        }
    }
}

/// Set one channel of a serial LED board.
#[must_use]
pub fn led(board: u8, index: u8, value: u8, inverted: bool) -> Command {
    Command::LedColor {
        board,
        index,
        value: pwm::invert_intensity(value, inverted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::DriverNumber;

    fn coil() -> DriverConfig {
        DriverConfig::new(DriverNumber::new(8))
    }

    fn patter(command: &Command) -> Option<(u8, u8)> {
        match command {
            Command::DriverPatter { on_ms, off_ms, .. } => Some((*on_ms, *off_ms)),
            _ => None,
        }
    }

    #[test]
    fn should_pulse_at_full_power() {
        let drive = pulse(&coil(), 23, 1.0).unwrap();
        assert_eq!(
            drive.command,
            Command::DriverPulse {
                driver: DriverNumber::new(8),
                milliseconds: 23
            }
        );
        assert_eq!(drive.record.output_drive_time, 23);
    }

    #[test]
    fn should_pulse_patter_when_power_is_partial() {
        let drive = pulse(&coil(), 10, 0.5).unwrap();
        assert_eq!(
            drive.command,
            Command::DriverPulsedPatter {
                driver: DriverNumber::new(8),
                on_ms: 1,
                off_ms: 1,
                duration_ms: 10,
                now: true
            }
        );
        assert!(drive.record.patter_enable);
    }

    #[test]
    fn should_refuse_endless_pulse_without_capability() {
        assert!(pulse(&coil(), 0, 1.0).is_err());
        let drive = pulse(&coil().allow_enable(true), 0, 1.0).unwrap();
        assert!(drive.record.is_sustained());
    }

    #[test]
    fn should_enable_with_always_on_schedule() {
        let drive = enable(&coil().allow_enable(true)).unwrap();
        assert_eq!(
            drive.command,
            Command::DriverSchedule {
                driver: DriverNumber::new(8),
                schedule: ALWAYS_ON,
                cycle_seconds: 0,
                now: true
            }
        );
        assert!(drive.record.is_sustained());
    }

    #[test]
    fn should_enable_with_patter_when_hold_power_is_partial() {
        let drive = enable(&coil().allow_enable(true).hold_power(0.25)).unwrap();
        assert_eq!(patter(&drive.command), Some((1, 3)));
    }

    #[test]
    fn should_refuse_enable_without_capability() {
        let err = enable(&coil()).unwrap_err();
        assert_eq!(err.driver, DriverNumber::new(8));
    }

    #[test]
    fn should_disable_on_zero_intensity() {
        let drive = intensity(&coil(), 0);
        assert_eq!(
            drive.command,
            Command::DriverDisable {
                driver: DriverNumber::new(8)
            }
        );
        assert!(!drive.record.state);
    }

    #[test]
    fn should_schedule_on_full_intensity() {
        let drive = intensity(&coil(), 255);
        assert!(matches!(
            drive.command,
            Command::DriverSchedule {
                schedule: ALWAYS_ON,
                ..
            }
        ));
    }

    #[test]
    fn should_patter_half_intensity_as_one_on_one_off() {
        assert_eq!(patter(&intensity(&coil(), 128).command), Some((1, 1)));
    }

    #[test]
    fn should_patter_near_full_intensity_at_nineteen_to_one() {
        assert_eq!(patter(&intensity(&coil(), 245).command), Some((19, 1)));
    }

    #[test]
    fn should_invert_led_value() {
        assert_eq!(
            led(2, 5, 40, true),
            Command::LedColor {
                board: 2,
                index: 5,
                value: 215
            }
        );
        assert_eq!(
            led(2, 5, 40, false),
            Command::LedColor {
                board: 2,
                index: 5,
                value: 40
            }
        );
    }
}
