//! Accelerometer sample decoding.
//!
//! The board reports each axis as a raw 14-bit two's-complement value in
//! units of 1/4096 g (a ±2 g range), one event per axis. X and Y are
//! latched; the Z sample completes a reading.

use crate::command::{Module, RegisterWrite};
use crate::event::{BoardEventKind, EventType, RawEvent};

/// Raw counts per g.
pub const COUNTS_PER_G: f64 = 4096.0;

const SAMPLE_MASK: u32 = 0x3FFF;
const SIGN_BIT: u32 = 0x2000;
const RANGE: i32 = 0x4000;

/// Decode one raw two's-complement sample into g.
///
/// Bits above the 14-bit sample are ignored.
#[must_use]
pub fn decode(raw: u32) -> f64 {
    let raw = raw & SAMPLE_MASK;
    let unsigned = i32::try_from(raw).unwrap_or_default();
    let signed = if raw & SIGN_BIT == 0 {
        unsigned
    } else {
        unsigned - RANGE
    };
    f64::from(signed) / COUNTS_PER_G
}

/// Register writes that enable the on-board accelerometer.
#[must_use]
pub fn configure_writes() -> [RegisterWrite; 6] {
    const CONTROL: u16 = 0x0000;
    const CTRL_REG1: u16 = 0x012A;
    const HP_FILTER: u16 = 0x010E;
    const CTRL_REG2: u16 = 0x012B;
    [
        RegisterWrite::new(Module::Accelerometer, CONTROL, 0x000F),
        RegisterWrite::new(Module::Accelerometer, CTRL_REG1, 0x0000),
        RegisterWrite::new(Module::Accelerometer, HP_FILTER, 0x0000),
        RegisterWrite::new(Module::Accelerometer, CTRL_REG1, 0x0005),
        RegisterWrite::new(Module::Accelerometer, CTRL_REG2, 0x0002),
        RegisterWrite::new(Module::Accelerometer, CONTROL, 0x1E0F),
    ]
}

/// Collects per-axis events into complete readings.
#[derive(Debug, Clone, Default)]
pub struct AccelerometerDecoder {
    latched: [u32; 2],
}

impl AccelerometerDecoder {
    /// Feed one raw event; returns a reading when the Z axis arrives.
    pub fn feed(&mut self, event: RawEvent) -> Option<BoardEventKind> {
        match event.event_type()? {
            EventType::AccelerometerX => self.latched[0] = event.value,
            EventType::AccelerometerY => self.latched[1] = event.value,
            EventType::AccelerometerZ => {
                return Some(BoardEventKind::Acceleration {
                    x: decode(self.latched[0]),
                    y: decode(self.latched[1]),
                    z: decode(event.value),
                });
            }
            _ => {}
        }
        None
    }
}
