//! Board identification and the operator-facing info summary.
//!
//! Firmware identity lives in manager registers; SW-16 switch boards answer
//! on the switch controller, 64 registers apart, with a device type and a
//! jumper-selected board id.

use std::fmt;

use serde::Serialize;

use crate::command::Module;

/// Manager register holding `version << 16 | revision`.
pub const VERSION_ADDRESS: u16 = 0x01;
/// Manager register holding the DIP switches; bits 8–11 are the board id.
pub const DIP_ADDRESS: u16 = 0x03;
/// Number of SW-16 addresses scanned.
pub const SW16_SLOTS: u8 = 32;

const SW16_BASE: u16 = 0x1000;
const SW16_SHIFT: u16 = 6;
const SW16_SWITCHES: u8 = 16;
const SW16_DEVICE_TYPES: [u8; 2] = [0xA3, 0xA4];

/// Firmware identity read from the manager module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Firmware {
    pub version: u16,
    pub revision: u16,
    pub board_id: u8,
}

impl Firmware {
    /// Decode the version and DIP switch registers.
    #[must_use]
    pub fn from_registers(version: u32, dip: u32) -> Self {
        let [version_high, version_low, revision_high, revision_low] = version.to_be_bytes();
        let [_, _, dip_high, _] = dip.to_be_bytes();
        Self {
            version: u16::from_be_bytes([version_high, version_low]),
            revision: u16::from_be_bytes([revision_high, revision_low]),
            board_id: dip_high & 0x0F,
        }
    }
}

/// Where one SW-16 slot answers: `(module, device type address, board id address)`.
#[must_use]
pub fn sw16_addresses(slot: u8) -> (Module, u16, u16) {
    let base = SW16_BASE + (u16::from(slot) << SW16_SHIFT);
    (Module::SwitchController, base, base + 1)
}

/// A detected SW-16 switch board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sw16Board {
    pub slot: u8,
    pub device_type: u8,
    pub board_id: u8,
}

impl Sw16Board {
    /// Interpret one slot's registers; `None` when nothing answers there.
    #[must_use]
    pub fn detect(slot: u8, device_type: u32, board_id: u32) -> Option<Self> {
        let device_type = u8::try_from(device_type).ok()?;
        if !SW16_DEVICE_TYPES.contains(&device_type) {
            return None;
        }
        Some(Self {
            slot,
            device_type,
            board_id: u8::try_from(board_id & 0xFF).unwrap_or_default(),
        })
    }
}

/// Everything the board reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardInfo {
    pub firmware: Firmware,
    pub sw16_boards: Vec<Sw16Board>,
}

impl fmt::Display for BoardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Firmware Version: {} Firmware Revision: {} Hardware Board ID: {}",
            self.firmware.version, self.firmware.revision, self.firmware.board_id
        )?;
        writeln!(f, "SW-16 boards found:")?;
        for board in &self.sw16_boards {
            writeln!(
                f,
                " - Board: {} Switches: {SW16_SWITCHES} Device Type: {:X} Board ID: {:X}",
                board.slot, board.device_type, board.board_id
            )?;
        }
        Ok(())
    }
}
