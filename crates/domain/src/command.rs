//! The board's command vocabulary.
//!
//! Everything the host asks of the board is one [`Command`]; the worker that
//! owns the hardware link executes them in submission order and answers
//! with a [`Reply`].

use serde::{Deserialize, Serialize};

use crate::id::DriverNumber;
use crate::rule::SwitchRuleUpdate;

/// Addressable register modules on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Manager,
    SwitchController,
    MotionController,
    Accelerometer,
    I2c,
}

impl Module {
    /// Numeric module select used on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Manager => 0x00,
            Self::SwitchController => 0x02,
            Self::MotionController => 0x03,
            Self::Accelerometer => 0x06,
            Self::I2c => 0x07,
        }
    }
}

/// A single `(module, address) <- value` register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterWrite {
    pub module: Module,
    pub address: u16,
    pub value: u32,
}

impl RegisterWrite {
    #[must_use]
    pub const fn new(module: Module, address: u16, value: u32) -> Self {
        Self {
            module,
            address,
            value,
        }
    }
}

impl From<RegisterWrite> for Command {
    fn from(write: RegisterWrite) -> Self {
        Self::WriteData {
            module: write.module,
            address: write.address,
            value: write.value,
        }
    }
}

/// One command for the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
    /// Full-power pulse.
    DriverPulse {
        driver: DriverNumber,
        milliseconds: u8,
    },
    /// Pulse at full power, then patter until disabled.
    DriverPulsedPatter {
        driver: DriverNumber,
        on_ms: u8,
        off_ms: u8,
        duration_ms: u8,
        now: bool,
    },
    /// Drive according to a 32-slot schedule; `cycle_seconds == 0` runs forever.
    DriverSchedule {
        driver: DriverNumber,
        schedule: u32,
        cycle_seconds: u8,
        now: bool,
    },
    /// Patter indefinitely after an optional full-power `original_on_ms`.
    DriverPatter {
        driver: DriverNumber,
        on_ms: u8,
        off_ms: u8,
        original_on_ms: u8,
        now: bool,
    },
    DriverDisable {
        driver: DriverNumber,
    },
    /// Replace the record list of one switch rule slot.
    SwitchUpdateRule(SwitchRuleUpdate),
    WriteData {
        module: Module,
        address: u16,
        value: u32,
    },
    ReadData {
        module: Module,
        address: u16,
    },
    /// Raw closed/open status of every switch, indexed by number.
    SwitchGetStates,
    LedColor {
        board: u8,
        index: u8,
        value: u8,
    },
    /// Barrier: answered by the worker once every earlier command ran.
    Sync(u32),
}

impl Command {
    /// Short command name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DriverPulse { .. } => "driver_pulse",
            Self::DriverPulsedPatter { .. } => "driver_pulsed_patter",
            Self::DriverSchedule { .. } => "driver_schedule",
            Self::DriverPatter { .. } => "driver_patter",
            Self::DriverDisable { .. } => "driver_disable",
            Self::SwitchUpdateRule(_) => "switch_update_rule",
            Self::WriteData { .. } => "write_data",
            Self::ReadData { .. } => "read_data",
            Self::SwitchGetStates => "switch_get_states",
            Self::LedColor { .. } => "led_color",
            Self::Sync(_) => "sync",
        }
    }
}

/// Result of an executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Done,
    Data(u32),
    SwitchStates(Vec<bool>),
    Sync(u32),
}

impl Reply {
    /// Short reply name for error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Data(_) => "data",
            Self::SwitchStates(_) => "switch_states",
            Self::Sync(_) => "sync",
        }
    }
}
