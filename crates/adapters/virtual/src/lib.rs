//! # rocwire-adapter-virtual
//!
//! A simulated control board for demos and end-to-end tests.
//!
//! [`VirtualBoard`] implements [`HardwareLink`]. It is a cheap, cloneable
//! handle: move one clone into the dispatcher and keep another to press
//! switches, tilt the cabinet, inject failures, and inspect what the host
//! sent.
//!
//! ## Simulated behaviour
//!
//! | Command | Effect |
//! |---------|--------|
//! | `WriteData` / `ReadData` | Register memory; manager version register is read-only |
//! | `SwitchGetStates` | Current contact vector |
//! | `SwitchUpdateRule` | Stores the slot; fired on matching switch edges |
//! | `Driver*` | Remembers the last command per driver |
//! | `LedColor` | Remembers the last value per LED channel |
//!
//! ## Dependency rule
//!
//! Depends on `rocwire-app` (port traits) and `rocwire-domain` only.

mod error;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rocwire_app::ports::{HardwareLink, LinkError};
use rocwire_domain::board_info;
use rocwire_domain::command::{Command, Module, Reply};
use rocwire_domain::driver::DriverStateRecord;
use rocwire_domain::event::{EventType, RawEvent};
use rocwire_domain::id::{DriverNumber, SwitchNumber};
use rocwire_domain::rule::{EdgeCategory, SwitchRuleUpdate};

pub use error::VirtualBoardError;
use state::BoardState;

/// Handle to a simulated board.
#[derive(Debug, Clone, Default)]
pub struct VirtualBoard {
    state: Arc<Mutex<BoardState>>,
}

impl VirtualBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a register value.
    #[must_use]
    pub fn with_register(self, module: Module, address: u16, value: u32) -> Self {
        self.lock().registers.insert((module, address), value);
        self
    }

    /// Seed the manager's firmware version and DIP registers.
    #[must_use]
    pub fn with_firmware(self, version: u16, revision: u16, board_id: u8) -> Self {
        let version = (u32::from(version) << 16) | u32::from(revision);
        let dip = u32::from(board_id & 0x0F) << 8;
        self.with_register(Module::Manager, board_info::VERSION_ADDRESS, version)
            .with_register(Module::Manager, board_info::DIP_ADDRESS, dip)
    }

    /// Plug an SW-16 switch board into `slot`.
    #[must_use]
    pub fn with_sw16(self, slot: u8, device_type: u8, board_id: u8) -> Self {
        let (module, type_address, id_address) = board_info::sw16_addresses(slot);
        self.with_register(module, type_address, u32::from(device_type))
            .with_register(module, id_address, u32::from(board_id))
    }

    /// Start with a switch contact closed, without queuing events.
    #[must_use]
    pub fn with_closed(self, switch: SwitchNumber) -> Self {
        {
            let mut state = self.lock();
            let index = usize::from(switch.get());
            if state.closed.len() <= index {
                state.closed.resize(index + 1, false);
            }
            state.closed[index] = true;
        }
        self
    }

    /// Close a switch contact.
    pub fn press(&self, switch: SwitchNumber) {
        self.lock().set_switch(switch, true);
    }

    /// Open a switch contact.
    pub fn release(&self, switch: SwitchNumber) {
        self.lock().set_switch(switch, false);
    }

    /// Queue one raw accelerometer sample per axis.
    pub fn tilt(&self, x: u32, y: u32, z: u32) {
        let mut state = self.lock();
        state.pending.extend([
            RawEvent::new(EventType::AccelerometerX, x),
            RawEvent::new(EventType::AccelerometerY, y),
            RawEvent::new(EventType::AccelerometerZ, z),
        ]);
    }

    /// Queue an arbitrary raw event.
    pub fn push_event(&self, event: RawEvent) {
        self.lock().pending.push_back(event);
    }

    /// Make the next executed command fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.lock().failures.push_back(message.into());
    }

    /// Every command executed so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<Command> {
        self.lock().log.clone()
    }

    /// Drain the command log.
    #[must_use]
    pub fn take_commands(&self) -> Vec<Command> {
        std::mem::take(&mut self.lock().log)
    }

    /// The installed contents of one rule slot.
    #[must_use]
    pub fn rule(&self, switch: SwitchNumber, category: EdgeCategory) -> Option<SwitchRuleUpdate> {
        self.lock().rules.get(&(switch, category)).cloned()
    }

    /// Records the board applied on its own when switch rules fired.
    #[must_use]
    pub fn fired(&self) -> Vec<DriverStateRecord> {
        self.lock().fired.clone()
    }

    /// The last direct command sent to a driver.
    #[must_use]
    pub fn driver_command(&self, driver: DriverNumber) -> Option<Command> {
        self.lock().drivers.get(&driver).cloned()
    }

    /// The last value written to an LED channel.
    #[must_use]
    pub fn led(&self, board: u8, index: u8) -> Option<u8> {
        self.lock().leds.get(&(board, index)).copied()
    }

    /// Current value of a register.
    #[must_use]
    pub fn register(&self, module: Module, address: u16) -> u32 {
        self.lock()
            .registers
            .get(&(module, address))
            .copied()
            .unwrap_or(0)
    }

    /// Absolute positions of every stepper move started so far.
    #[must_use]
    pub fn stepper_moves(&self) -> Vec<u16> {
        self.lock().moves.clone()
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HardwareLink for VirtualBoard {
    fn execute(&mut self, command: &Command) -> Result<Reply, LinkError> {
        tracing::trace!(command = command.name(), "virtual board");
        Ok(self.lock().execute(command)?)
    }

    fn poll_events(&mut self) -> Result<Vec<RawEvent>, LinkError> {
        Ok(self.lock().pending.drain(..).collect())
    }
}
