//! Simulated board internals.
//!
//! Holds what a real board would: register memory, switch contacts, the
//! installed rule slots, and the event FIFO. Switch edges run the matching
//! rule slots board-side, without a host round-trip.

use std::collections::{BTreeMap, HashMap, VecDeque};

use rocwire_domain::board_info;
use rocwire_domain::command::{Command, Module, Reply};
use rocwire_domain::driver::DriverStateRecord;
use rocwire_domain::event::{EventType, RawEvent};
use rocwire_domain::id::{DriverNumber, SwitchNumber};
use rocwire_domain::rule::{Edge, EdgeCategory, SwitchRuleUpdate};

use crate::error::VirtualBoardError;

const MOTION_REG_LOW: u32 = 0x00;
const MOTION_REG_HIGH: u32 = 0x06;
const MOTION_REG_START: u32 = 0x07;

#[derive(Debug, Default)]
pub(crate) struct BoardState {
    pub(crate) registers: HashMap<(Module, u16), u32>,
    pub(crate) closed: Vec<bool>,
    pub(crate) rules: HashMap<(SwitchNumber, EdgeCategory), SwitchRuleUpdate>,
    pub(crate) drivers: BTreeMap<DriverNumber, Command>,
    pub(crate) fired: Vec<DriverStateRecord>,
    pub(crate) leds: HashMap<(u8, u8), u8>,
    pub(crate) pending: VecDeque<RawEvent>,
    pub(crate) log: Vec<Command>,
    pub(crate) failures: VecDeque<String>,
    pub(crate) moves: Vec<u16>,
    motion_latch: [u8; 2],
}

impl BoardState {
    pub(crate) fn execute(&mut self, command: &Command) -> Result<Reply, VirtualBoardError> {
        self.log.push(command.clone());
        if let Some(message) = self.failures.pop_front() {
            return Err(VirtualBoardError::Injected(message));
        }

        let reply = match command {
            Command::WriteData {
                module,
                address,
                value,
            } => {
                if *module == Module::Manager && *address == board_info::VERSION_ADDRESS {
                    return Err(VirtualBoardError::ReadOnly {
                        module: *module,
                        address: *address,
                    });
                }
                if *module == Module::MotionController {
                    self.latch_motion(*value);
                }
                self.registers.insert((*module, *address), *value);
                Reply::Done
            }
            Command::ReadData { module, address } => Reply::Data(
                self.registers
                    .get(&(*module, *address))
                    .copied()
                    .unwrap_or(0),
            ),
            Command::SwitchGetStates => Reply::SwitchStates(self.closed.clone()),
            Command::SwitchUpdateRule(update) => {
                let key = (update.switch, update.category);
                if update.drivers.is_empty() {
                    self.rules.remove(&key);
                } else {
                    self.rules.insert(key, update.clone());
                }
                Reply::Done
            }
            Command::DriverPulse { driver, .. }
            | Command::DriverPulsedPatter { driver, .. }
            | Command::DriverSchedule { driver, .. }
            | Command::DriverPatter { driver, .. }
            | Command::DriverDisable { driver } => {
                self.drivers.insert(*driver, command.clone());
                Reply::Done
            }
            Command::LedColor {
                board,
                index,
                value,
            } => {
                self.leds.insert((*board, *index), *value);
                Reply::Done
            }
            Command::Sync(token) => Reply::Sync(*token),
        };
        Ok(reply)
    }

    /// Change a switch contact, queue its events, and run its rule slots.
    pub(crate) fn set_switch(&mut self, switch: SwitchNumber, closed: bool) {
        let index = usize::from(switch.get());
        if self.closed.len() <= index {
            self.closed.resize(index + 1, false);
        }
        if self.closed[index] == closed {
            return;
        }
        self.closed[index] = closed;

        let (debounced, raw, edge) = if closed {
            (
                EventType::SwitchClosedDebounced,
                EventType::SwitchClosedNondebounced,
                Edge::Closed,
            )
        } else {
            (
                EventType::SwitchOpenDebounced,
                EventType::SwitchOpenNondebounced,
                Edge::Open,
            )
        };
        let number = u32::from(switch.get());
        self.pending.push_back(RawEvent::new(raw, number));
        self.pending.push_back(RawEvent::new(debounced, number));

        for category in [EdgeCategory::new(edge, false), EdgeCategory::new(edge, true)] {
            if let Some(update) = self.rules.get(&(switch, category)) {
                self.fired.extend(update.drivers.iter().copied());
            }
        }
    }

    fn latch_motion(&mut self, value: u32) {
        let register = (value >> 8) & 0xFF;
        let [byte, ..] = value.to_le_bytes();
        match register {
            MOTION_REG_LOW => self.motion_latch[0] = byte,
            MOTION_REG_HIGH => self.motion_latch[1] = byte,
            MOTION_REG_START => self.moves.push(u16::from_le_bytes(self.motion_latch)),
            _ => {}
        }
    }
}
