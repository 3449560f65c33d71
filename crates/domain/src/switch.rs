//! Switch inputs and the debounce classifier.
//!
//! Each switch is a two-state machine (inactive/active) fed by raw board
//! events. A switch only listens to the event flavour matching its
//! [`DebouncePolicy`]; repeated same-polarity events are no-ops, and
//! anything the table does not recognise is dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{BoardEventKind, EventType, RawEvent};
use crate::id::SwitchNumber;

/// First switch number the board never debounces.
pub const NEVER_DEBOUNCE_FIRST: u16 = 192;
/// Last switch number the board never debounces.
pub const NEVER_DEBOUNCE_LAST: u16 = 255;

/// Which event flavour a switch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebouncePolicy {
    /// Only debounced open/closed events change the switch.
    Debounced,
    /// Only raw (non-debounced) events change the switch.
    NeverDebounce,
}

impl DebouncePolicy {
    /// The board's default policy for a switch number.
    #[must_use]
    pub fn for_number(number: SwitchNumber) -> Self {
        if (NEVER_DEBOUNCE_FIRST..=NEVER_DEBOUNCE_LAST).contains(&number.get()) {
            Self::NeverDebounce
        } else {
            Self::Debounced
        }
    }
}

/// Static description of a switch, created at board-mapping time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub number: SwitchNumber,
    /// Overrides the number-range default when set.
    #[serde(default)]
    pub debounce: Option<DebouncePolicy>,
    /// Normally-closed wiring: a closed contact means "inactive".
    #[serde(default)]
    pub invert: bool,
    /// Forward non-debounced edges to the host instead of debounced ones.
    #[serde(default)]
    pub notify_on_nondebounce: bool,
}

impl SwitchConfig {
    #[must_use]
    pub fn new(number: SwitchNumber) -> Self {
        Self {
            number,
            debounce: None,
            invert: false,
            notify_on_nondebounce: false,
        }
    }

    #[must_use]
    pub fn debounce(mut self, policy: DebouncePolicy) -> Self {
        self.debounce = Some(policy);
        self
    }

    #[must_use]
    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    #[must_use]
    pub fn notify_on_nondebounce(mut self, notify: bool) -> Self {
        self.notify_on_nondebounce = notify;
        self
    }

    /// The effective debounce policy.
    #[must_use]
    pub fn policy(&self) -> DebouncePolicy {
        self.debounce
            .unwrap_or_else(|| DebouncePolicy::for_number(self.number))
    }
}

/// A logical transition produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchChange {
    pub switch: SwitchNumber,
    pub active: bool,
}

impl From<SwitchChange> for BoardEventKind {
    fn from(change: SwitchChange) -> Self {
        Self::SwitchChanged {
            switch: change.switch,
            active: change.active,
        }
    }
}

#[derive(Debug, Clone)]
struct SwitchEntry {
    config: SwitchConfig,
    active: bool,
}

/// Per-switch state machines keyed by board number.
#[derive(Debug, Clone, Default)]
pub struct SwitchTable {
    switches: BTreeMap<SwitchNumber, SwitchEntry>,
}

impl SwitchTable {
    /// Build a table with every switch inactive until [`attach`](Self::attach).
    #[must_use]
    pub fn new(configs: impl IntoIterator<Item = SwitchConfig>) -> Self {
        let switches = configs
            .into_iter()
            .map(|config| {
                (
                    config.number,
                    SwitchEntry {
                        config,
                        active: false,
                    },
                )
            })
            .collect();
        Self { switches }
    }

    /// Seed logical states from the board's raw closed/open status vector,
    /// indexed by switch number. Switches beyond the vector are left open.
    pub fn attach(&mut self, raw_closed: &[bool]) {
        for (number, entry) in &mut self.switches {
            let closed = raw_closed
                .get(usize::from(number.get()))
                .copied()
                .unwrap_or(false);
            entry.active = closed != entry.config.invert;
        }
    }

    /// Feed one raw event. Returns the transition it caused, if any.
    ///
    /// Non-switch codes, unknown codes, unmapped switch numbers, events of
    /// the wrong debounce flavour, and same-state repeats all return `None`.
    pub fn classify(&mut self, event: RawEvent) -> Option<SwitchChange> {
        let (closed, flavour) = match event.event_type()? {
            EventType::SwitchClosedDebounced => (true, DebouncePolicy::Debounced),
            EventType::SwitchOpenDebounced => (false, DebouncePolicy::Debounced),
            EventType::SwitchClosedNondebounced => (true, DebouncePolicy::NeverDebounce),
            EventType::SwitchOpenNondebounced => (false, DebouncePolicy::NeverDebounce),
            _ => return None,
        };
        let number = SwitchNumber::new(u16::try_from(event.value).ok()?);
        let entry = self.switches.get_mut(&number)?;
        if entry.config.policy() != flavour {
            return None;
        }

        let active = closed != entry.config.invert;
        if entry.active == active {
            return None;
        }
        entry.active = active;
        Some(SwitchChange {
            switch: number,
            active,
        })
    }

    /// Logical state of a switch; `None` if it is not mapped.
    #[must_use]
    pub fn is_active(&self, switch: SwitchNumber) -> Option<bool> {
        self.switches.get(&switch).map(|entry| entry.active)
    }

    /// Configuration of a mapped switch.
    #[must_use]
    pub fn config(&self, switch: SwitchNumber) -> Option<&SwitchConfig> {
        self.switches.get(&switch).map(|entry| &entry.config)
    }
}
