//! Automation rules — "when switch X transitions, act on driver Y".
//!
//! A rule is executed by the board itself, without a host round-trip. On
//! the wire a switch carries four independent record lists, one per
//! [`EdgeCategory`]; [`AutomationRule::expand`] turns one logical rule into
//! its contributions to those lists.

use serde::{Deserialize, Serialize};

use crate::driver::{DriverAction, DriverConfig, DriverStateRecord, encode};
use crate::error::{CapabilityViolation, ValidationError};
use crate::id::{DriverNumber, SwitchNumber};
use crate::switch::SwitchConfig;

/// Physical switch transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Open,
    Closed,
}

impl Edge {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Open => Self::Closed,
            Self::Closed => Self::Open,
        }
    }
}

/// One of the four per-switch rule slots on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCategory {
    OpenNondebounced,
    ClosedNondebounced,
    OpenDebounced,
    ClosedDebounced,
}

impl EdgeCategory {
    /// Every category, in the order updates are issued.
    pub const ALL: [Self; 4] = [
        Self::OpenNondebounced,
        Self::ClosedNondebounced,
        Self::OpenDebounced,
        Self::ClosedDebounced,
    ];

    #[must_use]
    pub const fn new(edge: Edge, debounced: bool) -> Self {
        match (edge, debounced) {
            (Edge::Open, false) => Self::OpenNondebounced,
            (Edge::Closed, false) => Self::ClosedNondebounced,
            (Edge::Open, true) => Self::OpenDebounced,
            (Edge::Closed, true) => Self::ClosedDebounced,
        }
    }

    #[must_use]
    pub const fn is_nondebounced(self) -> bool {
        matches!(self, Self::OpenNondebounced | Self::ClosedNondebounced)
    }

    /// The board's name for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenNondebounced => "open_nondebounced",
            Self::ClosedNondebounced => "closed_nondebounced",
            Self::OpenDebounced => "open_debounced",
            Self::ClosedDebounced => "closed_debounced",
        }
    }
}

impl std::fmt::Display for EdgeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the board does to the driver when the rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Pulse on the trigger edge (autofire, slingshot, pop bumper).
    Pulse,
    /// Pulse on the trigger edge, disable on the opposite edge.
    PulseAndRelease,
    /// Pulse then hold on the trigger edge; nothing on release.
    PulseAndHold,
    /// Pulse then hold on the trigger edge, disable on the opposite edge
    /// (single-wound flipper).
    PulseAndEnableAndRelease,
    /// Disable on the trigger edge (end-of-stroke cutoff).
    Disable,
}

impl RuleAction {
    /// Whether the action keeps the driver energised past the pulse.
    #[must_use]
    pub const fn is_sustained(self) -> bool {
        matches!(self, Self::PulseAndHold | Self::PulseAndEnableAndRelease)
    }
}

/// Identifies an installed rule: one driver on one switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleHandle {
    pub switch: SwitchNumber,
    pub driver: DriverNumber,
}

/// A logical automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub switch: SwitchNumber,
    pub edge: Edge,
    pub debounce: bool,
    pub driver: DriverNumber,
    pub action: RuleAction,
    pub duration_ms: u8,
    pub power: f32,
    pub recycle: bool,
}

impl AutomationRule {
    /// A full-power, debounced rule firing on the closed edge.
    #[must_use]
    pub fn new(switch: SwitchNumber, driver: DriverNumber, action: RuleAction) -> Self {
        Self {
            switch,
            edge: Edge::Closed,
            debounce: true,
            driver,
            action,
            duration_ms: 10,
            power: 1.0,
            recycle: false,
        }
    }

    #[must_use]
    pub fn edge(mut self, edge: Edge) -> Self {
        self.edge = edge;
        self
    }

    #[must_use]
    pub fn debounce(mut self, debounce: bool) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn duration_ms(mut self, duration_ms: u8) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    #[must_use]
    pub fn power(mut self, power: f32) -> Self {
        self.power = power;
        self
    }

    #[must_use]
    pub fn recycle(mut self, recycle: bool) -> Self {
        self.recycle = recycle;
        self
    }

    #[must_use]
    pub fn handle(&self) -> RuleHandle {
        RuleHandle {
            switch: self.switch,
            driver: self.driver,
        }
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PowerOutOfRange`] when `power` is not
    /// within `0.0..=1.0`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.power) {
            return Err(ValidationError::PowerOutOfRange(self.power));
        }
        Ok(())
    }

    /// The category the trigger edge lands in, accounting for inverted wiring.
    #[must_use]
    pub fn trigger_category(&self, switch: &SwitchConfig) -> EdgeCategory {
        EdgeCategory::new(self.physical_edge(self.edge, switch), self.debounce)
    }

    fn physical_edge(&self, edge: Edge, switch: &SwitchConfig) -> Edge {
        if switch.invert { edge.opposite() } else { edge }
    }

    /// Expand the rule into `(category, record)` contributions.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityViolation`] for sustained actions on a driver
    /// without `allow_enable`.
    pub fn expand(
        &self,
        switch: &SwitchConfig,
        driver: &DriverConfig,
    ) -> Result<Vec<(EdgeCategory, DriverStateRecord)>, CapabilityViolation> {
        let on = self.trigger_category(switch);
        let release = EdgeCategory::new(
            self.physical_edge(self.edge.opposite(), switch),
            self.debounce,
        );
        let disable = DriverStateRecord::disabled(driver);

        let pulse = || {
            encode(
                driver,
                DriverAction::Pulse,
                self.duration_ms,
                self.power,
                self.recycle,
            )
        };
        let hold = || {
            encode(
                driver,
                DriverAction::Hold,
                self.duration_ms,
                driver.hold_power,
                self.recycle,
            )
        };

        Ok(match self.action {
            RuleAction::Pulse => vec![(on, pulse()?)],
            RuleAction::PulseAndRelease => vec![(on, pulse()?), (release, disable)],
            RuleAction::PulseAndHold => vec![(on, hold()?)],
            RuleAction::PulseAndEnableAndRelease => vec![(on, hold()?), (release, disable)],
            RuleAction::Disable => vec![(on, disable)],
        })
    }
}

/// Policy flags attached to every rule-slot update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFlags {
    /// The edge also produces a host-visible switch event.
    pub notify_host: bool,
    /// The driver re-arms when retriggered while still active.
    pub reload_active: bool,
}

/// One "switch update rule" command: the full record list for one slot.
///
/// An empty `drivers` list clears the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRuleUpdate {
    pub switch: SwitchNumber,
    pub category: EdgeCategory,
    pub flags: RuleFlags,
    pub drivers: Vec<DriverStateRecord>,
    /// Apply the records immediately if the switch is already in that state.
    pub drive_outputs_now: bool,
}
