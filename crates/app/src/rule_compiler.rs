//! Switch rule compiler — turns installed automation rules into board
//! rule-slot updates.
//!
//! The [`RuleBook`] keeps, per switch, an ordered record list for each of
//! the four [`EdgeCategory`] slots. Every install or clear rewrites the
//! affected switch's lists and then re-emits all four slots from scratch, so
//! the board always receives the complete current state (an empty list
//! clears a slot).

use std::collections::BTreeMap;

use rocwire_domain::driver::{DriverConfig, DriverStateRecord};
use rocwire_domain::error::BoardError;
use rocwire_domain::id::{DriverNumber, SwitchNumber};
use rocwire_domain::rule::{AutomationRule, EdgeCategory, RuleFlags, RuleHandle, SwitchRuleUpdate};
use rocwire_domain::switch::SwitchConfig;

#[derive(Debug, Clone)]
struct Entry {
    driver: DriverNumber,
    record: DriverStateRecord,
    recycle: bool,
}

type Slots = BTreeMap<EdgeCategory, Vec<Entry>>;

/// Installed rules, grouped by switch and edge category.
#[derive(Debug, Default)]
pub struct RuleBook {
    switches: BTreeMap<SwitchNumber, Slots>,
}

impl RuleBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `rule`, superseding any earlier rule for the same
    /// (switch, driver) pair.
    ///
    /// Returns the four slot updates to send, in [`EdgeCategory::ALL`] order.
    ///
    /// # Errors
    ///
    /// - [`BoardError::Validation`] if the rule's power is out of range.
    /// - [`BoardError::Capability`] for a sustained action on a driver
    ///   without `allow_enable`.
    ///
    /// On error the book is left unchanged.
    pub fn install(
        &mut self,
        rule: &AutomationRule,
        switch: &SwitchConfig,
        driver: &DriverConfig,
    ) -> Result<Vec<SwitchRuleUpdate>, BoardError> {
        rule.validate()?;
        let contributions = rule.expand(switch, driver)?;

        let slots = self.switches.entry(rule.switch).or_default();
        remove_driver(slots, rule.driver);
        for (category, record) in contributions {
            slots.entry(category).or_default().push(Entry {
                driver: rule.driver,
                record,
                recycle: rule.recycle,
            });
        }
        tracing::debug!(switch = %rule.switch, driver = %rule.driver, action = ?rule.action, "rule installed");

        Ok(updates(switch, slots, rule.recycle))
    }

    /// Remove the rule identified by `handle`.
    ///
    /// Returns the four slot updates to send, or `None` when no such rule is
    /// installed. The updates carry the cleared rule's recycle setting.
    pub fn clear(&mut self, handle: RuleHandle, switch: &SwitchConfig) -> Option<Vec<SwitchRuleUpdate>> {
        let slots = self.switches.get_mut(&handle.switch)?;
        let recycle = remove_driver(slots, handle.driver)?;
        let emitted = updates(switch, slots, recycle);
        if slots.is_empty() {
            self.switches.remove(&handle.switch);
        }
        tracing::debug!(switch = %handle.switch, driver = %handle.driver, "rule cleared");
        Some(emitted)
    }

    /// Whether a rule is installed for `handle`.
    #[must_use]
    pub fn contains(&self, handle: RuleHandle) -> bool {
        self.switches.get(&handle.switch).is_some_and(|slots| {
            slots
                .values()
                .flatten()
                .any(|entry| entry.driver == handle.driver)
        })
    }
}

/// Drop every entry for `driver`, returning its recycle setting if any
/// entry was removed.
fn remove_driver(slots: &mut Slots, driver: DriverNumber) -> Option<bool> {
    let mut removed = None;
    for entries in slots.values_mut() {
        entries.retain(|entry| {
            if entry.driver == driver {
                removed = Some(entry.recycle);
                false
            } else {
                true
            }
        });
    }
    slots.retain(|_, entries| !entries.is_empty());
    removed
}

fn updates(switch: &SwitchConfig, slots: &Slots, reload_active: bool) -> Vec<SwitchRuleUpdate> {
    EdgeCategory::ALL
        .into_iter()
        .map(|category| SwitchRuleUpdate {
            switch: switch.number,
            category,
            flags: RuleFlags {
                notify_host: switch.notify_on_nondebounce == category.is_nondebounced(),
                reload_active,
            },
            drivers: slots
                .get(&category)
                .map(|entries| entries.iter().map(|entry| entry.record).collect())
                .unwrap_or_default(),
            drive_outputs_now: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rocwire_domain::rule::{Edge, RuleAction};

    use super::*;

    const S_TEST: SwitchNumber = SwitchNumber::new(23);
    const S_FLIPPER: SwitchNumber = SwitchNumber::new(1);
    const S_EOS: SwitchNumber = SwitchNumber::new(2);
    const C_TEST: DriverNumber = DriverNumber::new(8);
    const C_OTHER: DriverNumber = DriverNumber::new(9);
    const C_MAIN: DriverNumber = DriverNumber::new(10);
    const C_HOLD: DriverNumber = DriverNumber::new(11);

    fn switch(number: SwitchNumber) -> SwitchConfig {
        SwitchConfig::new(number)
    }

    fn coil(number: DriverNumber) -> DriverConfig {
        DriverConfig::new(number)
    }

    fn slot(updates: &[SwitchRuleUpdate], category: EdgeCategory) -> &SwitchRuleUpdate {
        updates.iter().find(|u| u.category == category).unwrap()
    }

    fn drivers(update: &SwitchRuleUpdate) -> Vec<u16> {
        update.drivers.iter().map(|r| r.driver_num.get()).collect()
    }

    #[test]
    fn should_issue_all_four_categories_when_installing() {
        let mut book = RuleBook::new();
        let rule = AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse).duration_ms(23);
        let updates = book.install(&rule, &switch(S_TEST), &coil(C_TEST)).unwrap();

        let categories: Vec<_> = updates.iter().map(|u| u.category).collect();
        assert_eq!(categories, EdgeCategory::ALL);
        assert_eq!(drivers(slot(&updates, EdgeCategory::ClosedDebounced)), [8]);
        assert!(slot(&updates, EdgeCategory::OpenDebounced).drivers.is_empty());
        assert!(slot(&updates, EdgeCategory::OpenNondebounced).drivers.is_empty());
        assert!(updates.iter().all(|u| !u.drive_outputs_now));
    }

    #[test]
    fn should_notify_host_only_on_debounced_categories_by_default() {
        let mut book = RuleBook::new();
        let rule = AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse);
        let updates = book.install(&rule, &switch(S_TEST), &coil(C_TEST)).unwrap();
        for update in &updates {
            assert_eq!(update.flags.notify_host, !update.category.is_nondebounced());
        }
    }

    #[test]
    fn should_notify_host_on_nondebounced_categories_when_switch_asks() {
        let mut book = RuleBook::new();
        let config = switch(S_TEST).notify_on_nondebounce(true);
        let rule = AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse);
        let updates = book.install(&rule, &config, &coil(C_TEST)).unwrap();
        assert!(slot(&updates, EdgeCategory::ClosedNondebounced).flags.notify_host);
        assert!(!slot(&updates, EdgeCategory::ClosedDebounced).flags.notify_host);
    }

    #[test]
    fn should_carry_recycle_as_reload_active() {
        let mut book = RuleBook::new();
        let rule = AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse).recycle(true);
        let updates = book.install(&rule, &switch(S_TEST), &coil(C_TEST)).unwrap();
        assert!(updates.iter().all(|u| u.flags.reload_active));
        assert!(!slot(&updates, EdgeCategory::ClosedDebounced).drivers[0].wait_for_first_time_slot);
    }

    #[test]
    fn should_carry_cleared_rule_recycle_as_reload_active() {
        let mut book = RuleBook::new();
        let config = switch(SwitchNumber::new(40));
        let rule = AutomationRule::new(config.number, C_TEST, RuleAction::Pulse).recycle(true);
        book.install(&rule, &config, &coil(C_TEST)).unwrap();

        let cleared = book.clear(rule.handle(), &config).unwrap();
        assert_eq!(cleared.len(), 4);
        assert!(cleared.iter().all(|u| u.flags.reload_active));
        assert!(cleared.iter().all(|u| u.drivers.is_empty()));
    }

    #[test]
    fn should_reject_endless_pulse_rule_without_capability() {
        let mut book = RuleBook::new();
        let rule = AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse).duration_ms(0);
        let err = book.install(&rule, &switch(S_TEST), &coil(C_TEST)).unwrap_err();
        assert!(matches!(err, BoardError::Capability(_)));
        assert!(!book.contains(rule.handle()));
    }

    #[test]
    fn should_return_to_empty_state_when_install_then_clear() {
        let mut book = RuleBook::new();
        let config = switch(S_TEST);
        let rule = AutomationRule::new(S_TEST, C_TEST, RuleAction::PulseAndRelease);
        book.install(&rule, &config, &coil(C_TEST)).unwrap();

        let cleared = book.clear(rule.handle(), &config).unwrap();
        assert_eq!(cleared, updates(&config, &Slots::new(), false));
        assert!(cleared.iter().all(|u| u.drivers.is_empty()));
        assert!(!book.contains(rule.handle()));
    }

    #[test]
    fn should_reissue_identical_commands_when_reinstalling_same_rule() {
        let mut book = RuleBook::new();
        let rule = AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse).duration_ms(23);
        let first = book.install(&rule, &switch(S_TEST), &coil(C_TEST)).unwrap();
        let second = book.install(&rule, &switch(S_TEST), &coil(C_TEST)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn should_merge_drivers_on_same_edge_in_install_order() {
        let mut book = RuleBook::new();
        let config = switch(S_TEST);
        book.install(
            &AutomationRule::new(S_TEST, C_OTHER, RuleAction::Pulse),
            &config,
            &coil(C_OTHER),
        )
        .unwrap();
        let updates = book
            .install(
                &AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse),
                &config,
                &coil(C_TEST),
            )
            .unwrap();
        assert_eq!(drivers(slot(&updates, EdgeCategory::ClosedDebounced)), [9, 8]);
    }

    #[test]
    fn should_supersede_and_move_to_end_when_same_pair_is_reinstalled() {
        let mut book = RuleBook::new();
        let config = switch(S_TEST);
        book.install(
            &AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse),
            &config,
            &coil(C_TEST),
        )
        .unwrap();
        book.install(
            &AutomationRule::new(S_TEST, C_OTHER, RuleAction::Pulse),
            &config,
            &coil(C_OTHER),
        )
        .unwrap();
        let updates = book
            .install(
                &AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse).duration_ms(40),
                &config,
                &coil(C_TEST),
            )
            .unwrap();

        let closed = slot(&updates, EdgeCategory::ClosedDebounced);
        assert_eq!(drivers(closed), [9, 8]);
        assert_eq!(closed.drivers[1].output_drive_time, 40);
    }

    #[test]
    fn should_drop_old_edges_when_pair_moves_to_other_edge() {
        let mut book = RuleBook::new();
        let config = switch(S_TEST);
        book.install(
            &AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse),
            &config,
            &coil(C_TEST),
        )
        .unwrap();
        let updates = book
            .install(
                &AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse).edge(Edge::Open),
                &config,
                &coil(C_TEST),
            )
            .unwrap();
        assert!(slot(&updates, EdgeCategory::ClosedDebounced).drivers.is_empty());
        assert_eq!(drivers(slot(&updates, EdgeCategory::OpenDebounced)), [8]);
    }

    #[test]
    fn should_keep_other_drivers_when_clearing_one() {
        let mut book = RuleBook::new();
        let config = switch(S_TEST);
        let first = AutomationRule::new(S_TEST, C_TEST, RuleAction::Pulse);
        book.install(&first, &config, &coil(C_TEST)).unwrap();
        book.install(
            &AutomationRule::new(S_TEST, C_OTHER, RuleAction::Pulse),
            &config,
            &coil(C_OTHER),
        )
        .unwrap();

        let updates = book.clear(first.handle(), &config).unwrap();
        assert_eq!(drivers(slot(&updates, EdgeCategory::ClosedDebounced)), [9]);
    }

    #[test]
    fn should_ignore_clear_of_stale_handle() {
        let mut book = RuleBook::new();
        let handle = RuleHandle {
            switch: S_TEST,
            driver: C_TEST,
        };
        assert!(book.clear(handle, &switch(S_TEST)).is_none());
    }

    #[test]
    fn should_leave_book_untouched_on_capability_violation() {
        let mut book = RuleBook::new();
        let rule = AutomationRule::new(S_TEST, C_TEST, RuleAction::PulseAndHold);
        let err = book
            .install(&rule, &switch(S_TEST), &coil(C_TEST))
            .unwrap_err();
        assert!(matches!(err, BoardError::Capability(_)));
        assert!(!book.contains(rule.handle()));
    }

    #[test]
    fn should_compile_two_coil_flipper_with_end_of_stroke() {
        let mut book = RuleBook::new();
        let flipper = switch(S_FLIPPER);
        let eos = switch(S_EOS);
        let main = coil(C_MAIN);
        let hold = coil(C_HOLD).allow_enable(true);

        book.install(
            &AutomationRule::new(S_FLIPPER, C_MAIN, RuleAction::PulseAndRelease)
                .debounce(false)
                .duration_ms(10),
            &flipper,
            &main,
        )
        .unwrap();
        let on_flipper = book
            .install(
                &AutomationRule::new(S_FLIPPER, C_HOLD, RuleAction::PulseAndEnableAndRelease)
                    .debounce(false),
                &flipper,
                &hold,
            )
            .unwrap();
        let on_eos = book
            .install(
                &AutomationRule::new(S_EOS, C_MAIN, RuleAction::Disable).debounce(false),
                &eos,
                &main,
            )
            .unwrap();

        assert_eq!(drivers(slot(&on_flipper, EdgeCategory::ClosedNondebounced)), [10, 11]);
        assert_eq!(drivers(slot(&on_flipper, EdgeCategory::OpenNondebounced)), [10, 11]);
        let cutoff = slot(&on_eos, EdgeCategory::ClosedNondebounced);
        assert_eq!(cutoff.drivers, [DriverStateRecord::disabled(&main)]);
        assert!(!cutoff.flags.notify_host);
    }
}
