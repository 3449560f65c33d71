//! Platform service — the public surface of the driver core.
//!
//! The platform owns all control-loop state (switch table, driver table,
//! installed rules, stepper sequencer) and talks to the board only through
//! the [`Dispatcher`]. Fire-and-forget operations are plain methods;
//! operations that need a board round-trip are `async` and await the
//! dispatcher without blocking the loop.

use std::collections::BTreeMap;
use std::time::Instant;

use rocwire_domain::accelerometer::{self, AccelerometerDecoder};
use rocwire_domain::board_info::{self, BoardInfo, Firmware, Sw16Board};
use rocwire_domain::command::{Command, Module, RegisterWrite, Reply};
use rocwire_domain::driver::{DriverConfig, DriverStateRecord};
use rocwire_domain::error::{BoardError, DispatchError, NotFoundError, ValidationError};
use rocwire_domain::event::{BoardEvent, BoardEventKind, RawEvent};
use rocwire_domain::id::{AxisNumber, DriverNumber, SwitchNumber};
use rocwire_domain::output::{self, DirectDrive};
use rocwire_domain::rule::{AutomationRule, RuleHandle};
use rocwire_domain::servo::{self, ServoConfig};
use rocwire_domain::stepper::{StepperConfig, StepperSequencer};
use rocwire_domain::switch::{SwitchConfig, SwitchTable};

use crate::dispatcher::Dispatcher;
use crate::ports::EventPublisher;
use crate::rule_compiler::RuleBook;

/// Every hardware object the platform manages.
#[derive(Debug, Clone, Default)]
pub struct BoardMap {
    pub switches: Vec<SwitchConfig>,
    pub drivers: Vec<DriverConfig>,
    pub servos: Vec<ServoConfig>,
    pub steppers: Vec<StepperConfig>,
}

#[derive(Debug)]
struct DriverSlot {
    config: DriverConfig,
    state: DriverStateRecord,
}

/// The driver core, bound to one board.
pub struct Platform<P> {
    dispatcher: Dispatcher,
    publisher: P,
    switches: SwitchTable,
    drivers: BTreeMap<DriverNumber, DriverSlot>,
    servos: BTreeMap<u8, ServoConfig>,
    steppers: StepperSequencer,
    motion_due: BTreeMap<AxisNumber, Instant>,
    rules: RuleBook,
    accelerometer: AccelerometerDecoder,
    sync_token: u32,
}

impl<P: EventPublisher> Platform<P> {
    /// Bind a platform to a running dispatcher.
    ///
    /// Every switch starts inactive and every driver disabled until
    /// [`attach`](Self::attach) runs.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for an invalid driver or servo
    /// definition.
    pub fn new(dispatcher: Dispatcher, publisher: P, map: BoardMap) -> Result<Self, BoardError> {
        for driver in &map.drivers {
            driver.validate()?;
        }
        let servos: BTreeMap<u8, ServoConfig> = map
            .servos
            .into_iter()
            .map(|config| config.validate().map(|()| (config.channel, config)))
            .collect::<Result<_, ValidationError>>()?;
        let drivers = map
            .drivers
            .into_iter()
            .map(|config| {
                let state = DriverStateRecord::disabled(&config);
                (config.number, DriverSlot { config, state })
            })
            .collect();

        Ok(Self {
            dispatcher,
            publisher,
            switches: SwitchTable::new(map.switches),
            drivers,
            servos,
            steppers: StepperSequencer::new(map.steppers),
            motion_due: BTreeMap::new(),
            rules: RuleBook::new(),
            accelerometer: AccelerometerDecoder::default(),
            sync_token: 0,
        })
    }

    /// The dispatcher, for callers that need raw command access.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Read initial switch states and bring up on-board peripherals.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Dispatch`] if the status query or a setup write
    /// could not be delivered.
    #[tracing::instrument(skip(self))]
    pub async fn attach(&mut self) -> Result<(), BoardError> {
        let states = match self.dispatcher.request(Command::SwitchGetStates).await? {
            Reply::SwitchStates(states) => states,
            other => return Err(DispatchError::UnexpectedReply(other.name()).into()),
        };
        self.switches.attach(&states);

        self.write_all(accelerometer::configure_writes())?;
        if !self.servos.is_empty() {
            self.write_all(servo::init_writes())?;
        }
        tracing::info!(
            switches = states.len(),
            drivers = self.drivers.len(),
            servos = self.servos.len(),
            "board attached"
        );
        Ok(())
    }

    // ── Rules ──────────────────────────────────────────────────────

    /// Install an automation rule on the board.
    ///
    /// # Errors
    ///
    /// - [`BoardError::NotFound`] if the switch or driver is not mapped.
    /// - [`BoardError::Validation`] if the rule's power is out of range.
    /// - [`BoardError::Capability`] for a sustained action on a driver
    ///   without `allow_enable`; nothing is sent.
    /// - [`BoardError::Dispatch`] if the worker is gone.
    ///
    /// The slot updates are sent fire-and-forget: a link failure while
    /// writing them is logged by the worker, not returned here, and the rule
    /// stays recorded as installed.
    #[tracing::instrument(skip(self))]
    pub fn install_rule(&mut self, rule: AutomationRule) -> Result<RuleHandle, BoardError> {
        let switch = self
            .switches
            .config(rule.switch)
            .ok_or(NotFoundError::Switch(rule.switch))?;
        let driver = &self
            .drivers
            .get(&rule.driver)
            .ok_or(NotFoundError::Driver(rule.driver))?
            .config;

        let superseded = self.rules.contains(rule.handle());
        let updates = self.rules.install(&rule, switch, driver)?;
        if superseded {
            tracing::debug!(switch = %rule.switch, driver = %rule.driver, "replacing earlier rule");
        }
        for update in updates {
            self.dispatcher.submit(Command::SwitchUpdateRule(update))?;
        }
        Ok(rule.handle())
    }

    /// Remove an installed rule and switch its driver off.
    ///
    /// Clearing a handle that is not installed is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn clear_rule(&mut self, handle: RuleHandle) -> Result<(), BoardError> {
        let cleared = self
            .switches
            .config(handle.switch)
            .and_then(|switch| self.rules.clear(handle, switch));
        let Some(updates) = cleared else {
            tracing::warn!(switch = %handle.switch, driver = %handle.driver, "rule is not installed");
            return Ok(());
        };

        for update in updates {
            self.dispatcher.submit(Command::SwitchUpdateRule(update))?;
        }
        self.drive(handle.driver, |config| Ok(output::disable(config)))
    }

    // ── Drivers and lights ─────────────────────────────────────────

    /// Pulse a driver at full power for its configured default length.
    ///
    /// # Errors
    ///
    /// Same as [`pulse`](Self::pulse).
    #[tracing::instrument(skip(self))]
    pub fn pulse_default(&mut self, driver: DriverNumber) -> Result<(), BoardError> {
        let milliseconds = self
            .drivers
            .get(&driver)
            .ok_or(NotFoundError::Driver(driver))?
            .config
            .default_pulse_ms;
        self.pulse(driver, milliseconds)
    }

    /// Pulse a driver at full power.
    ///
    /// A length of 0 never expires, so it needs `allow_enable` like
    /// [`enable`](Self::enable).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Capability`] for a 0 ms pulse on a driver
    /// without `allow_enable` (nothing is sent), [`BoardError::NotFound`] for
    /// an unmapped driver, or [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn pulse(&mut self, driver: DriverNumber, milliseconds: u8) -> Result<(), BoardError> {
        self.pulse_with_power(driver, milliseconds, 1.0)
    }

    /// Pulse a driver at `power` (`0.0..=1.0`).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for power out of range,
    /// [`BoardError::Capability`] for a 0 ms pulse on a driver without
    /// `allow_enable`, [`BoardError::NotFound`] for an unmapped driver, or
    /// [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn pulse_with_power(
        &mut self,
        driver: DriverNumber,
        milliseconds: u8,
        power: f32,
    ) -> Result<(), BoardError> {
        if !(0.0..=1.0).contains(&power) {
            return Err(ValidationError::PowerOutOfRange(power).into());
        }
        self.drive(driver, |config| Ok(output::pulse(config, milliseconds, power)?))
    }

    /// Energise a driver indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Capability`] when the driver does not allow
    /// sustained enable (nothing is sent), [`BoardError::NotFound`] for an
    /// unmapped driver, or [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn enable(&mut self, driver: DriverNumber) -> Result<(), BoardError> {
        self.drive(driver, |config| Ok(output::enable(config)?))
    }

    /// Switch a driver off.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] for an unmapped driver, or
    /// [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn disable(&mut self, driver: DriverNumber) -> Result<(), BoardError> {
        self.drive(driver, |config| Ok(output::disable(config)))
    }

    /// Drive a GI string or matrix lamp at an 8-bit intensity.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] for an unmapped driver, or
    /// [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn set_pwm(&mut self, driver: DriverNumber, duty: u8) -> Result<(), BoardError> {
        self.drive(driver, |config| Ok(output::intensity(config, duty)))
    }

    /// Set one channel of a serial LED board.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn set_led(&self, board: u8, index: u8, value: u8, inverted: bool) -> Result<(), BoardError> {
        self.dispatcher
            .submit(output::led(board, index, value, inverted))?;
        Ok(())
    }

    /// Last state record sent to a driver.
    #[must_use]
    pub fn driver_state(&self, driver: DriverNumber) -> Option<&DriverStateRecord> {
        self.drivers.get(&driver).map(|slot| &slot.state)
    }

    fn drive(
        &mut self,
        driver: DriverNumber,
        build: impl FnOnce(&DriverConfig) -> Result<DirectDrive, BoardError>,
    ) -> Result<(), BoardError> {
        let slot = self
            .drivers
            .get_mut(&driver)
            .ok_or(NotFoundError::Driver(driver))?;
        let drive = build(&slot.config)?;
        self.dispatcher.submit(drive.command)?;
        slot.state = drive.record;
        Ok(())
    }

    // ── Switches ───────────────────────────────────────────────────

    /// Logical state of a switch.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] for an unmapped switch.
    pub fn is_active(&self, switch: SwitchNumber) -> Result<bool, BoardError> {
        Ok(self
            .switches
            .is_active(switch)
            .ok_or(NotFoundError::Switch(switch))?)
    }

    /// Classify one polled event and publish what it means.
    ///
    /// Events the core does not understand are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the publisher fails.
    pub async fn process_event(&mut self, event: RawEvent) -> Result<(), BoardError> {
        let kind = if event.event_type().is_some() {
            self.switches
                .classify(event)
                .map(BoardEventKind::from)
                .or_else(|| self.accelerometer.feed(event))
        } else {
            tracing::warn!(code = event.code, value = event.value, "unknown event code");
            None
        };

        if let Some(kind) = kind {
            tracing::debug!(%kind, "board event");
            self.publisher.publish(BoardEvent::new(kind)).await?;
        }
        Ok(())
    }

    /// Process a batch of polled events in order.
    ///
    /// # Errors
    ///
    /// Returns the first publisher error; later events are not processed.
    pub async fn process_events(
        &mut self,
        events: impl IntoIterator<Item = RawEvent>,
    ) -> Result<(), BoardError> {
        for event in events {
            self.process_event(event).await?;
        }
        Ok(())
    }

    // ── Motion ─────────────────────────────────────────────────────

    /// Move a stepper to an absolute position.
    ///
    /// Issued at once when the axis is idle; otherwise it replaces the
    /// pending target.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] for an unmapped axis, or
    /// [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn move_to_absolute(&mut self, axis: AxisNumber, position: u16) -> Result<(), BoardError> {
        let writes = self.steppers.move_to(axis, position)?;
        if writes.is_empty() {
            tracing::debug!(%axis, position, "axis busy, move queued");
        }
        self.start_motion(axis, writes)
    }

    /// Signal that the move in flight on `axis` finished.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] for an unmapped axis, or
    /// [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn stepper_move_complete(&mut self, axis: AxisNumber) -> Result<(), BoardError> {
        let writes = self.steppers.complete(axis)?;
        self.motion_due.remove(&axis);
        self.start_motion(axis, writes)
    }

    /// Complete every move whose settle time has passed by `now`.
    ///
    /// The control loop calls this periodically so queued targets go out
    /// without an explicit completion signal.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Dispatch`] if the worker is gone.
    pub fn poll_motion(&mut self, now: Instant) -> Result<(), BoardError> {
        let settled: Vec<AxisNumber> = self
            .motion_due
            .iter()
            .filter(|(_, due)| **due <= now)
            .map(|(axis, _)| *axis)
            .collect();
        for axis in settled {
            tracing::debug!(%axis, "move settled");
            self.stepper_move_complete(axis)?;
        }
        Ok(())
    }

    fn start_motion(&mut self, axis: AxisNumber, writes: Vec<RegisterWrite>) -> Result<(), BoardError> {
        if writes.is_empty() {
            return Ok(());
        }
        if let Some(settle) = self.steppers.settle_time(axis) {
            self.motion_due.insert(axis, Instant::now() + settle);
        }
        self.write_all(writes)
    }

    /// Move a servo to `position` (`0.0..=1.0`).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] for an unmapped channel,
    /// [`BoardError::Validation`] for a position out of range, or
    /// [`BoardError::Dispatch`] if the worker is gone.
    #[tracing::instrument(skip(self))]
    pub fn servo_go_to(&mut self, channel: u8, position: f32) -> Result<(), BoardError> {
        let servo = self
            .servos
            .get(&channel)
            .ok_or(NotFoundError::Servo(channel))?;
        let writes = servo.position_writes(position)?;
        self.write_all(writes)
    }

    fn write_all(&self, writes: impl IntoIterator<Item = RegisterWrite>) -> Result<(), BoardError> {
        for write in writes {
            self.dispatcher.submit(write.into())?;
        }
        Ok(())
    }

    // ── Board ──────────────────────────────────────────────────────

    /// Query firmware identity and detect SW-16 boards.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Dispatch`] if a register read fails.
    #[tracing::instrument(skip(self))]
    pub async fn info(&self) -> Result<BoardInfo, BoardError> {
        let version = self.read(Module::Manager, board_info::VERSION_ADDRESS).await?;
        let dip = self.read(Module::Manager, board_info::DIP_ADDRESS).await?;

        let mut sw16_boards = Vec::new();
        for slot in 0..board_info::SW16_SLOTS {
            let (module, type_address, id_address) = board_info::sw16_addresses(slot);
            let device_type = self.read(module, type_address).await?;
            let board_id = self.read(module, id_address).await?;
            sw16_boards.extend(Sw16Board::detect(slot, device_type, board_id));
        }

        Ok(BoardInfo {
            firmware: Firmware::from_registers(version, dip),
            sw16_boards,
        })
    }

    /// Operator-facing summary of [`info`](Self::info).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Dispatch`] if a register read fails.
    pub async fn info_string(&self) -> Result<String, BoardError> {
        Ok(self.info().await?.to_string())
    }

    /// Wait until every command submitted so far has reached the board.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Dispatch`] if the worker is gone.
    pub async fn sync(&mut self) -> Result<(), BoardError> {
        self.sync_token = self.sync_token.wrapping_add(1);
        let token = self.sync_token;
        match self.dispatcher.request(Command::Sync(token)).await? {
            Reply::Sync(echoed) if echoed == token => Ok(()),
            other => Err(DispatchError::UnexpectedReply(other.name()).into()),
        }
    }

    async fn read(&self, module: Module, address: u16) -> Result<u32, BoardError> {
        match self
            .dispatcher
            .request(Command::ReadData { module, address })
            .await?
        {
            Reply::Data(value) => Ok(value),
            other => Err(DispatchError::UnexpectedReply(other.name()).into()),
        }
    }
}
