//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `rocwire.toml` in the working directory. Every field has a
//! default so the file is optional; without it the daemon drives an empty
//! board. Environment variables take precedence over file values.

use std::collections::BTreeSet;
use std::time::Duration;

use rocwire_app::services::BoardMap;
use rocwire_domain::driver::DriverConfig;
use rocwire_domain::rule::AutomationRule;
use rocwire_domain::servo::ServoConfig;
use rocwire_domain::stepper::StepperConfig;
use rocwire_domain::switch::SwitchConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Board link settings.
    pub board: BoardConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Simulated board identity.
    #[serde(rename = "virtual")]
    pub virtual_board: VirtualBoardConfig,
    /// Switch inputs.
    pub switches: Vec<SwitchConfig>,
    /// Driver outputs.
    pub drivers: Vec<DriverConfig>,
    /// Servo channels on the I²C expander.
    pub servos: Vec<ServoConfig>,
    /// Stepper axes.
    pub steppers: Vec<StepperConfig>,
    /// Automation rules installed at startup.
    pub rules: Vec<AutomationRule>,
}

/// Board link configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// How often the worker polls the board for events, in milliseconds.
    pub poll_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// What the simulated board reports about itself.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VirtualBoardConfig {
    pub firmware_version: u16,
    pub firmware_revision: u16,
    pub board_id: u8,
    /// SW-16 boards plugged into the chain.
    pub sw16: Vec<Sw16Config>,
}

/// One simulated SW-16 switch board.
#[derive(Debug, Clone, Deserialize)]
pub struct Sw16Config {
    pub slot: u8,
    #[serde(default = "default_sw16_device_type")]
    pub device_type: u8,
    #[serde(default)]
    pub board_id: u8,
}

fn default_sw16_device_type() -> u8 {
    0xA3
}

impl Config {
    /// Load configuration from `rocwire.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is inconsistent.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("rocwire.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ROCWIRE_POLL_INTERVAL_MS")
            && let Ok(interval) = val.parse()
        {
            self.board.poll_interval_ms = interval;
        }
        if let Ok(val) = std::env::var("ROCWIRE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.board.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if let Some(number) = first_duplicate(self.switches.iter().map(|s| s.number.get())) {
            return Err(ConfigError::Validation(format!(
                "switch {number} is defined twice"
            )));
        }
        if let Some(number) = first_duplicate(self.drivers.iter().map(|d| d.number.get())) {
            return Err(ConfigError::Validation(format!(
                "driver {number} is defined twice"
            )));
        }
        Ok(())
    }

    /// Return the worker's event polling period.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.board.poll_interval_ms)
    }

    /// Return the hardware objects the platform manages.
    #[must_use]
    pub fn board_map(&self) -> BoardMap {
        BoardMap {
            switches: self.switches.clone(),
            drivers: self.drivers.clone(),
            servos: self.servos.clone(),
            steppers: self.steppers.clone(),
        }
    }
}

fn first_duplicate<T: Ord + Copy>(numbers: impl IntoIterator<Item = T>) -> Option<T> {
    let mut seen = BTreeSet::new();
    numbers.into_iter().find(|number| !seen.insert(*number))
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rocwired=info,rocwire_app=info".to_string(),
        }
    }
}

impl Default for VirtualBoardConfig {
    fn default() -> Self {
        Self {
            firmware_version: 2,
            firmware_revision: 6,
            board_id: 0,
            sw16: Vec::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
