//! Acquisition configuration
//!
//! Loaded from an optional JSON file, then overlaid by `AQLOG_*` environment
//! variables. Every field has a default so an empty file (or none) is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{acquisition, bus, command_sensor, paths, recovery, register_sensor, reset};
use crate::data::types::DriveMode;
use crate::error::{Result, SensorError};

/// Bus device and 7-bit address of one sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorBusConfig {
    #[serde(default = "default_bus")]
    pub bus: PathBuf,
    pub address: u16,
}

fn default_bus() -> PathBuf {
    PathBuf::from(bus::DEFAULT_DEVICE)
}

fn default_register_sensor() -> SensorBusConfig {
    SensorBusConfig {
        bus: default_bus(),
        address: register_sensor::DEFAULT_ADDRESS,
    }
}

fn default_command_sensor() -> SensorBusConfig {
    SensorBusConfig {
        bus: default_bus(),
        address: command_sensor::DEFAULT_ADDRESS,
    }
}

/// Which inputs the supervisor drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    /// CO2/temperature/humidity from the command sensor
    #[serde(default)]
    pub use_command_sensor: bool,
    /// TVOC (and eCO2 when alone) from the register sensor
    #[serde(default = "default_true")]
    pub use_register_sensor: bool,
    /// Auxiliary inputs (sound level placeholder)
    #[serde(default)]
    pub use_aux_inputs: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            use_command_sensor: false,
            use_register_sensor: true,
            use_aux_inputs: false,
        }
    }
}

/// Recovery ladder tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Quick re-reads after a bad read
    #[serde(default = "default_local_retries")]
    pub local_retries: u32,
    /// Pause before each quick re-read
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Consecutive bad reads before the reset line is pulsed
    #[serde(default = "default_reset_threshold")]
    pub reset_threshold: u32,
    /// Reset pulses allowed before giving up on the hardware
    #[serde(default = "default_max_resets")]
    pub max_resets: u32,
    /// Init attempts at startup before falling back
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,
    /// Failed re-initializations tolerated when no reset line exists
    #[serde(default = "default_reinit_budget")]
    pub reinit_budget: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            local_retries: default_local_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            reset_threshold: default_reset_threshold(),
            max_resets: default_max_resets(),
            init_attempts: default_init_attempts(),
            reinit_budget: default_reinit_budget(),
        }
    }
}

fn default_local_retries() -> u32 { recovery::LOCAL_RETRIES }
fn default_retry_delay_ms() -> u64 { recovery::RETRY_DELAY_MS }
fn default_reset_threshold() -> u32 { recovery::RESET_THRESHOLD }
fn default_max_resets() -> u32 { recovery::MAX_RESETS }
fn default_init_attempts() -> u32 { recovery::INIT_ATTEMPTS }
fn default_reinit_budget() -> u32 { recovery::REINIT_BUDGET }
fn default_true() -> bool { true }

/// Delays used by adapters and the worker
///
/// Not serialized; tests swap in [`SensorTimings::immediate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorTimings {
    pub bus_retry_delay: Duration,
    pub app_start_settle: Duration,
    pub write_settle: Duration,
    pub command_settle: Duration,
    pub read_delay: Duration,
    pub stop_settle: Duration,
    pub reset_hold: Duration,
    pub reset_settle: Duration,
    pub warmup: Duration,
    pub init_retry_delay: Duration,
}

impl SensorTimings {
    /// No delays at all
    pub fn immediate() -> Self {
        Self {
            bus_retry_delay: Duration::ZERO,
            app_start_settle: Duration::ZERO,
            write_settle: Duration::ZERO,
            command_settle: Duration::ZERO,
            read_delay: Duration::ZERO,
            stop_settle: Duration::ZERO,
            reset_hold: Duration::ZERO,
            reset_settle: Duration::ZERO,
            warmup: Duration::ZERO,
            init_retry_delay: Duration::ZERO,
        }
    }
}

impl Default for SensorTimings {
    fn default() -> Self {
        Self {
            bus_retry_delay: bus::RETRY_DELAY,
            app_start_settle: register_sensor::APP_START_SETTLE,
            write_settle: register_sensor::WRITE_SETTLE,
            command_settle: command_sensor::COMMAND_SETTLE,
            read_delay: command_sensor::READ_DELAY,
            stop_settle: command_sensor::STOP_SETTLE,
            reset_hold: reset::HOLD,
            reset_settle: reset::SETTLE,
            warmup: acquisition::WARMUP,
            init_retry_delay: acquisition::INIT_RETRY_DELAY,
        }
    }
}

/// Everything the supervisor needs to know before `start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default = "default_register_sensor")]
    pub register_sensor: SensorBusConfig,

    #[serde(default = "default_command_sensor")]
    pub command_sensor: SensorBusConfig,

    /// Where the register sensor baseline is kept
    #[serde(default = "paths::default_calibration_file")]
    pub calibration_file: PathBuf,

    #[serde(default = "default_calibration_save_interval_secs")]
    pub calibration_save_interval_secs: u64,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Sysfs GPIO line wired to the register sensor's reset pin
    #[serde(default)]
    pub reset_gpio: Option<u32>,

    /// Never substitute the simulator for real hardware
    #[serde(default)]
    pub force_hardware: bool,

    #[serde(default)]
    pub drive_mode: DriveMode,

    /// Enable the data-ready interrupt pin
    #[serde(default)]
    pub interrupt: bool,

    /// Restore the stored baseline during init
    #[serde(default = "default_true")]
    pub restore_calibration: bool,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    #[serde(default)]
    pub options: StartOptions,

    #[serde(default)]
    pub recovery: RecoveryPolicy,

    #[serde(skip)]
    pub timings: SensorTimings,
}

fn default_calibration_save_interval_secs() -> u64 {
    acquisition::DEFAULT_CALIBRATION_SAVE_INTERVAL.as_secs()
}

fn default_buffer_capacity() -> usize {
    acquisition::DEFAULT_BUFFER_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    acquisition::DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_join_timeout_ms() -> u64 {
    acquisition::DEFAULT_JOIN_TIMEOUT.as_millis() as u64
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            register_sensor: default_register_sensor(),
            command_sensor: default_command_sensor(),
            calibration_file: paths::default_calibration_file(),
            calibration_save_interval_secs: default_calibration_save_interval_secs(),
            buffer_capacity: default_buffer_capacity(),
            reset_gpio: None,
            force_hardware: false,
            drive_mode: DriveMode::default(),
            interrupt: false,
            restore_calibration: true,
            poll_interval_ms: default_poll_interval_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            options: StartOptions::default(),
            recovery: RecoveryPolicy::default(),
            timings: SensorTimings::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Load from a JSON file, falling back to defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SensorError::config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Defaults or `AQLOG_CONFIG`, overlaid by the process environment, validated
    pub fn from_env() -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let mut config = match lookup(paths::env::CONFIG) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from `lookup` (normally the process environment)
    ///
    /// Malformed values are logged and skipped.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(paths::env::I2C_BUS) {
            let bus = parse_bus(&value);
            debug!("I2C bus override: {:?}", bus);
            self.register_sensor.bus = bus.clone();
            self.command_sensor.bus = bus;
        }

        if let Some(value) = lookup(paths::env::REGISTER_ADDR) {
            match parse_address(&value) {
                Some(addr) => self.register_sensor.address = addr,
                None => warn!("Ignoring {}={:?}: not a 7-bit address", paths::env::REGISTER_ADDR, value),
            }
        }

        if let Some(value) = lookup(paths::env::COMMAND_ADDR) {
            match parse_address(&value) {
                Some(addr) => self.command_sensor.address = addr,
                None => warn!("Ignoring {}={:?}: not a 7-bit address", paths::env::COMMAND_ADDR, value),
            }
        }

        if let Some(value) = lookup(paths::env::CALIBRATION_FILE) {
            self.calibration_file = PathBuf::from(value.trim());
        }

        if let Some(value) = lookup(paths::env::RESET_GPIO) {
            match value.trim().parse::<u32>() {
                Ok(line) => self.reset_gpio = Some(line),
                Err(_) => warn!("Ignoring {}={:?}: not a GPIO number", paths::env::RESET_GPIO, value),
            }
        }

        if let Some(value) = lookup(paths::env::FORCE_HARDWARE) {
            match parse_flag(&value) {
                Some(flag) => self.force_hardware = flag,
                None => warn!("Ignoring {}={:?}: not a boolean", paths::env::FORCE_HARDWARE, value),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(SensorError::invalid_config("buffer_capacity", "must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(SensorError::invalid_config("poll_interval_ms", "must be positive"));
        }
        for (field, sensor) in [
            ("register_sensor.address", &self.register_sensor),
            ("command_sensor.address", &self.command_sensor),
        ] {
            if sensor.address > bus::MAX_ADDRESS {
                return Err(SensorError::invalid_config(
                    field,
                    format!("0x{:X} is not a 7-bit address", sensor.address),
                ));
            }
        }
        if self.recovery.reset_threshold == 0 {
            return Err(SensorError::invalid_config("recovery.reset_threshold", "must be at least 1"));
        }
        if self.recovery.init_attempts == 0 {
            return Err(SensorError::invalid_config("recovery.init_attempts", "must be at least 1"));
        }
        Ok(())
    }

    /// Poll interval, raised to the supported minimum
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(acquisition::MIN_POLL_INTERVAL)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn calibration_save_interval(&self) -> Duration {
        Duration::from_secs(self.calibration_save_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.recovery.retry_delay_ms)
    }
}

/// `"1"` means `/dev/i2c-1`; anything else is taken as a path
fn parse_bus(value: &str) -> PathBuf {
    let value = value.trim();
    match value.parse::<u32>() {
        Ok(n) => PathBuf::from(format!("/dev/i2c-{}", n)),
        Err(_) => PathBuf::from(value),
    }
}

/// Decimal or `0x`-prefixed hex, 7-bit range only
fn parse_address(value: &str) -> Option<u16> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok()?,
        None => value.parse::<u16>().ok()?,
    };
    (parsed <= bus::MAX_ADDRESS).then_some(parsed)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.register_sensor.address, 0x5A);
        assert_eq!(config.command_sensor.address, 0x62);
        assert_eq!(config.buffer_capacity, 600);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.calibration_save_interval(), Duration::from_secs(3600));
        assert_eq!(config.recovery.reset_threshold, 6);
        assert_eq!(config.drive_mode, DriveMode::EverySecond);
        assert!(config.calibration_file.ends_with("aqlog/calibration.bin"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: AcquisitionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AcquisitionConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aqlog.json");
        fs::write(
            &path,
            r#"{
                "buffer_capacity": 100,
                "reset_gpio": 18,
                "drive_mode": "every_ten_seconds",
                "options": { "use_command_sensor": true },
                "recovery": { "max_resets": 1 }
            }"#,
        )
        .unwrap();

        let config = AcquisitionConfig::load(&path).unwrap();
        assert_eq!(config.buffer_capacity, 100);
        assert_eq!(config.reset_gpio, Some(18));
        assert_eq!(config.drive_mode, DriveMode::EveryTenSeconds);
        assert!(config.options.use_command_sensor);
        assert!(config.options.use_register_sensor);
        assert_eq!(config.recovery.max_resets, 1);
        assert_eq!(config.recovery.local_retries, 2);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = AcquisitionConfig::load("/nonexistent/aqlog.json").unwrap();
        assert_eq!(config.buffer_capacity, 600);
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aqlog.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AcquisitionConfig::load(&path),
            Err(SensorError::JsonParse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AcquisitionConfig::default();
        config.apply_env_overrides(env(&[
            ("AQLOG_I2C_BUS", "3"),
            ("AQLOG_REGISTER_ADDR", "0x5B"),
            ("AQLOG_COMMAND_ADDR", "98"),
            ("AQLOG_CALIBRATION_FILE", "/tmp/cal.bin"),
            ("AQLOG_RESET_GPIO", "17"),
            ("AQLOG_FORCE_HARDWARE", "yes"),
        ]));

        assert_eq!(config.register_sensor.bus, PathBuf::from("/dev/i2c-3"));
        assert_eq!(config.command_sensor.bus, PathBuf::from("/dev/i2c-3"));
        assert_eq!(config.register_sensor.address, 0x5B);
        assert_eq!(config.command_sensor.address, 98);
        assert_eq!(config.calibration_file, PathBuf::from("/tmp/cal.bin"));
        assert_eq!(config.reset_gpio, Some(17));
        assert!(config.force_hardware);
    }

    #[test]
    fn test_malformed_env_values_are_ignored() {
        let mut config = AcquisitionConfig::default();
        config.apply_env_overrides(env(&[
            ("AQLOG_REGISTER_ADDR", "0x1FF"),
            ("AQLOG_COMMAND_ADDR", "banana"),
            ("AQLOG_RESET_GPIO", "-4"),
            ("AQLOG_FORCE_HARDWARE", "maybe"),
        ]));
        assert_eq!(config, AcquisitionConfig::default());
    }

    #[test]
    fn test_bus_path_override() {
        let mut config = AcquisitionConfig::default();
        config.apply_env_overrides(env(&[("AQLOG_I2C_BUS", "/dev/i2c-custom")]));
        assert_eq!(config.register_sensor.bus, PathBuf::from("/dev/i2c-custom"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AcquisitionConfig::default();
        config.buffer_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AcquisitionConfig::default();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AcquisitionConfig::default();
        config.command_sensor.address = 0x80;
        assert!(matches!(
            config.validate(),
            Err(SensorError::InvalidConfig { ref field, .. }) if field == "command_sensor.address"
        ));
    }

    #[test]
    fn test_poll_interval_has_floor() {
        let config = AcquisitionConfig {
            poll_interval_ms: 5,
            ..AcquisitionConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }
}
