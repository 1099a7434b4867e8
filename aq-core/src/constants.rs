//! Constants and configuration values for aqlog
//!
//! Centralizes register maps, command words, timing and plausibility limits.
//! Never use magic numbers in other files - add them here first.

use std::time::Duration;

/// Bus defaults and retry policy
pub mod bus {
    use super::Duration;

    /// Default I2C character device
    pub const DEFAULT_DEVICE: &str = "/dev/i2c-1";

    /// Attempts per bus transfer before a transient error is surfaced
    pub const RETRY_ATTEMPTS: u32 = 3;

    /// Pause between transfer attempts
    pub const RETRY_DELAY: Duration = Duration::from_millis(50);

    /// Highest valid 7-bit address
    pub const MAX_ADDRESS: u16 = 0x7F;
}

/// Register-addressed gas sensor (CCS811 family)
pub mod register_sensor {
    use super::Duration;

    /// Default 7-bit address (ADDR pin low)
    pub const DEFAULT_ADDRESS: u16 = 0x5A;

    /// Expected HW_ID register value
    pub const HW_ID: u8 = 0x81;

    pub mod reg {
        pub const STATUS: u8 = 0x00;
        pub const MEAS_MODE: u8 = 0x01;
        pub const ALG_RESULT_DATA: u8 = 0x02;
        pub const ENV_DATA: u8 = 0x05;
        pub const BASELINE: u8 = 0x11;
        pub const HW_ID: u8 = 0x20;
    }

    /// Application-start command byte (written with no payload)
    pub const CMD_APP_START: u8 = 0xF4;

    pub mod status {
        pub const ERROR: u8 = 0x01;
        pub const DATA_READY: u8 = 0x08;
        pub const APP_VALID: u8 = 0x10;
    }

    pub mod error_id {
        pub const MSG_INVALID: u8 = 0x01;
        pub const APP_INVALID: u8 = 0x02;
        pub const HEATER_SUPPLY: u8 = 0x04;
        pub const HEATER_FAULT: u8 = 0x08;
        pub const MAX_RESISTANCE: u8 = 0x10;
        /// All bits with a documented meaning
        pub const KNOWN_MASK: u8 = 0x1F;
    }

    /// MEAS_MODE interrupt-enable bit
    pub const MEAS_MODE_INTERRUPT: u8 = 0x08;

    /// ALG_RESULT_DATA block length
    pub const RESULT_LEN: usize = 8;

    /// ENV_DATA fixed-point scale (1/512 units)
    pub const ENV_SCALE: f32 = 512.0;

    /// ENV_DATA temperature offset in degrees Celsius
    pub const ENV_TEMP_OFFSET: f32 = 25.0;

    /// Firmware start-up time after APP_START
    pub const APP_START_SETTLE: Duration = Duration::from_millis(120);

    /// Pause after writing a configuration register
    pub const WRITE_SETTLE: Duration = Duration::from_millis(50);
}

/// Command-word sensor with CRC-protected words (SCD4x family)
pub mod command_sensor {
    use super::Duration;

    pub const DEFAULT_ADDRESS: u16 = 0x62;

    pub const CMD_START_PERIODIC: u16 = 0x21B1;
    pub const CMD_READ_MEASUREMENT: u16 = 0xEC05;
    pub const CMD_STOP_PERIODIC: u16 = 0x3F86;

    /// Response length of a measurement read: 3 values x (2 words x (2 bytes + crc))
    pub const MEASUREMENT_LEN: usize = 18;

    /// Pause after start/stop commands
    pub const COMMAND_SETTLE: Duration = Duration::from_millis(50);

    /// Pause between the read command and fetching the response
    pub const READ_DELAY: Duration = Duration::from_millis(5);

    /// The sensor ignores commands for this long after stopping periodic mode
    pub const STOP_SETTLE: Duration = Duration::from_millis(500);
}

/// CRC-8 parameters used by the command sensor
pub mod crc {
    pub const POLYNOMIAL: u8 = 0x31;
    pub const INIT: u8 = 0xFF;
}

/// Hardware reset line timing
pub mod reset {
    use super::Duration;

    /// How long the line is held low
    pub const HOLD: Duration = Duration::from_millis(150);

    /// Boot time after releasing the line
    pub const SETTLE: Duration = Duration::from_millis(250);

    /// Sysfs GPIO root
    pub const SYSFS_GPIO_BASE: &str = "/sys/class/gpio";
}

/// Plausibility limits
pub mod limits {
    /// Register sensor firmware never reports eCO2 below this
    pub const REGISTER_CO2_MIN: u16 = 400;
    pub const REGISTER_CO2_MAX: u16 = 5000;
    pub const TVOC_MIN: u16 = 0;
    pub const TVOC_MAX: u16 = 10000;

    pub const COMMAND_CO2_MIN: u16 = 350;
    pub const COMMAND_CO2_MAX: u16 = 5000;
    pub const TEMPERATURE_MIN: f32 = -40.0;
    pub const TEMPERATURE_MAX: f32 = 85.0;
    pub const HUMIDITY_MIN: f32 = 0.0;
    pub const HUMIDITY_MAX: f32 = 100.0;

    /// Byte values a stuck bus returns in place of real data
    pub const FILL_BYTES: [u8; 3] = [0x7F, 0xFD, 0xFF];
}

/// Simulator random-walk parameters
pub mod simulator {
    pub const CO2_START: i32 = 415;
    pub const CO2_MIN: i32 = 400;
    pub const CO2_MAX: i32 = 5000;
    pub const TVOC_START: i32 = 10;
    pub const TVOC_MIN: i32 = 0;
    pub const TVOC_MAX: i32 = 10000;
    pub const TEMPERATURE_START: f32 = 22.0;
    pub const HUMIDITY_START: f32 = 45.0;

    /// Standard deviation of a single CO2/TVOC step
    pub const STEP_SIGMA: f64 = 1.0;

    /// Largest step allowed in sigmas
    pub const STEP_CLAMP_SIGMAS: f64 = 3.0;

    pub const TEMPERATURE_STEP: f32 = 0.05;
    pub const HUMIDITY_STEP: f32 = 0.1;
}

/// Supervisor loop defaults
pub mod acquisition {
    use super::Duration;

    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_BUFFER_CAPACITY: usize = 600;
    pub const DEFAULT_CALIBRATION_SAVE_INTERVAL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

    /// Delay before the first bus access on the worker
    pub const WARMUP: Duration = Duration::from_millis(200);

    /// Pause between startup init attempts
    pub const INIT_RETRY_DELAY: Duration = Duration::from_millis(200);

    /// Ambient temperature placeholder when no sensor reports temperature
    pub const AMBIENT_TEMPERATURE_START: f32 = 22.0;
    pub const AMBIENT_TEMPERATURE_DRIFT: f32 = 0.02;

    /// Sound placeholder decay factor and noise amplitude
    pub const SOUND_DECAY: f32 = 0.98;
    pub const SOUND_NOISE: f32 = 0.5;
}

/// Recovery ladder defaults
pub mod recovery {
    pub const LOCAL_RETRIES: u32 = 2;
    pub const RETRY_DELAY_MS: u64 = 50;
    pub const RESET_THRESHOLD: u32 = 6;
    pub const MAX_RESETS: u32 = 2;
    pub const INIT_ATTEMPTS: u32 = 2;
    pub const REINIT_BUDGET: u32 = 6;
}

/// Paths and environment variables
pub mod paths {
    /// Calibration file name under the data directory
    pub const CALIBRATION_FILE: &str = "calibration.bin";

    /// Application directory name
    pub const APP_DIR: &str = "aqlog";

    pub mod env {
        pub const CONFIG: &str = "AQLOG_CONFIG";
        pub const I2C_BUS: &str = "AQLOG_I2C_BUS";
        pub const REGISTER_ADDR: &str = "AQLOG_REGISTER_ADDR";
        pub const COMMAND_ADDR: &str = "AQLOG_COMMAND_ADDR";
        pub const CALIBRATION_FILE: &str = "AQLOG_CALIBRATION_FILE";
        pub const RESET_GPIO: &str = "AQLOG_RESET_GPIO";
        pub const FORCE_HARDWARE: &str = "AQLOG_FORCE_HARDWARE";
        pub const LOG: &str = "AQLOG_LOG";
    }

    /// Default calibration file location
    ///
    /// Uses the platform data directory, falling back to ./data when unavailable.
    pub fn default_calibration_file() -> std::path::PathBuf {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| std::path::PathBuf::from("data"))
            .join(CALIBRATION_FILE)
    }
}
