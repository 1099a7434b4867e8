//! aqlog Core Library
//!
//! Air-quality acquisition over I2C: CO2, TVOC, temperature and humidity from
//! a register-mapped sensor and a command-word sensor.
//!
//! # Features
//!
//! - **Transport**: I2C access with retry on transient bus errors
//! - **Adapters**: init, read and calibration for both sensor families
//! - **Plausibility**: sentinel and range filtering of every reading
//! - **Recovery**: retry, re-init and reset-line escalation with a simulator fallback
//! - **Buffering**: bounded, thread-safe ring of composed samples
//!
//! # Module Structure
//!
//! - `hw/` - Bus transport, sensor adapters, reset line, simulator
//! - `data/` - Data types, configuration, calibration store, sample buffer
//! - `engine/` - Recovery ladder and acquisition supervisor
//!
//! # Example
//!
//! ```no_run
//! use aq_core::{AcquisitionConfig, AcquisitionSupervisor};
//!
//! let config = AcquisitionConfig::from_env().unwrap();
//! let supervisor = AcquisitionSupervisor::new(config.clone());
//! supervisor.start(config.poll_interval(), config.options).unwrap();
//!
//! if let Some(sample) = supervisor.buffer().latest() {
//!     println!("CO2 {} ppm", sample.co2);
//! }
//! supervisor.stop();
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod error;
pub mod test_utils;

// Re-export primary types from data/
pub use data::{
    AcquisitionConfig, CalibrationStore, CommandReading, DeviceFault, DriveMode, Reading,
    RecoveryPolicy, RegisterReading, Rejection, Sample, SampleBuffer, SensorBusConfig,
    SensorKind, SensorTimings, StartOptions,
};

// Re-export error types
pub use error::{Result, SensorError};

// Re-export engine types
pub use engine::{
    AcquisitionStatus, AcquisitionSupervisor, HardwareProvider, LinuxHardware, PollOutcome,
    RecoveryLadder, RecoveryStep, SlotStatus,
};

// Re-export hardware types from hw/
pub use hw::{
    crc8, AdapterState, CommandAdapter, I2cBus, LinuxI2cBus, RegisterAdapter, ResetLine,
    Simulator, SysfsResetLine, Transport,
};
