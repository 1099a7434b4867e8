//! Data types, configuration, and persistence modules

pub mod buffer;
pub mod calibration;
pub mod config;
pub mod plausibility;
pub mod types;

pub use buffer::SampleBuffer;
pub use calibration::CalibrationStore;
pub use config::{AcquisitionConfig, RecoveryPolicy, SensorBusConfig, SensorTimings, StartOptions};
pub use plausibility::Rejection;
pub use types::{
    CommandReading, DeviceFault, DriveMode, Reading, RegisterReading, Sample, SensorKind,
};
