//! Hardware interaction modules
//!
//! Bus transport, sensor adapters, the reset line and the simulator.

pub mod command_adapter;
pub mod crc;
pub mod register_adapter;
pub mod reset;
pub mod simulator;
pub mod transport;

pub use command_adapter::{decode_measurement, CommandAdapter};
pub use crc::{crc8, encode_word};
pub use register_adapter::{encode_environment, AdapterState, RegisterAdapter, RegisterInit};
pub use reset::{ResetLine, SysfsResetLine};
pub use simulator::Simulator;
pub use transport::{I2cBus, LinuxI2cBus, Transport};
