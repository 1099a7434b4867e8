//! Acquisition engine modules
//!
//! The sensor handle, the recovery ladder and the supervisor that drives them.

pub mod adapter;
pub mod ladder;
pub mod supervisor;

pub use adapter::{Recoverable, SensorHandle};
pub use ladder::{LadderTimings, PollOutcome, RecoveryLadder, RecoveryStep};
pub use supervisor::{
    AcquisitionStatus, AcquisitionSupervisor, HardwareProvider, LinuxHardware, SlotStatus,
};
