//! Sensor handle
//!
//! One closed set of sources behind a single interface: the register sensor,
//! the command sensor, or a simulator standing in for either.

use tracing::{debug, warn};

use crate::data::plausibility;
use crate::data::types::{Reading, SensorKind};
use crate::error::Result;
use crate::hw::command_adapter::CommandAdapter;
use crate::hw::register_adapter::{AdapterState, RegisterAdapter, RegisterInit};
use crate::hw::simulator::Simulator;

/// What the recovery ladder needs from a source
pub trait Recoverable {
    /// Read once and run the plausibility filter
    fn read_checked(&mut self) -> Result<Reading>;

    /// Re-run the source's initialization sequence
    fn reinit(&mut self) -> Result<()>;

    /// Name for log messages
    fn label(&self) -> String;
}

pub enum SensorHandle {
    Register {
        adapter: RegisterAdapter,
        params: RegisterInit,
    },
    Command(CommandAdapter),
    Simulator(Simulator),
}

impl SensorHandle {
    /// Role this handle fills, simulated or not
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorHandle::Register { .. } => SensorKind::Register,
            SensorHandle::Command(_) => SensorKind::Command,
            SensorHandle::Simulator(sim) => sim.kind(),
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, SensorHandle::Simulator(_))
    }

    /// Adapter lifecycle state; simulators are always ready
    pub fn state(&self) -> AdapterState {
        match self {
            SensorHandle::Register { adapter, .. } => adapter.state(),
            SensorHandle::Command(adapter) => adapter.state(),
            SensorHandle::Simulator(_) => AdapterState::Ready,
        }
    }

    pub fn init(&mut self) -> Result<()> {
        match self {
            SensorHandle::Register { adapter, params } => adapter.init(*params),
            SensorHandle::Command(adapter) => adapter.start_periodic_measurement(),
            SensorHandle::Simulator(sim) => {
                debug!("Simulated {} ready", sim.kind());
                Ok(())
            }
        }
    }

    /// Raw read with no plausibility filtering
    pub fn read(&mut self) -> Result<Reading> {
        match self {
            SensorHandle::Register { adapter, .. } => adapter.read().map(Reading::Register),
            SensorHandle::Command(adapter) => adapter.read_measurement().map(Reading::Command),
            SensorHandle::Simulator(sim) => Ok(sim.read()),
        }
    }

    /// Persist the live calibration value
    ///
    /// `None` when this source has no calibration to keep, or when the
    /// sensor has not completed init and its baseline would overwrite the
    /// stored one with a boot default.
    pub fn save_calibration(&mut self) -> Option<Result<u16>> {
        match self {
            SensorHandle::Register { adapter, .. } if adapter.is_initialized() => {
                Some(adapter.save_calibration())
            }
            SensorHandle::Register { adapter, .. } => {
                debug!(
                    "Register sensor 0x{:02X} not initialized, keeping stored baseline",
                    adapter.address()
                );
                None
            }
            _ => None,
        }
    }

    /// Pass ambient conditions to a sensor that compensates for them
    pub fn write_environment(&mut self, humidity: f32, temperature: f32) -> Option<Result<()>> {
        match self {
            SensorHandle::Register { adapter, .. } => {
                Some(adapter.write_environment(humidity, temperature))
            }
            _ => None,
        }
    }

    /// Put the device back into idle before the bus is released
    pub fn shutdown(&mut self) {
        if let SensorHandle::Command(adapter) = self {
            if let Err(e) = adapter.stop_periodic_measurement() {
                warn!("Failed to stop periodic measurement: {}", e);
            }
        }
    }
}

impl Recoverable for SensorHandle {
    fn read_checked(&mut self) -> Result<Reading> {
        let reading = self.read()?;
        if let Err(rejection) = plausibility::check(&reading) {
            if rejection.needs_reinit() {
                if let SensorHandle::Register { adapter, .. } = self {
                    adapter.mark_recovering();
                }
            }
            return Err(rejection.into());
        }
        Ok(reading)
    }

    fn reinit(&mut self) -> Result<()> {
        match self {
            SensorHandle::Register { adapter, params } => adapter.init(*params),
            SensorHandle::Command(adapter) => adapter.reinit(),
            SensorHandle::Simulator(_) => Ok(()),
        }
    }

    fn label(&self) -> String {
        match self {
            SensorHandle::Simulator(sim) => format!("simulated {}", sim.kind()),
            other => other.kind().to_string(),
        }
    }
}
