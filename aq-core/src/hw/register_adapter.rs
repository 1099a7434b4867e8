//! Register-addressed gas sensor adapter
//!
//! Drives a CCS811-family eCO2/TVOC sensor: hardware ID check, application
//! start, baseline restore, drive mode configuration and result reads.
//!
//! # State
//!
//! ```text
//! Uninit --init--> Ready --read fault--> Recovering --init--> Ready
//!                                                   \--init fails--> Failed
//! ```

use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::register_sensor::{self, reg, status, ENV_SCALE, ENV_TEMP_OFFSET, RESULT_LEN};
use crate::data::calibration::CalibrationStore;
use crate::data::config::SensorTimings;
use crate::data::types::{DriveMode, RegisterReading};
use crate::error::{Result, SensorError};
use crate::hw::transport::Transport;

/// Lifecycle of a hardware adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninit,
    Ready,
    Recovering,
    Failed,
}

/// Init parameters kept for re-initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterInit {
    pub restore_calibration: bool,
    pub drive_mode: DriveMode,
    pub interrupt: bool,
}

impl Default for RegisterInit {
    fn default() -> Self {
        Self {
            restore_calibration: true,
            drive_mode: DriveMode::EverySecond,
            interrupt: false,
        }
    }
}

pub struct RegisterAdapter {
    transport: Transport,
    address: u16,
    store: CalibrationStore,
    timings: SensorTimings,
    state: AdapterState,
}

impl RegisterAdapter {
    pub fn new(
        transport: Transport,
        address: u16,
        store: CalibrationStore,
        timings: SensorTimings,
    ) -> Self {
        Self {
            transport,
            address,
            store,
            timings,
            state: AdapterState::Uninit,
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    /// Whether the last init completed, so the live baseline is meaningful
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, AdapterState::Ready | AdapterState::Recovering)
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    /// Bring the sensor from boot mode into measuring
    ///
    /// Fatal errors: [`SensorError::UnexpectedHardware`] and
    /// [`SensorError::FirmwareNotReady`]. Baseline restore problems are
    /// logged and never fail init.
    pub fn init(&mut self, params: RegisterInit) -> Result<()> {
        let result = self.run_init(params);
        self.state = match result {
            Ok(()) => AdapterState::Ready,
            Err(_) => AdapterState::Failed,
        };
        result
    }

    fn run_init(&mut self, params: RegisterInit) -> Result<()> {
        let hw_id = self.read_byte(reg::HW_ID)?;
        if hw_id != register_sensor::HW_ID {
            return Err(SensorError::UnexpectedHardware {
                expected: register_sensor::HW_ID,
                found: hw_id,
            });
        }

        let status_byte = self.read_byte(reg::STATUS)?;
        if status_byte & status::APP_VALID == 0 {
            return Err(SensorError::FirmwareNotReady { status: status_byte });
        }

        self.transport
            .send(self.address, &[register_sensor::CMD_APP_START])?;
        sleep(self.timings.app_start_settle);

        if params.restore_calibration {
            self.restore_calibration();
        }

        let mode = params.drive_mode.meas_mode(params.interrupt);
        self.transport.write(self.address, reg::MEAS_MODE, &[mode])?;
        sleep(self.timings.write_settle);

        info!(
            "Register sensor 0x{:02X} ready (MEAS_MODE=0x{:02X})",
            self.address, mode
        );
        Ok(())
    }

    fn restore_calibration(&mut self) {
        let stored = match self.store.load() {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to load stored baseline: {}", e);
                return;
            }
        };

        if let Err(e) = self.write_calibration(stored) {
            warn!("Failed to restore baseline 0x{:04X}: {}", stored, e);
            return;
        }
        sleep(self.timings.write_settle);

        match self.read_calibration() {
            Ok(read_back) if read_back == stored => {
                info!("Restored baseline 0x{:04X} (verified)", stored);
            }
            Ok(read_back) => {
                warn!(
                    "Baseline read-back mismatch: wrote 0x{:04X}, read 0x{:04X}",
                    stored, read_back
                );
            }
            Err(e) => {
                warn!("Restored baseline 0x{:04X} but read-back failed: {}", stored, e);
            }
        }
    }

    /// Read and decode the 8-byte result block
    pub fn read(&mut self) -> Result<RegisterReading> {
        let data = match self
            .transport
            .read(self.address, reg::ALG_RESULT_DATA, RESULT_LEN)
        {
            Ok(data) => data,
            Err(e) => {
                self.mark_recovering();
                return Err(e);
            }
        };
        let block: [u8; RESULT_LEN] = data.as_slice().try_into().map_err(|_| {
            SensorError::ShortResponse {
                expected: RESULT_LEN,
                found: data.len(),
            }
        })?;
        let reading = RegisterReading::from_block(block);
        debug!(
            "Register sensor: eCO2={} TVOC={} STATUS=0x{:02X} ERROR_ID=0x{:02X}",
            reading.eco2, reading.tvoc, reading.status, reading.error_id
        );
        Ok(reading)
    }

    /// Flag the adapter as awaiting re-initialization
    pub fn mark_recovering(&mut self) {
        if self.state == AdapterState::Ready {
            self.state = AdapterState::Recovering;
        }
    }

    pub fn read_calibration(&mut self) -> Result<u16> {
        let data = self.transport.read(self.address, reg::BASELINE, 2)?;
        match data.as_slice() {
            [msb, lsb] => Ok(u16::from_be_bytes([*msb, *lsb])),
            _ => Err(SensorError::ShortResponse {
                expected: 2,
                found: data.len(),
            }),
        }
    }

    pub fn write_calibration(&mut self, value: u16) -> Result<()> {
        self.transport
            .write(self.address, reg::BASELINE, &value.to_be_bytes())
    }

    /// Read the live baseline and persist it atomically
    pub fn save_calibration_to_store(&mut self, path: &Path) -> Result<u16> {
        let value = self.read_calibration()?;
        CalibrationStore::new(path).save(value)?;
        info!("Saved baseline 0x{:04X} to {:?}", value, path);
        Ok(value)
    }

    /// Persist the live baseline to the configured store
    pub fn save_calibration(&mut self) -> Result<u16> {
        let path = self.store.path().to_path_buf();
        self.save_calibration_to_store(&path)
    }

    /// Feed ambient humidity/temperature for compensation (ENV_DATA)
    pub fn write_environment(&mut self, humidity: f32, temperature: f32) -> Result<()> {
        let payload = encode_environment(humidity, temperature);
        self.transport.write(self.address, reg::ENV_DATA, &payload)
    }

    fn read_byte(&mut self, register: u8) -> Result<u8> {
        let data = self.transport.read(self.address, register, 1)?;
        data.first().copied().ok_or(SensorError::ShortResponse {
            expected: 1,
            found: 0,
        })
    }
}

/// ENV_DATA payload: humidity and offset temperature in 1/512 units, big-endian
pub fn encode_environment(humidity: f32, temperature: f32) -> [u8; 4] {
    let to_word = |v: f32| (v * ENV_SCALE).round().clamp(0.0, f32::from(u16::MAX)) as u16;
    let [h0, h1] = to_word(humidity).to_be_bytes();
    let [t0, t1] = to_word(temperature + ENV_TEMP_OFFSET).to_be_bytes();
    [h0, h1, t0, t1]
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
