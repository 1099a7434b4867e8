//! Command-word sensor adapter
//!
//! Drives an SCD4x-family CO2/temperature/humidity sensor. Every response word
//! carries a CRC-8; a single bad checksum discards the whole measurement.
//!
//! # Measurement frame
//!
//! ```text
//! | CO2 hi | crc | CO2 lo | crc | T hi | crc | T lo | crc | RH hi | crc | RH lo | crc |
//! ```
//!
//! Each value is a big-endian IEEE-754 f32 split across two words.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::command_sensor::{
    CMD_READ_MEASUREMENT, CMD_START_PERIODIC, CMD_STOP_PERIODIC, MEASUREMENT_LEN,
};
use crate::data::config::SensorTimings;
use crate::data::types::CommandReading;
use crate::error::{Result, SensorError};
use crate::hw::crc::crc8;
use crate::hw::register_adapter::AdapterState;
use crate::hw::transport::Transport;

pub struct CommandAdapter {
    transport: Transport,
    address: u16,
    timings: SensorTimings,
    state: AdapterState,
}

impl CommandAdapter {
    pub fn new(transport: Transport, address: u16, timings: SensorTimings) -> Self {
        Self {
            transport,
            address,
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

    pub fn start_periodic_measurement(&mut self) -> Result<()> {
        let result = self
            .transport
            .send(self.address, &CMD_START_PERIODIC.to_be_bytes());
        sleep(self.timings.command_settle);
        self.state = match result {
            Ok(()) => AdapterState::Ready,
            Err(_) => AdapterState::Failed,
        };
        result?;
        info!("Command sensor 0x{:02X} started periodic measurement", self.address);
        Ok(())
    }

    pub fn stop_periodic_measurement(&mut self) -> Result<()> {
        self.transport
            .send(self.address, &CMD_STOP_PERIODIC.to_be_bytes())?;
        sleep(self.timings.command_settle);
        self.state = AdapterState::Uninit;
        debug!("Command sensor 0x{:02X} stopped periodic measurement", self.address);
        Ok(())
    }

    /// Stop (errors ignored), wait for the sensor to go idle, start again
    pub fn reinit(&mut self) -> Result<()> {
        if let Err(e) = self.stop_periodic_measurement() {
            debug!("Ignoring stop failure before restart: {}", e);
        }
        sleep(self.timings.stop_settle);
        self.start_periodic_measurement()
    }

    /// Fetch and validate one measurement
    pub fn read_measurement(&mut self) -> Result<CommandReading> {
        let data = self
            .transport
            .read_command_response(
                self.address,
                CMD_READ_MEASUREMENT,
                MEASUREMENT_LEN,
                self.timings.read_delay,
            )
            .and_then(|data| decode_measurement(&data));

        match data {
            Ok(reading) => {
                debug!(
                    "Command sensor: CO2={} T={:.2} RH={:.2}",
                    reading.co2, reading.temperature, reading.humidity
                );
                Ok(reading)
            }
            Err(e) => {
                if self.state == AdapterState::Ready {
                    self.state = AdapterState::Recovering;
                }
                if matches!(e, SensorError::ChecksumError { .. }) {
                    warn!("Command sensor frame discarded: {}", e);
                }
                Err(e)
            }
        }
    }
}

/// Decode an 18-byte measurement frame
///
/// Fails on any checksum mismatch before any value is decoded.
pub fn decode_measurement(data: &[u8]) -> Result<CommandReading> {
    let raw: [u8; MEASUREMENT_LEN] = data.try_into().map_err(|_| SensorError::ShortResponse {
        expected: MEASUREMENT_LEN,
        found: data.len(),
    })?;

    for (word, chunk) in raw.chunks_exact(3).enumerate() {
        let expected = crc8(&chunk[..2]);
        if expected != chunk[2] {
            return Err(SensorError::ChecksumError {
                word,
                expected,
                found: chunk[2],
            });
        }
    }

    let value = |group: usize| {
        let g = &raw[group * 6..group * 6 + 6];
        f32::from_be_bytes([g[0], g[1], g[3], g[4]])
    };

    let co2 = value(0);
    Ok(CommandReading {
        co2: round_ppm(co2),
        temperature: value(1),
        humidity: value(2),
        raw,
    })
}

/// Nearest integer ppm, saturating; NaN becomes 0
fn round_ppm(value: f32) -> u16 {
    value.round() as u16
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::crc::encode_word;
    use crate::test_utils::test_utils::*;

    const ADDR: u16 = 0x62;

    fn adapter(bus: &FakeBus) -> CommandAdapter {
        let transport = Transport::with_retry(bus.boxed(), 3, Duration::ZERO);
        CommandAdapter::new(transport, ADDR, SensorTimings::immediate())
    }

    #[test]
    fn test_decode_rounds_co2() {
        let frame = measurement_frame(415.3, 21.25, 43.5);
        let reading = decode_measurement(&frame).unwrap();
        assert_eq!(reading.co2, 415);
        assert_eq!(reading.temperature, 21.25);
        assert_eq!(reading.humidity, 43.5);
        assert_eq!(reading.raw, frame);

        assert_eq!(decode_measurement(&measurement_frame(415.5, 0.0, 0.0)).unwrap().co2, 416);
    }

    #[test]
    fn test_checksums_re_encode_identically() {
        for (co2, t, rh) in [(400.0, 20.0, 30.0), (1234.5, -5.5, 99.0), (5000.0, 85.0, 0.0)] {
            let frame = measurement_frame(co2, t, rh);
            let reading = decode_measurement(&frame).unwrap();
            for (i, chunk) in reading.raw.chunks_exact(3).enumerate() {
                let word = u16::from_be_bytes([chunk[0], chunk[1]]);
                assert_eq!(encode_word(word)[2], frame[i * 3 + 2]);
            }
        }
    }

    #[test]
    fn test_any_mutated_checksum_fails() {
        let frame = measurement_frame(415.3, 21.0, 40.0);
        for word in 0..6 {
            for flip in [0x01u8, 0x80, 0xFF] {
                let mut bad = frame;
                bad[word * 3 + 2] ^= flip;
                match decode_measurement(&bad) {
                    Err(SensorError::ChecksumError { word: w, .. }) => assert_eq!(w, word),
                    other => panic!("expected checksum error, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_mutated_data_byte_fails() {
        let mut bad = measurement_frame(415.3, 21.0, 40.0);
        bad[7] ^= 0x10;
        assert!(matches!(
            decode_measurement(&bad),
            Err(SensorError::ChecksumError { word: 2, .. })
        ));
    }

    #[test]
    fn test_short_frame() {
        assert!(matches!(
            decode_measurement(&[0u8; 12]),
            Err(SensorError::ShortResponse { expected: 18, found: 12 })
        ));
    }

    #[test]
    fn test_round_ppm_saturates() {
        assert_eq!(round_ppm(-3.0), 0);
        assert_eq!(round_ppm(1e9), u16::MAX);
        assert_eq!(round_ppm(f32::NAN), 0);
    }

    #[test]
    fn test_start_and_read() {
        let bus = FakeBus::new().with_command_sensor(ADDR, 415.3, 22.0, 45.0);
        let mut sensor = adapter(&bus);

        sensor.start_periodic_measurement().unwrap();
        assert_eq!(sensor.state(), AdapterState::Ready);

        let reading = sensor.read_measurement().unwrap();
        assert_eq!(reading.co2, 415);
        assert_eq!(
            bus.raw_writes(ADDR),
            vec![vec![0x21, 0xB1], vec![0xEC, 0x05]]
        );
    }

    #[test]
    fn test_bad_checksum_marks_recovering() {
        let bus = FakeBus::new().with_command_sensor(ADDR, 415.3, 22.0, 45.0);
        let mut sensor = adapter(&bus);
        sensor.start_periodic_measurement().unwrap();

        let mut bad = measurement_frame(415.3, 22.0, 45.0);
        bad[2] ^= 0x01;
        bus.queue_raw_read(ADDR, Ok(bad.to_vec()));

        assert!(matches!(
            sensor.read_measurement(),
            Err(SensorError::ChecksumError { .. })
        ));
        assert_eq!(sensor.state(), AdapterState::Recovering);
        assert!(sensor.read_measurement().is_ok());
    }

    #[test]
    fn test_reinit_stops_then_starts() {
        let bus = FakeBus::new().with_command_sensor(ADDR, 415.3, 22.0, 45.0);
        let mut sensor = adapter(&bus);
        sensor.reinit().unwrap();
        assert_eq!(
            bus.raw_writes(ADDR),
            vec![vec![0x3F, 0x86], vec![0x21, 0xB1]]
        );
        assert_eq!(sensor.state(), AdapterState::Ready);
    }

    #[test]
    fn test_absent_device_fails_start() {
        let bus = FakeBus::new();
        bus.remove_device(ADDR);
        let mut sensor = adapter(&bus);
        let err = sensor.start_periodic_measurement().unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(sensor.state(), AdapterState::Failed);
    }
}
