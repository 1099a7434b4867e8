//! Core data types for aqlog
//!
//! Samples handed to consumers and the raw readings each adapter produces.

use serde::{Deserialize, Serialize};

use crate::constants::register_sensor::{error_id, status};

/// One sensor observation, as published to the sample buffer
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity percent
    #[serde(default)]
    pub humidity: Option<f32>,
    /// Sound level in dB (placeholder until a microphone input exists)
    #[serde(default)]
    pub sound_db: Option<f32>,
    /// CO2 concentration in ppm
    pub co2: u16,
    /// VOC concentration in ppb
    #[serde(default)]
    pub voc: Option<u16>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

/// Which sensor family a handle stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Register-addressed gas sensor (eCO2/TVOC)
    Register,
    /// Command-word sensor with checksummed words (CO2/temperature/humidity)
    Command,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Register => write!(f, "register sensor"),
            SensorKind::Command => write!(f, "command sensor"),
        }
    }
}

/// Register sensor measurement cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// Idle, no measurements
    Idle,
    /// Constant power, one measurement per second
    #[default]
    EverySecond,
    /// Pulse heating, every 10 seconds
    EveryTenSeconds,
    /// Low-power pulse heating, every 60 seconds
    EveryMinute,
    /// Constant power, raw data every 250 ms
    Every250Millis,
}

impl DriveMode {
    /// Mode by its datasheet index (0-4)
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(DriveMode::Idle),
            1 => Some(DriveMode::EverySecond),
            2 => Some(DriveMode::EveryTenSeconds),
            3 => Some(DriveMode::EveryMinute),
            4 => Some(DriveMode::Every250Millis),
            _ => None,
        }
    }

    /// DRIVE_MODE field as it sits in MEAS_MODE bits 6:4
    pub fn register_bits(self) -> u8 {
        let index = match self {
            DriveMode::Idle => 0,
            DriveMode::EverySecond => 1,
            DriveMode::EveryTenSeconds => 2,
            DriveMode::EveryMinute => 3,
            DriveMode::Every250Millis => 4,
        };
        index << 4
    }

    /// Full MEAS_MODE register value
    pub fn meas_mode(self, interrupt: bool) -> u8 {
        let mut value = self.register_bits();
        if interrupt {
            value |= crate::constants::register_sensor::MEAS_MODE_INTERRUPT;
        }
        value
    }
}

/// Fault reported through the register sensor's ERROR_ID byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFault {
    MessageInvalid,
    ApplicationInvalid,
    HeaterSupplyFault,
    HeaterFault,
    ResistanceOutOfRange,
    /// Bits with no documented meaning; carries the full ERROR_ID byte
    Unknown(u8),
}

impl DeviceFault {
    /// Decode every set bit of an ERROR_ID byte
    ///
    /// Undocumented bits produce one `Unknown` entry rather than being dropped.
    pub fn decode(code: u8) -> Vec<DeviceFault> {
        const KNOWN: [(u8, DeviceFault); 5] = [
            (error_id::MSG_INVALID, DeviceFault::MessageInvalid),
            (error_id::APP_INVALID, DeviceFault::ApplicationInvalid),
            (error_id::HEATER_SUPPLY, DeviceFault::HeaterSupplyFault),
            (error_id::HEATER_FAULT, DeviceFault::HeaterFault),
            (error_id::MAX_RESISTANCE, DeviceFault::ResistanceOutOfRange),
        ];

        let mut faults: Vec<DeviceFault> = KNOWN
            .iter()
            .filter(|(bit, _)| code & bit != 0)
            .map(|(_, fault)| *fault)
            .collect();
        if code & !error_id::KNOWN_MASK != 0 {
            faults.push(DeviceFault::Unknown(code));
        }
        faults
    }
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFault::MessageInvalid => write!(f, "MSG_INVALID"),
            DeviceFault::ApplicationInvalid => write!(f, "APP_INVALID"),
            DeviceFault::HeaterSupplyFault => write!(f, "HEATER_SUPPLY"),
            DeviceFault::HeaterFault => write!(f, "HEATER_FAULT"),
            DeviceFault::ResistanceOutOfRange => write!(f, "MAX_RESISTANCE"),
            DeviceFault::Unknown(code) => write!(f, "UNKNOWN(0x{:02X})", code),
        }
    }
}

/// Decoded ALG_RESULT_DATA block of the register sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterReading {
    pub eco2: u16,
    pub tvoc: u16,
    pub status: u8,
    pub error_id: u8,
    pub raw: [u8; 8],
}

impl RegisterReading {
    /// Decode an 8-byte result block
    pub fn from_block(raw: [u8; 8]) -> Self {
        Self {
            eco2: u16::from_be_bytes([raw[0], raw[1]]),
            tvoc: u16::from_be_bytes([raw[2], raw[3]]),
            status: raw[4],
            error_id: raw[5],
            raw,
        }
    }

    /// Whether the STATUS byte flags an error
    pub fn has_error(&self) -> bool {
        self.status & status::ERROR != 0
    }

    pub fn faults(&self) -> Vec<DeviceFault> {
        DeviceFault::decode(self.error_id)
    }
}

/// Checksum-validated measurement of the command sensor
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReading {
    pub co2: u16,
    pub temperature: f32,
    pub humidity: f32,
    pub raw: [u8; 18],
}

/// A reading from whichever handle occupies a slot
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Register(RegisterReading),
    Command(CommandReading),
}

impl Reading {
    pub fn kind(&self) -> SensorKind {
        match self {
            Reading::Register(_) => SensorKind::Register,
            Reading::Command(_) => SensorKind::Command,
        }
    }

    pub fn co2(&self) -> u16 {
        match self {
            Reading::Register(r) => r.eco2,
            Reading::Command(r) => r.co2,
        }
    }

    pub fn raw(&self) -> &[u8] {
        match self {
            Reading::Register(r) => &r.raw,
            Reading::Command(r) => &r.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_mode_register_values() {
        assert_eq!(DriveMode::Idle.meas_mode(false), 0x00);
        assert_eq!(DriveMode::EverySecond.meas_mode(false), 0x10);
        assert_eq!(DriveMode::EveryTenSeconds.meas_mode(false), 0x20);
        assert_eq!(DriveMode::EveryMinute.meas_mode(false), 0x30);
        assert_eq!(DriveMode::Every250Millis.meas_mode(false), 0x40);
        assert_eq!(DriveMode::EverySecond.meas_mode(true), 0x18);
    }

    #[test]
    fn test_drive_mode_from_index() {
        assert_eq!(DriveMode::from_index(1), Some(DriveMode::EverySecond));
        assert_eq!(DriveMode::from_index(4), Some(DriveMode::Every250Millis));
        assert_eq!(DriveMode::from_index(5), None);
    }

    #[test]
    fn test_fault_decode_bits() {
        assert!(DeviceFault::decode(0x00).is_empty());
        assert_eq!(DeviceFault::decode(0x02), vec![DeviceFault::ApplicationInvalid]);
        assert_eq!(
            DeviceFault::decode(0x0C),
            vec![DeviceFault::HeaterSupplyFault, DeviceFault::HeaterFault]
        );
        assert_eq!(
            DeviceFault::decode(0x1F).len(),
            5
        );
    }

    #[test]
    fn test_fault_decode_unknown_never_dropped() {
        assert_eq!(DeviceFault::decode(0x40), vec![DeviceFault::Unknown(0x40)]);
        assert_eq!(
            DeviceFault::decode(0x81),
            vec![DeviceFault::MessageInvalid, DeviceFault::Unknown(0x81)]
        );
        assert_eq!(DeviceFault::Unknown(0x40).to_string(), "UNKNOWN(0x40)");
    }

    #[test]
    fn test_register_reading_decode() {
        let r = RegisterReading::from_block([0x01, 0xA0, 0x00, 0x0C, 0x98, 0x00, 0x12, 0x34]);
        assert_eq!(r.eco2, 416);
        assert_eq!(r.tvoc, 12);
        assert_eq!(r.status, 0x98);
        assert_eq!(r.error_id, 0);
        assert!(!r.has_error());
    }

    #[test]
    fn test_sample_json_shape() {
        let sample = Sample {
            temperature: 21.5,
            humidity: Some(40.0),
            sound_db: None,
            co2: 612,
            voc: Some(33),
            timestamp: 1_700_000_000.5,
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"co2\":612"));
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }
}
