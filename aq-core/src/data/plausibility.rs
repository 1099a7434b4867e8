//! Plausibility filter
//!
//! Rejects readings that decode cleanly but cannot be real: values outside the
//! range the sensor family can report, all-zero results, stuck-bus fill
//! patterns and results flagged by the device itself.
//!
//! Limits are per sensor family:
//!
//! | family   | CO2 (ppm)   | TVOC (ppb) | temperature (C) | humidity (%RH) |
//! |----------|-------------|------------|-----------------|----------------|
//! | register | 400 - 5000  | 0 - 10000  | -               | -              |
//! | command  | 350 - 5000  | -          | -40 - 85        | 0 - 100        |

use std::fmt;

use crate::constants::limits;
use crate::constants::register_sensor::error_id;
use crate::data::types::{CommandReading, DeviceFault, Reading, RegisterReading};
use crate::error::SensorError;

/// Why a reading was refused
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Both key values exactly zero
    AllZero,
    /// Every raw byte is a known fill value, or eCO2 holds the 0x80xx sentinel
    StuckBus,
    Co2OutOfRange(u16),
    TvocOutOfRange(u16),
    TemperatureOutOfRange(f32),
    HumidityOutOfRange(f32),
    NotANumber,
    /// Device raised its ERROR flag or a fault bit that invalidates the result
    DeviceFault { status: u8, faults: Vec<DeviceFault> },
}

impl Rejection {
    /// Whether the device asked for its application to be restarted
    pub fn needs_reinit(&self) -> bool {
        match self {
            Rejection::DeviceFault { faults, .. } => {
                faults.contains(&DeviceFault::ApplicationInvalid)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::AllZero => write!(f, "all key values are zero"),
            Rejection::StuckBus => write!(f, "raw block matches stuck-bus fill pattern"),
            Rejection::Co2OutOfRange(v) => write!(f, "CO2 {} ppm out of range", v),
            Rejection::TvocOutOfRange(v) => write!(f, "TVOC {} ppb out of range", v),
            Rejection::TemperatureOutOfRange(v) => write!(f, "temperature {:.2} C out of range", v),
            Rejection::HumidityOutOfRange(v) => write!(f, "humidity {:.2} %RH out of range", v),
            Rejection::NotANumber => write!(f, "value is NaN"),
            Rejection::DeviceFault { status, faults } => {
                let names: Vec<String> = faults.iter().map(|fault| fault.to_string()).collect();
                write!(f, "device fault (STATUS=0x{:02X}) [{}]", status, names.join(", "))
            }
        }
    }
}

impl From<Rejection> for SensorError {
    fn from(rejection: Rejection) -> Self {
        SensorError::PlausibilityRejected(rejection.to_string())
    }
}

/// Whether `raw` looks like a stuck bus rather than data
pub fn is_stuck_bus(raw: &[u8]) -> bool {
    !raw.is_empty() && raw.iter().all(|b| limits::FILL_BYTES.contains(b))
}

/// Check a reading from either family
pub fn check(reading: &Reading) -> Result<(), Rejection> {
    match reading {
        Reading::Register(r) => check_register(r),
        Reading::Command(r) => check_command(r),
    }
}

pub fn check_register(r: &RegisterReading) -> Result<(), Rejection> {
    if is_stuck_bus(&r.raw) || (r.raw[0] & 0x80 != 0 && r.raw[1] == 0x00) {
        return Err(Rejection::StuckBus);
    }
    if r.has_error() || r.error_id & (error_id::APP_INVALID | error_id::HEATER_SUPPLY) != 0 {
        return Err(Rejection::DeviceFault {
            status: r.status,
            faults: r.faults(),
        });
    }
    if r.eco2 == 0 && r.tvoc == 0 {
        return Err(Rejection::AllZero);
    }
    if !(limits::REGISTER_CO2_MIN..=limits::REGISTER_CO2_MAX).contains(&r.eco2) {
        return Err(Rejection::Co2OutOfRange(r.eco2));
    }
    if !(limits::TVOC_MIN..=limits::TVOC_MAX).contains(&r.tvoc) {
        return Err(Rejection::TvocOutOfRange(r.tvoc));
    }
    Ok(())
}

pub fn check_command(r: &CommandReading) -> Result<(), Rejection> {
    if is_stuck_bus(&r.raw) {
        return Err(Rejection::StuckBus);
    }
    if r.temperature.is_nan() || r.humidity.is_nan() {
        return Err(Rejection::NotANumber);
    }
    if r.co2 == 0 && r.temperature == 0.0 {
        return Err(Rejection::AllZero);
    }
    if !(limits::COMMAND_CO2_MIN..=limits::COMMAND_CO2_MAX).contains(&r.co2) {
        return Err(Rejection::Co2OutOfRange(r.co2));
    }
    if !(limits::TEMPERATURE_MIN..=limits::TEMPERATURE_MAX).contains(&r.temperature) {
        return Err(Rejection::TemperatureOutOfRange(r.temperature));
    }
    if !(limits::HUMIDITY_MIN..=limits::HUMIDITY_MAX).contains(&r.humidity) {
        return Err(Rejection::HumidityOutOfRange(r.humidity));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::register_sensor::status;

    fn register(eco2: u16, tvoc: u16, status: u8, error_id: u8) -> RegisterReading {
        let [c0, c1] = eco2.to_be_bytes();
        let [t0, t1] = tvoc.to_be_bytes();
        RegisterReading::from_block([c0, c1, t0, t1, status, error_id, 0x00, 0x00])
    }

    fn command(co2: u16, temperature: f32, humidity: f32) -> CommandReading {
        CommandReading {
            co2,
            temperature,
            humidity,
            raw: [0x11; 18],
        }
    }

    const OK_STATUS: u8 = status::DATA_READY | status::APP_VALID;

    #[test]
    fn test_register_accepts_normal() {
        assert!(check_register(&register(415, 12, OK_STATUS, 0)).is_ok());
        assert!(check_register(&register(400, 0, OK_STATUS, 0)).is_ok());
        assert!(check_register(&register(5000, 10000, OK_STATUS, 0)).is_ok());
    }

    #[test]
    fn test_register_range_limits() {
        assert_eq!(
            check_register(&register(399, 5, OK_STATUS, 0)),
            Err(Rejection::Co2OutOfRange(399))
        );
        assert_eq!(
            check_register(&register(5001, 5, OK_STATUS, 0)),
            Err(Rejection::Co2OutOfRange(5001))
        );
        assert_eq!(
            check_register(&register(500, 10001, OK_STATUS, 0)),
            Err(Rejection::TvocOutOfRange(10001))
        );
    }

    #[test]
    fn test_register_all_zero() {
        assert_eq!(check_register(&register(0, 0, OK_STATUS, 0)), Err(Rejection::AllZero));
    }

    #[test]
    fn test_register_fill_patterns() {
        let stuck = RegisterReading::from_block([0xFF; 8]);
        assert_eq!(check_register(&stuck), Err(Rejection::StuckBus));

        let mixed = RegisterReading::from_block([0xFD, 0xFF, 0x7F, 0xFF, 0xFD, 0x7F, 0xFF, 0xFF]);
        assert_eq!(check_register(&mixed), Err(Rejection::StuckBus));

        let sentinel = RegisterReading::from_block([0x80, 0x00, 0x00, 0x05, OK_STATUS, 0, 0, 0]);
        assert_eq!(check_register(&sentinel), Err(Rejection::StuckBus));
    }

    #[test]
    fn test_register_device_fault_decoded() {
        let r = register(450, 3, OK_STATUS | status::ERROR, 0x02);
        let rejection = check_register(&r).unwrap_err();
        assert!(rejection.needs_reinit());
        assert!(rejection.to_string().contains("APP_INVALID"));

        let heater = register(450, 3, OK_STATUS, 0x04);
        assert_eq!(
            check_register(&heater),
            Err(Rejection::DeviceFault {
                status: OK_STATUS,
                faults: vec![DeviceFault::HeaterSupplyFault],
            })
        );
    }

    #[test]
    fn test_command_accepts_normal() {
        assert!(check_command(&command(415, 22.5, 40.0)).is_ok());
        assert!(check_command(&command(350, -40.0, 0.0)).is_ok());
    }

    #[test]
    fn test_command_limits() {
        assert_eq!(check_command(&command(349, 20.0, 40.0)), Err(Rejection::Co2OutOfRange(349)));
        assert_eq!(check_command(&command(0, 0.0, 40.0)), Err(Rejection::AllZero));
        assert_eq!(
            check_command(&command(500, 90.0, 40.0)),
            Err(Rejection::TemperatureOutOfRange(90.0))
        );
        assert_eq!(
            check_command(&command(500, 20.0, 101.0)),
            Err(Rejection::HumidityOutOfRange(101.0))
        );
        assert_eq!(check_command(&command(500, f32::NAN, 40.0)), Err(Rejection::NotANumber));
    }

    #[test]
    fn test_rejection_converts_to_error() {
        let err: SensorError = Rejection::Co2OutOfRange(9999).into();
        assert!(matches!(err, SensorError::PlausibilityRejected(ref m) if m.contains("9999")));
    }
}
