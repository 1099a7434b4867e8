//! Hardware reset line
//!
//! Drives the register sensor's active-low reset pin. A pulse is: drive low,
//! hold, drive high, wait for the device to boot.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::constants::reset;
use crate::error::{Result, SensorError};

/// Output line wired to a sensor reset pin
pub trait ResetLine: Send {
    /// Drive the line high (`true`) or low (`false`)
    fn set_level(&mut self, high: bool) -> Result<()>;

    /// Identifier used in log messages
    fn name(&self) -> String;

    /// Low for `hold`, then high and wait `settle`
    ///
    /// The line is driven high again even when `hold` is zero.
    fn pulse(&mut self, hold: Duration, settle: Duration) -> Result<()> {
        self.set_level(false)?;
        if !hold.is_zero() {
            thread::sleep(hold);
        }
        self.set_level(true)?;
        if !settle.is_zero() {
            thread::sleep(settle);
        }
        Ok(())
    }
}

/// GPIO line through the legacy sysfs interface
pub struct SysfsResetLine {
    line: u32,
    value_path: PathBuf,
}

impl SysfsResetLine {
    /// Export `line` if needed and configure it as an output driven high
    pub fn open(line: u32) -> Result<Self> {
        Self::with_base(reset::SYSFS_GPIO_BASE, line)
    }

    pub fn with_base(base: impl AsRef<Path>, line: u32) -> Result<Self> {
        let base = base.as_ref();
        let gpio_dir = base.join(format!("gpio{}", line));
        let name = line.to_string();

        if !gpio_dir.exists() {
            fs::write(base.join("export"), &name)
                .map_err(|e| SensorError::reset_line(&name, format!("Failed to export: {}", e)))?;
            debug!("Exported GPIO {}", line);
        }

        // "high" sets the direction to output with the line already released
        fs::write(gpio_dir.join("direction"), "high")
            .map_err(|e| SensorError::reset_line(&name, format!("Failed to set direction: {}", e)))?;

        info!("Reset line ready on GPIO {}", line);
        Ok(Self {
            line,
            value_path: gpio_dir.join("value"),
        })
    }
}

impl ResetLine for SysfsResetLine {
    fn set_level(&mut self, high: bool) -> Result<()> {
        let value = if high { "1" } else { "0" };
        fs::write(&self.value_path, value).map_err(|e| {
            SensorError::reset_line(
                self.line.to_string(),
                format!("Failed to write {} to {:?}: {}", value, self.value_path, e),
            )
        })
    }

    fn name(&self) -> String {
        format!("GPIO {}", self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::RecordingResetLine;
    use tempfile::TempDir;

    struct BrokenLine;

    impl ResetLine for BrokenLine {
        fn set_level(&mut self, _high: bool) -> Result<()> {
            Err(SensorError::reset_line("18", "gone"))
        }

        fn name(&self) -> String {
            "broken".to_string()
        }
    }

    #[test]
    fn test_pulse_goes_low_then_high() {
        let mut line = RecordingResetLine::new();
        line.pulse(Duration::ZERO, Duration::ZERO).unwrap();
        assert_eq!(line.levels(), vec![false, true]);
        assert_eq!(line.pulse_count(), 1);
    }

    #[test]
    fn test_pulse_stops_on_error() {
        assert!(BrokenLine.pulse(Duration::ZERO, Duration::ZERO).is_err());
    }

    #[test]
    fn test_sysfs_line_writes_values() {
        let dir = TempDir::new().unwrap();
        let gpio = dir.path().join("gpio18");
        fs::create_dir(&gpio).unwrap();

        let mut line = SysfsResetLine::with_base(dir.path(), 18).unwrap();
        assert_eq!(fs::read_to_string(gpio.join("direction")).unwrap(), "high");

        line.set_level(false).unwrap();
        assert_eq!(fs::read_to_string(gpio.join("value")).unwrap(), "0");
        line.pulse(Duration::ZERO, Duration::ZERO).unwrap();
        assert_eq!(fs::read_to_string(gpio.join("value")).unwrap(), "1");
        assert_eq!(line.name(), "GPIO 18");
    }

    #[test]
    fn test_sysfs_export_failure() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = SysfsResetLine::with_base(&missing, 5).err().unwrap();
        assert!(matches!(err, SensorError::ResetLine { .. }));
    }
}
