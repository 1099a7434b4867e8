//! Unified error handling for aqlog
//!
//! This crate provides a single error type used across all aqlog components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using SensorError
pub type Result<T> = std::result::Result<T, SensorError>;

/// Unified error type for all aqlog operations
#[derive(thiserror::Error, Debug)]
pub enum SensorError {
    // ============================================================================
    // Bus Errors
    // ============================================================================
    #[error("Bus transfer failed ({op}): {source}")]
    Transport {
        op: String,
        transient: bool,
        #[source]
        source: io::Error,
    },

    #[error("Bus unavailable at {path}: {source}")]
    BusUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // ============================================================================
    // Sensor Initialization Errors
    // ============================================================================
    #[error("Unexpected hardware ID 0x{found:02X} (expected 0x{expected:02X})")]
    UnexpectedHardware {
        expected: u8,
        found: u8,
    },

    #[error("Firmware not ready: application not valid (STATUS=0x{status:02X})")]
    FirmwareNotReady {
        status: u8,
    },

    // ============================================================================
    // Single-Read Errors
    // ============================================================================
    #[error("Checksum mismatch in word {word} (expected 0x{expected:02X}, got 0x{found:02X})")]
    ChecksumError {
        word: usize,
        expected: u8,
        found: u8,
    },

    #[error("Reading rejected: {0}")]
    PlausibilityRejected(String),

    #[error("Short response: expected {expected} bytes, got {found}")]
    ShortResponse {
        expected: usize,
        found: usize,
    },

    // ============================================================================
    // Calibration Persistence Errors
    // ============================================================================
    #[error("Calibration persistence failed for {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // ============================================================================
    // Reset Line Errors
    // ============================================================================
    #[error("Reset line {line}: {reason}")]
    ResetLine {
        line: String,
        reason: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SensorError {
    /// Create a transport error for a named bus operation
    pub fn transport(op: impl Into<String>, transient: bool, source: io::Error) -> Self {
        Self::Transport {
            op: op.into(),
            transient,
            source,
        }
    }

    /// Create a persistence error
    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a reset line error
    pub fn reset_line(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResetLine {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { transient: true, .. })
    }

    /// Whether this error prevents an adapter from initializing at all
    pub fn is_init_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedHardware { .. } | Self::FirmwareNotReady { .. } | Self::BusUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let err = SensorError::transport("read 0x02", true, io::Error::from_raw_os_error(5));
        assert!(err.is_transient());

        let err = SensorError::transport("read 0x02", false, io::Error::from_raw_os_error(19));
        assert!(!err.is_transient());

        assert!(!SensorError::ChecksumError { word: 0, expected: 1, found: 2 }.is_transient());
    }

    #[test]
    fn test_init_fatal_classification() {
        assert!(SensorError::UnexpectedHardware { expected: 0x81, found: 0x00 }.is_init_fatal());
        assert!(SensorError::FirmwareNotReady { status: 0x00 }.is_init_fatal());
        assert!(!SensorError::PlausibilityRejected("zero".into()).is_init_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = SensorError::UnexpectedHardware { expected: 0x81, found: 0x42 };
        assert_eq!(err.to_string(), "Unexpected hardware ID 0x42 (expected 0x81)");

        let err = SensorError::FirmwareNotReady { status: 0x00 };
        assert!(err.to_string().contains("STATUS=0x00"));
    }
}
