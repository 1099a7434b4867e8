//! Calibration value persistence
//!
//! The file holds exactly two bytes: the baseline as a big-endian u16.
//! No header, no versioning. Anything else on disk is treated as absent.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SensorError};

/// On-disk size of a calibration file
pub const FILE_LEN: usize = 2;

/// Stateless access to one calibration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored value
    ///
    /// Returns `Ok(None)` when the file is missing or has the wrong length.
    pub fn load(&self) -> Result<Option<u16>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No calibration file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(SensorError::persistence(&self.path, e)),
        };

        match <[u8; FILE_LEN]>::try_from(bytes.as_slice()) {
            Ok(word) => Ok(Some(u16::from_be_bytes(word))),
            Err(_) => {
                warn!(
                    "Ignoring calibration file {:?}: expected {} bytes, found {}",
                    self.path,
                    FILE_LEN,
                    bytes.len()
                );
                Ok(None)
            }
        }
    }

    /// Persist `value` atomically
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the target so
    /// a crash leaves either the old or the new value on disk.
    pub fn save(&self, value: u16) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| SensorError::persistence(parent, e))?;
            }
        }

        let temp_path = self.temp_path();
        let mut file =
            fs::File::create(&temp_path).map_err(|e| SensorError::persistence(&temp_path, e))?;
        file.write_all(&value.to_be_bytes())
            .map_err(|e| SensorError::persistence(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| SensorError::persistence(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            SensorError::persistence(&self.path, e)
        })?;

        debug!("Saved calibration 0x{:04X} to {:?}", value, self.path);
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CalibrationStore {
        CalibrationStore::new(dir.path().join("calibration.bin"))
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).load().unwrap(), None);
    }

    #[test]
    fn test_round_trip_every_value() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for value in 0..=u16::MAX {
            store.save(value).unwrap();
            assert_eq!(store.load().unwrap(), Some(value));
        }
    }

    #[test]
    fn test_file_is_two_bytes_big_endian() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(0xA000).unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), vec![0xA0, 0x00]);
        assert!(!dir.path().join("calibration.bin.tmp").exists());
    }

    #[test]
    fn test_wrong_length_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        fs::write(store.path(), [0x12]).unwrap();
        assert_eq!(store.load().unwrap(), None);

        fs::write(store.path(), [0x12, 0x34, 0x56]).unwrap();
        assert_eq!(store.load().unwrap(), None);

        fs::write(store.path(), []).unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path().join("a/b/calibration.bin"));
        store.save(0x1234).unwrap();
        assert_eq!(store.load().unwrap(), Some(0x1234));
    }

    #[test]
    fn test_save_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(1).unwrap();
        store.save(2).unwrap();
        assert_eq!(store.load().unwrap(), Some(2));
    }

    #[test]
    fn test_save_into_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let store = CalibrationStore::new(blocker.join("calibration.bin"));
        let err = store.save(7).unwrap_err();
        assert!(matches!(err, SensorError::Persistence { .. }));
    }
}
