//! Bus transport
//!
//! Thin wrapper over I2C register and raw transfers with bounded retry.
//!
//! Transient failures (EIO, EREMOTEIO, timeouts, short reads) are retried a fixed
//! number of times with a fixed delay. Errors meaning the device or bus is not
//! there at all (ENODEV, ENXIO, EACCES, ...) propagate immediately.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use tracing::{debug, trace};

use crate::constants::bus;
use crate::error::{Result, SensorError};

/// Register-level access to a two-wire bus
///
/// Implemented by [`LinuxI2cBus`] for real hardware and by fakes in tests.
#[cfg_attr(test, mockall::automock)]
pub trait I2cBus: Send {
    /// Read `buf.len()` bytes starting at `register`
    fn read_register(&mut self, address: u16, register: u8, buf: &mut [u8]) -> io::Result<()>;

    /// Write `data` starting at `register`
    fn write_register(&mut self, address: u16, register: u8, data: &[u8]) -> io::Result<()>;

    /// Plain write with no register prefix (command bytes/words)
    fn write(&mut self, address: u16, data: &[u8]) -> io::Result<()>;

    /// Plain read with no register prefix
    fn read(&mut self, address: u16, buf: &mut [u8]) -> io::Result<()>;
}

/// Linux i2c-dev backed bus
///
/// One file descriptor per target address, opened on first use.
pub struct LinuxI2cBus {
    path: PathBuf,
    devices: HashMap<u16, LinuxI2CDevice>,
}

impl LinuxI2cBus {
    /// Open the bus character device
    ///
    /// Fails with [`SensorError::BusUnavailable`] when the device node is missing
    /// or not accessible.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| SensorError::BusUnavailable { path: path.clone(), source })?;

        debug!("Opened I2C bus {:?}", path);
        Ok(Self {
            path,
            devices: HashMap::new(),
        })
    }

    fn device(&mut self, address: u16) -> io::Result<&mut LinuxI2CDevice> {
        if !self.devices.contains_key(&address) {
            let dev = LinuxI2CDevice::new(&self.path, address).map_err(io::Error::from)?;
            self.devices.insert(address, dev);
        }
        self.devices
            .get_mut(&address)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "device handle missing"))
    }
}

impl I2cBus for LinuxI2cBus {
    fn read_register(&mut self, address: u16, register: u8, buf: &mut [u8]) -> io::Result<()> {
        let len = u8::try_from(buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "block read too long"))?;
        let data = self
            .device(address)?
            .smbus_read_i2c_block_data(register, len)
            .map_err(io::Error::from)?;
        if data.len() != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short block read: {} of {} bytes", data.len(), buf.len()),
            ));
        }
        buf.copy_from_slice(&data);
        Ok(())
    }

    fn write_register(&mut self, address: u16, register: u8, data: &[u8]) -> io::Result<()> {
        self.device(address)?
            .smbus_write_i2c_block_data(register, data)
            .map_err(io::Error::from)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> io::Result<()> {
        self.device(address)?.write(data).map_err(io::Error::from)
    }

    fn read(&mut self, address: u16, buf: &mut [u8]) -> io::Result<()> {
        self.device(address)?.read(buf).map_err(io::Error::from)
    }
}

/// Whether an I/O error from the bus is worth retrying
pub fn is_transient(err: &io::Error) -> bool {
    if let Some(code) = err.raw_os_error() {
        return !matches!(
            code,
            libc::ENODEV | libc::ENOENT | libc::ENXIO | libc::EACCES | libc::EPERM | libc::EBADF
        );
    }
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput
    )
}

/// Retrying front-end to an [`I2cBus`]
///
/// Stateless per call apart from the owned bus handle.
pub struct Transport {
    bus: Box<dyn I2cBus>,
    attempts: u32,
    delay: Duration,
}

impl Transport {
    pub fn new(bus: Box<dyn I2cBus>) -> Self {
        Self::with_retry(bus, bus::RETRY_ATTEMPTS, bus::RETRY_DELAY)
    }

    pub fn with_retry(bus: Box<dyn I2cBus>, attempts: u32, delay: Duration) -> Self {
        Self {
            bus,
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Read `len` bytes from `register`
    pub fn read(&mut self, address: u16, register: u8, len: usize) -> Result<Vec<u8>> {
        let op = format!("read 0x{:02X}@0x{:02X}", register, address);
        self.retry(&op, |bus| {
            let mut buf = vec![0u8; len];
            bus.read_register(address, register, &mut buf)?;
            Ok(buf)
        })
    }

    /// Write `bytes` to `register`
    pub fn write(&mut self, address: u16, register: u8, bytes: &[u8]) -> Result<()> {
        let op = format!("write 0x{:02X}@0x{:02X}", register, address);
        self.retry(&op, |bus| bus.write_register(address, register, bytes))
    }

    /// Send raw bytes with no register prefix
    pub fn send(&mut self, address: u16, bytes: &[u8]) -> Result<()> {
        let op = format!("send {:02X?}@0x{:02X}", bytes, address);
        self.retry(&op, |bus| bus.write(address, bytes))
    }

    /// Send a 16-bit command word, wait `delay`, read `len` response bytes
    ///
    /// A retry repeats the whole exchange.
    pub fn read_command_response(
        &mut self,
        address: u16,
        command: u16,
        len: usize,
        delay: Duration,
    ) -> Result<Vec<u8>> {
        let op = format!("command 0x{:04X}@0x{:02X}", command, address);
        self.retry(&op, |bus| {
            bus.write(address, &command.to_be_bytes())?;
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            let mut buf = vec![0u8; len];
            bus.read(address, &mut buf)?;
            Ok(buf)
        })
    }

    fn retry<T>(&mut self, op: &str, mut f: impl FnMut(&mut dyn I2cBus) -> io::Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match f(self.bus.as_mut()) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let transient = is_transient(&e);
                    if !transient || attempt >= self.attempts {
                        return Err(SensorError::transport(op, transient, e));
                    }
                    trace!("{} failed (attempt {}/{}): {}", op, attempt, self.attempts, e);
                    attempt += 1;
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eio() -> io::Error {
        io::Error::from_raw_os_error(libc::EIO)
    }

    #[test]
    fn test_is_transient() {
        assert!(is_transient(&eio()));
        assert!(is_transient(&io::Error::from_raw_os_error(libc::EREMOTEIO)));
        assert!(is_transient(&io::Error::new(io::ErrorKind::UnexpectedEof, "short")));
        assert!(!is_transient(&io::Error::from_raw_os_error(libc::ENODEV)));
        assert!(!is_transient(&io::Error::from_raw_os_error(libc::ENXIO)));
        assert!(!is_transient(&io::Error::from_raw_os_error(libc::EACCES)));
        assert!(!is_transient(&io::Error::new(io::ErrorKind::NotFound, "gone")));
    }

    #[test]
    fn test_read_retries_transient_then_succeeds() {
        let mut bus = MockI2cBus::new();
        let mut calls = 0;
        bus.expect_read_register()
            .withf(|addr, reg, _| *addr == 0x5A && *reg == 0x20)
            .times(3)
            .returning(move |_, _, buf| {
                calls += 1;
                if calls < 3 {
                    Err(eio())
                } else {
                    buf[0] = 0x81;
                    Ok(())
                }
            });

        let mut transport = Transport::with_retry(Box::new(bus), 3, Duration::ZERO);
        assert_eq!(transport.read(0x5A, 0x20, 1).unwrap(), vec![0x81]);
    }

    #[test]
    fn test_read_gives_up_after_attempts() {
        let mut bus = MockI2cBus::new();
        bus.expect_read_register().times(3).returning(|_, _, _| Err(eio()));

        let mut transport = Transport::with_retry(Box::new(bus), 3, Duration::ZERO);
        let err = transport.read(0x5A, 0x02, 8).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_non_transient_is_not_retried() {
        let mut bus = MockI2cBus::new();
        bus.expect_write_register()
            .times(1)
            .returning(|_, _, _| Err(io::Error::from_raw_os_error(libc::ENXIO)));

        let mut transport = Transport::with_retry(Box::new(bus), 3, Duration::ZERO);
        let err = transport.write(0x5A, 0x01, &[0x10]).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_command_response_repeats_whole_exchange() {
        let mut bus = MockI2cBus::new();
        bus.expect_write()
            .withf(|addr, data| *addr == 0x62 && data.to_vec() == vec![0xEC, 0x05])
            .times(2)
            .returning(|_, _| Ok(()));
        let mut reads = 0;
        bus.expect_read().times(2).returning(move |_, buf| {
            reads += 1;
            if reads == 1 {
                Err(eio())
            } else {
                buf.fill(0xAB);
                Ok(())
            }
        });

        let mut transport = Transport::with_retry(Box::new(bus), 3, Duration::ZERO);
        let data = transport
            .read_command_response(0x62, 0xEC05, 4, Duration::ZERO)
            .unwrap();
        assert_eq!(data, vec![0xAB; 4]);
    }

    #[test]
    fn test_open_missing_bus_is_unavailable() {
        let err = LinuxI2cBus::open("/nonexistent/i2c-99").err().unwrap();
        assert!(matches!(err, SensorError::BusUnavailable { .. }));
    }
}
