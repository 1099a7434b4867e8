//! Test utilities and fake hardware for aqlog
//!
//! A scripted in-memory bus that answers like both sensor families, a
//! recording reset line, and frame builders.


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use crate::hw::crc::crc8;
    use crate::hw::transport::I2cBus;

    #[test]
    fn test_fake_bus_register_write_read_back() {
        let mut bus = FakeBus::new();
        bus.write_register(0x5A, 0x11, &[0xA0, 0x00]).unwrap();
        let mut buf = [0u8; 2];
        bus.read_register(0x5A, 0x11, &mut buf).unwrap();
        assert_eq!(buf, [0xA0, 0x00]);
        assert_eq!(bus.register_writes(0x5A, 0x11), vec![vec![0xA0, 0x00]]);
    }

    #[test]
    fn test_fake_bus_queue_before_map() {
        let mut bus = FakeBus::new().with_register_sensor(0x5A, 500, 5);
        bus.queue_read_errors(0x5A, 0x02, 1);
        let mut buf = [0u8; 8];
        assert!(bus.read_register(0x5A, 0x02, &mut buf).is_err());
        bus.read_register(0x5A, 0x02, &mut buf).unwrap();
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), 500);
    }

    #[test]
    fn test_measurement_frame_checksums() {
        let frame = measurement_frame(415.3, 21.0, 40.0);
        for word in frame.chunks(3) {
            assert_eq!(crc8(&word[..2]), word[2]);
        }
    }
}
