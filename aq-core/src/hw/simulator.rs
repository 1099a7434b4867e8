//! Software stand-in for either sensor
//!
//! Bounded random walk that never fails. Used when the bus cannot be opened,
//! when hardware init gives up, and after the recovery ladder is exhausted.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::constants::limits;
use crate::constants::register_sensor::status;
use crate::constants::simulator::*;
use crate::data::types::{CommandReading, Reading, RegisterReading, SensorKind};
use crate::hw::crc::encode_word;

pub struct Simulator {
    kind: SensorKind,
    rng: StdRng,
    co2: i32,
    tvoc: i32,
    temperature: f32,
    humidity: f32,
}

impl Simulator {
    /// Simulator shaped like `kind`, seeded from the OS
    pub fn new(kind: SensorKind) -> Self {
        Self::with_rng(kind, StdRng::from_entropy())
    }

    /// Reproducible simulator for tests
    pub fn with_seed(kind: SensorKind, seed: u64) -> Self {
        Self::with_rng(kind, StdRng::seed_from_u64(seed))
    }

    fn with_rng(kind: SensorKind, rng: StdRng) -> Self {
        debug!("Simulator created for {}", kind);
        Self {
            kind,
            rng,
            co2: CO2_START,
            tvoc: TVOC_START,
            temperature: TEMPERATURE_START,
            humidity: HUMIDITY_START,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Advance the walk and report it in the stood-in sensor's shape
    pub fn read(&mut self) -> Reading {
        self.co2 = (self.co2 + self.step()).clamp(CO2_MIN, CO2_MAX);
        match self.kind {
            SensorKind::Register => {
                self.tvoc = (self.tvoc + self.step()).clamp(TVOC_MIN, TVOC_MAX);
                Reading::Register(self.register_reading())
            }
            SensorKind::Command => {
                self.temperature = (self.temperature
                    + (self.rng.gen::<f32>() - 0.5) * TEMPERATURE_STEP)
                    .clamp(limits::TEMPERATURE_MIN, limits::TEMPERATURE_MAX);
                self.humidity = (self.humidity + (self.rng.gen::<f32>() - 0.5) * HUMIDITY_STEP)
                    .clamp(limits::HUMIDITY_MIN, limits::HUMIDITY_MAX);
                Reading::Command(self.command_reading())
            }
        }
    }

    /// Integer step from a normal distribution, clipped to a few sigmas
    fn step(&mut self) -> i32 {
        // Box-Muller; 1 - u keeps the log argument in (0, 1]
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen::<f64>();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        let limit = STEP_CLAMP_SIGMAS * STEP_SIGMA;
        (z * STEP_SIGMA).clamp(-limit, limit).round() as i32
    }

    fn register_reading(&self) -> RegisterReading {
        let [c0, c1] = (self.co2 as u16).to_be_bytes();
        let [t0, t1] = (self.tvoc as u16).to_be_bytes();
        let ok = status::DATA_READY | status::APP_VALID;
        RegisterReading::from_block([c0, c1, t0, t1, ok, 0x00, 0x00, 0x00])
    }

    fn command_reading(&self) -> CommandReading {
        let mut raw = [0u8; 18];
        let values = [self.co2 as f32, self.temperature, self.humidity];
        for (i, value) in values.iter().enumerate() {
            let bits = value.to_bits();
            raw[i * 6..i * 6 + 3].copy_from_slice(&encode_word((bits >> 16) as u16));
            raw[i * 6 + 3..i * 6 + 6].copy_from_slice(&encode_word(bits as u16));
        }
        CommandReading {
            co2: self.co2 as u16,
            temperature: self.temperature,
            humidity: self.humidity,
            raw,
        }
    }
}
