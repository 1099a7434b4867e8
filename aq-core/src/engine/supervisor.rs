//! Acquisition supervisor
//!
//! Owns one background sampling worker, the sample buffer it feeds and the
//! configuration it runs with.
//!
//! # Behavior
//! - **Single worker**: all bus traffic for an instance happens on one thread
//! - **Fallback**: an unopenable bus or failed init swaps in the simulator
//! - **Recovery**: bad reads go through the [`RecoveryLadder`]; an exhausted
//!   ladder permanently degrades that sensor to the simulator
//! - **Force hardware**: disables every simulator substitution
//! - **Calibration**: saved on a fixed interval and once more on stop
//! - **Bounded shutdown**: `stop` waits at most the join timeout

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::constants::{acquisition, bus};
use crate::data::buffer::SampleBuffer;
use crate::data::calibration::CalibrationStore;
use crate::data::config::{AcquisitionConfig, StartOptions};
use crate::data::types::{Reading, Sample, SensorKind};
use crate::engine::adapter::{Recoverable, SensorHandle};
use crate::engine::ladder::{LadderTimings, PollOutcome, RecoveryLadder, RecoveryStep};
use crate::error::{Result, SensorError};
use crate::hw::command_adapter::CommandAdapter;
use crate::hw::register_adapter::{RegisterAdapter, RegisterInit};
use crate::hw::reset::{ResetLine, SysfsResetLine};
use crate::hw::simulator::Simulator;
use crate::hw::transport::{I2cBus, LinuxI2cBus, Transport};

/// Opens the physical resources a supervisor needs
pub trait HardwareProvider: Send + Sync {
    fn open_bus(&self, path: &Path) -> Result<Box<dyn I2cBus>>;

    fn open_reset_line(&self, line: u32) -> Result<Box<dyn ResetLine>>;
}

/// i2c-dev buses and sysfs GPIO
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxHardware;

impl HardwareProvider for LinuxHardware {
    fn open_bus(&self, path: &Path) -> Result<Box<dyn I2cBus>> {
        Ok(Box::new(LinuxI2cBus::open(path)?))
    }

    fn open_reset_line(&self, line: u32) -> Result<Box<dyn ResetLine>> {
        Ok(Box::new(SysfsResetLine::open(line)?))
    }
}

/// One-shot flag that can be waited on
#[derive(Clone, Default)]
struct Signal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Signal {
    fn raise(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    fn is_raised(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block up to `timeout`; true if the flag was raised
    fn wait(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut raised = flag.lock();
        while !*raised {
            if cvar.wait_until(&mut raised, deadline).timed_out() {
                break;
            }
        }
        *raised
    }
}

/// Per-sensor health as seen from outside
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub kind: SensorKind,
    pub simulated: bool,
    pub consecutive_bad: u32,
    pub resets_used: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStatus {
    pub slots: Vec<SlotStatus>,
    pub samples_published: u64,
    pub last_calibration: Option<u16>,
}

impl AcquisitionStatus {
    pub fn slot(&self, kind: SensorKind) -> Option<&SlotStatus> {
        self.slots.iter().find(|s| s.kind == kind)
    }

    /// Whether any enabled sensor is currently simulated
    pub fn degraded(&self) -> bool {
        self.slots.iter().any(|s| s.simulated)
    }
}

struct Worker {
    thread: JoinHandle<()>,
    cancel: Signal,
    done: Signal,
}

pub struct AcquisitionSupervisor {
    config: AcquisitionConfig,
    hardware: Arc<dyn HardwareProvider>,
    buffer: SampleBuffer,
    status: Arc<Mutex<AcquisitionStatus>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
    /// Worker that outlived the join timeout; joined before the next start
    lingering: Mutex<Option<JoinHandle<()>>>,
}

impl AcquisitionSupervisor {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self::with_hardware(config, Arc::new(LinuxHardware))
    }

    pub fn with_hardware(config: AcquisitionConfig, hardware: Arc<dyn HardwareProvider>) -> Self {
        let buffer = SampleBuffer::new(config.buffer_capacity);
        Self {
            config,
            hardware,
            buffer,
            status: Arc::new(Mutex::new(AcquisitionStatus::default())),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            lingering: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Shared handle to the live sample buffer (newest last)
    pub fn buffer(&self) -> SampleBuffer {
        self.buffer.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> AcquisitionStatus {
        self.status.lock().clone()
    }

    /// Begin sampling every `poll_interval` on a background worker
    ///
    /// A no-op while already running. Blocks until a worker left over from
    /// an unconfirmed `stop` has exited. Fails only when `force_hardware` is
    /// set and a bus cannot be opened.
    pub fn start(&self, poll_interval: Duration, options: StartOptions) -> Result<()> {
        let mut worker = self.worker.lock();
        if self.running.load(Ordering::SeqCst) {
            info!("Acquisition already running");
            return Ok(());
        }

        if let Some(previous) = self.lingering.lock().take() {
            info!("Waiting for the previous sampling worker to exit");
            if previous.join().is_err() {
                error!("Previous sampling worker panicked");
            }
        }

        let poll_interval = poll_interval.max(acquisition::MIN_POLL_INTERVAL);
        let (command, register) = self.build_slots(options)?;
        let reset_line = self.open_reset_line(register.as_ref());

        let cancel = Signal::default();
        let done = Signal::default();
        let mut sampler = Sampler {
            command,
            register,
            reset_line,
            options,
            poll_interval,
            force_hardware: self.config.force_hardware,
            init_attempts: self.config.recovery.init_attempts,
            warmup: self.config.timings.warmup,
            init_retry_delay: self.config.timings.init_retry_delay,
            save_interval: self.config.calibration_save_interval(),
            buffer: self.buffer.clone(),
            status: Arc::clone(&self.status),
            cancel: cancel.clone(),
            rng: StdRng::from_entropy(),
            ambient_temperature: acquisition::AMBIENT_TEMPERATURE_START,
            sound_db: 0.0,
        };

        let worker_done = done.clone();
        let thread = thread::Builder::new()
            .name("aqlog-sampler".to_string())
            .spawn(move || {
                sampler.run();
                worker_done.raise();
            })?;

        self.running.store(true, Ordering::SeqCst);
        *worker = Some(Worker { thread, cancel, done });
        info!(
            "Acquisition started (poll_interval={:.2}s, command={}, register={}, aux={})",
            poll_interval.as_secs_f64(),
            options.use_command_sensor,
            options.use_register_sensor,
            options.use_aux_inputs
        );
        Ok(())
    }

    /// Stop sampling, save calibration and release the bus
    ///
    /// Waits at most the configured join timeout for the worker. A worker
    /// that outlives it is kept and joined by the next `start`.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        worker.cancel.raise();
        if worker.done.wait(self.config.join_timeout()) {
            if worker.thread.join().is_err() {
                error!("Sampling worker panicked during shutdown");
            }
            info!("Acquisition stopped");
        } else {
            warn!(
                "Sampling worker did not exit within {:?}; shutdown not confirmed",
                self.config.join_timeout()
            );
            *self.lingering.lock() = Some(worker.thread);
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn build_slots(&self, options: StartOptions) -> Result<(Option<Slot>, Option<Slot>)> {
        let simulate_all = !options.use_command_sensor && !options.use_register_sensor;
        if simulate_all {
            info!("No sensors enabled, sampling from the simulator");
        }

        let command = if options.use_command_sensor {
            Some(self.command_slot()?)
        } else if simulate_all {
            Some(self.simulated_slot(SensorKind::Command))
        } else {
            None
        };

        let register = if options.use_register_sensor {
            Some(self.register_slot()?)
        } else if simulate_all {
            Some(self.simulated_slot(SensorKind::Register))
        } else {
            None
        };

        Ok((command, register))
    }

    fn command_slot(&self) -> Result<Slot> {
        let cfg = &self.config.command_sensor;
        match self.open_transport(&cfg.bus) {
            Ok(transport) => Ok(self.slot(SensorHandle::Command(CommandAdapter::new(
                transport,
                cfg.address,
                self.config.timings,
            )))),
            Err(e) => self.bus_fallback(SensorKind::Command, e),
        }
    }

    fn register_slot(&self) -> Result<Slot> {
        let cfg = &self.config.register_sensor;
        match self.open_transport(&cfg.bus) {
            Ok(transport) => {
                let adapter = RegisterAdapter::new(
                    transport,
                    cfg.address,
                    CalibrationStore::new(&self.config.calibration_file),
                    self.config.timings,
                );
                let params = RegisterInit {
                    restore_calibration: self.config.restore_calibration,
                    drive_mode: self.config.drive_mode,
                    interrupt: self.config.interrupt,
                };
                Ok(self.slot(SensorHandle::Register { adapter, params }))
            }
            Err(e) => self.bus_fallback(SensorKind::Register, e),
        }
    }

    fn open_transport(&self, path: &Path) -> Result<Transport> {
        let bus = self.hardware.open_bus(path)?;
        Ok(Transport::with_retry(
            bus,
            bus::RETRY_ATTEMPTS,
            self.config.timings.bus_retry_delay,
        ))
    }

    fn bus_fallback(&self, kind: SensorKind, err: SensorError) -> Result<Slot> {
        if self.config.force_hardware {
            error!("Cannot open bus for {} and hardware is forced: {}", kind, err);
            return Err(err);
        }
        warn!("Cannot open bus for {}: {} - using simulator", kind, err);
        Ok(self.simulated_slot(kind))
    }

    fn simulated_slot(&self, kind: SensorKind) -> Slot {
        self.slot(SensorHandle::Simulator(Simulator::new(kind)))
    }

    fn slot(&self, handle: SensorHandle) -> Slot {
        let timings = LadderTimings {
            retry_delay: self.config.retry_delay(),
            reset_hold: self.config.timings.reset_hold,
            reset_settle: self.config.timings.reset_settle,
        };
        Slot {
            handle,
            ladder: RecoveryLadder::new(self.config.recovery, timings),
        }
    }

    /// Reset line for the register sensor, if one is configured and usable
    fn open_reset_line(&self, register: Option<&Slot>) -> Option<Box<dyn ResetLine>> {
        let line = self.config.reset_gpio?;
        if register.map_or(true, |slot| slot.handle.is_simulated()) {
            return None;
        }
        match self.hardware.open_reset_line(line) {
            Ok(reset) => Some(reset),
            Err(e) => {
                warn!("Reset line {} unavailable, continuing without it: {}", line, e);
                None
            }
        }
    }
}

impl Drop for AcquisitionSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A sensor role and the source currently filling it
struct Slot {
    handle: SensorHandle,
    ladder: RecoveryLadder,
}

impl Slot {
    fn poll(&mut self, reset: Option<&mut (dyn ResetLine + '_)>, force_hardware: bool) -> Option<Reading> {
        match self.ladder.poll(&mut self.handle, reset) {
            PollOutcome::Accepted { reading, step } => {
                if step != RecoveryStep::FirstRead {
                    debug!("{} read accepted via {:?}", self.handle.label(), step);
                }
                Some(reading)
            }
            PollOutcome::Rejected => None,
            PollOutcome::Exhausted if force_hardware => {
                warn!(
                    "{} recovery exhausted; hardware is forced, starting over",
                    self.handle.label()
                );
                self.ladder.restart();
                None
            }
            PollOutcome::Exhausted => {
                self.degrade("recovery exhausted");
                self.handle.read_checked().ok()
            }
        }
    }

    /// Replace the hardware source with the simulator for the rest of the run
    fn degrade(&mut self, reason: &str) {
        let kind = self.handle.kind();
        error!(
            "{} degraded to simulator for the rest of this run: {}",
            kind, reason
        );
        self.handle.shutdown();
        self.handle = SensorHandle::Simulator(Simulator::new(kind));
        self.ladder.restart();
    }

    fn status(&self) -> SlotStatus {
        SlotStatus {
            kind: self.handle.kind(),
            simulated: self.handle.is_simulated(),
            consecutive_bad: self.ladder.consecutive_bad(),
            resets_used: self.ladder.resets_used(),
        }
    }
}

/// State owned by the worker thread
struct Sampler {
    command: Option<Slot>,
    register: Option<Slot>,
    reset_line: Option<Box<dyn ResetLine>>,
    options: StartOptions,
    poll_interval: Duration,
    force_hardware: bool,
    init_attempts: u32,
    warmup: Duration,
    init_retry_delay: Duration,
    save_interval: Duration,
    buffer: SampleBuffer,
    status: Arc<Mutex<AcquisitionStatus>>,
    cancel: Signal,
    rng: StdRng,
    ambient_temperature: f32,
    sound_db: f32,
}

impl Sampler {
    fn run(&mut self) {
        if !self.cancel.wait(self.warmup) {
            self.init_sensors();
            self.publish_status();

            let mut last_save = Instant::now();
            while !self.cancel.is_raised() {
                let iteration = panic::catch_unwind(AssertUnwindSafe(|| self.iteration()));
                if iteration.is_err() {
                    error!("Sampling iteration panicked; continuing");
                }

                if last_save.elapsed() >= self.save_interval {
                    self.save_calibration();
                    last_save = Instant::now();
                }

                if self.cancel.wait(self.poll_interval) {
                    break;
                }
            }
        }

        self.save_calibration();
        for slot in [self.command.as_mut(), self.register.as_mut()].into_iter().flatten() {
            slot.handle.shutdown();
        }
        self.publish_status();
        debug!("Sampling worker exiting");
    }

    fn init_sensors(&mut self) {
        let attempts = self.init_attempts.max(1);
        for slot in [self.command.as_mut(), self.register.as_mut()].into_iter().flatten() {
            if slot.handle.is_simulated() {
                continue;
            }

            let mut last_error = None;
            for attempt in 1..=attempts {
                match slot.handle.init() {
                    Ok(()) => {
                        last_error = None;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "{} init attempt {}/{} failed: {}",
                            slot.handle.label(),
                            attempt,
                            attempts,
                            e
                        );
                        last_error = Some(e);
                        if attempt < attempts && self.cancel.wait(self.init_retry_delay) {
                            return;
                        }
                    }
                }
            }

            if let Some(e) = last_error {
                if self.force_hardware {
                    warn!(
                        "{} not initialized but hardware is forced; recovery will keep retrying",
                        slot.handle.label()
                    );
                } else {
                    slot.degrade(&format!("init failed: {}", e));
                }
            }
        }
    }

    fn iteration(&mut self) {
        let force = self.force_hardware;

        let command = self.command.as_mut().and_then(|slot| slot.poll(None, force));
        let command_is_real = self
            .command
            .as_ref()
            .is_some_and(|slot| !slot.handle.is_simulated());

        let register = match self.register.as_mut() {
            Some(slot) => {
                if let (true, Some(Reading::Command(c))) = (command_is_real, &command) {
                    if let Some(Err(e)) = slot.handle.write_environment(c.humidity, c.temperature) {
                        warn!("Failed to write environment data: {}", e);
                    }
                }
                slot.poll(self.reset_line.as_deref_mut(), force)
            }
            None => None,
        };

        if let Some(sample) = self.compose(command, register) {
            debug!("Sample: co2={} voc={:?} t={:.2}", sample.co2, sample.voc, sample.temperature);
            self.buffer.push(sample);
            self.status.lock().samples_published += 1;
        }
        self.publish_status();
    }

    /// Combine this round's readings into one sample
    ///
    /// CO2, temperature and humidity come from the command sensor when it is
    /// enabled, TVOC from the register sensor. No sample when the primary
    /// source produced nothing this round.
    fn compose(&mut self, command: Option<Reading>, register: Option<Reading>) -> Option<Sample> {
        let voc = match &register {
            Some(Reading::Register(r)) => Some(r.tvoc),
            _ => None,
        };

        let (co2, temperature, humidity) = match (&command, &register) {
            (Some(Reading::Command(c)), _) => (c.co2, c.temperature, Some(c.humidity)),
            (None, _) if self.command.is_some() => return None,
            (_, Some(Reading::Register(r))) => (r.eco2, self.drift_ambient(), None),
            _ => return None,
        };

        let sound_db = self.options.use_aux_inputs.then(|| self.next_sound_level());

        Some(Sample {
            temperature,
            humidity,
            sound_db,
            co2,
            voc,
            timestamp: now_secs(),
        })
    }

    /// Slow random drift standing in for a missing temperature sensor
    fn drift_ambient(&mut self) -> f32 {
        let drift = acquisition::AMBIENT_TEMPERATURE_DRIFT;
        self.ambient_temperature += self.rng.gen_range(-drift..=drift);
        self.ambient_temperature
    }

    fn next_sound_level(&mut self) -> f32 {
        self.sound_db =
            self.sound_db * acquisition::SOUND_DECAY + self.rng.gen::<f32>() * acquisition::SOUND_NOISE;
        self.sound_db
    }

    fn save_calibration(&mut self) {
        let Some(slot) = self.register.as_mut() else {
            return;
        };
        match slot.handle.save_calibration() {
            Some(Ok(value)) => self.status.lock().last_calibration = Some(value),
            Some(Err(e)) => warn!("Calibration save failed: {}", e),
            None => {}
        }
    }

    fn publish_status(&self) {
        let slots: Vec<SlotStatus> = [self.command.as_ref(), self.register.as_ref()]
            .into_iter()
            .flatten()
            .map(Slot::status)
            .collect();
        self.status.lock().slots = slots;
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
