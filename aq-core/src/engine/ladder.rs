//! Recovery escalation ladder
//!
//! Runs after a read comes back failed or implausible:
//!
//! 1. quick re-reads (`local_retries`)
//! 2. re-initialize the source and read again
//! 3. with a reset line, once `reset_threshold` consecutive bad reads pile up,
//!    pulse the line, re-initialize and read again
//! 4. give up (`Exhausted`) when the threshold is hit again with the reset
//!    budget spent, or once `reinit_budget` recoveries in a row failed
//!
//! Every failed read counts towards the consecutive-bad counter. Any good read
//! clears all counters.

use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::data::config::RecoveryPolicy;
use crate::data::types::Reading;
use crate::engine::adapter::Recoverable;
use crate::hw::reset::ResetLine;

/// Which rung produced an accepted reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    FirstRead,
    LocalRetry(u32),
    Reinit,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Accepted { reading: Reading, step: RecoveryStep },
    /// No usable reading this round; the ladder continues next poll
    Rejected,
    /// Recovery budget spent; the source should be replaced
    Exhausted,
}

/// Delays used between rungs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderTimings {
    pub retry_delay: Duration,
    pub reset_hold: Duration,
    pub reset_settle: Duration,
}

impl LadderTimings {
    pub fn immediate() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            reset_hold: Duration::ZERO,
            reset_settle: Duration::ZERO,
        }
    }
}

pub struct RecoveryLadder {
    policy: RecoveryPolicy,
    timings: LadderTimings,
    consecutive_bad: u32,
    failed_recoveries: u32,
    resets_used: u32,
}

impl RecoveryLadder {
    pub fn new(policy: RecoveryPolicy, timings: LadderTimings) -> Self {
        Self {
            policy,
            timings,
            consecutive_bad: 0,
            failed_recoveries: 0,
            resets_used: 0,
        }
    }

    pub fn consecutive_bad(&self) -> u32 {
        self.consecutive_bad
    }

    pub fn resets_used(&self) -> u32 {
        self.resets_used
    }

    pub fn failed_recoveries(&self) -> u32 {
        self.failed_recoveries
    }

    /// Clear all counters and budgets
    pub fn restart(&mut self) {
        self.consecutive_bad = 0;
        self.failed_recoveries = 0;
        self.resets_used = 0;
    }

    /// One poll: read, and climb the ladder if the read is bad
    pub fn poll(
        &mut self,
        sensor: &mut dyn Recoverable,
        mut reset: Option<&mut (dyn ResetLine + '_)>,
    ) -> PollOutcome {
        if let Some(reading) = self.attempt(sensor) {
            return self.accept(reading, RecoveryStep::FirstRead);
        }

        for retry in 1..=self.policy.local_retries {
            if self.reset_due(reset.is_some()) {
                break;
            }
            sleep(self.timings.retry_delay);
            if let Some(reading) = self.attempt(sensor) {
                return self.accept(reading, RecoveryStep::LocalRetry(retry));
            }
        }

        if let Some(line) = reset.as_deref_mut() {
            if self.consecutive_bad >= self.policy.reset_threshold {
                if self.resets_used >= self.policy.max_resets {
                    error!(
                        "{}: {} bad reads after {} reset(s), giving up",
                        sensor.label(),
                        self.consecutive_bad,
                        self.resets_used
                    );
                    return PollOutcome::Exhausted;
                }
                return self.reset_and_reinit(sensor, line);
            }
        }

        self.reinit(sensor)
    }

    fn reset_due(&self, has_line: bool) -> bool {
        has_line && self.consecutive_bad >= self.policy.reset_threshold
    }

    fn reset_and_reinit(&mut self, sensor: &mut dyn Recoverable, line: &mut dyn ResetLine) -> PollOutcome {
        self.resets_used += 1;
        warn!(
            "{}: {} consecutive bad reads, pulsing reset on {} ({}/{})",
            sensor.label(),
            self.consecutive_bad,
            line.name(),
            self.resets_used,
            self.policy.max_resets
        );
        if let Err(e) = line.pulse(self.timings.reset_hold, self.timings.reset_settle) {
            error!("Reset pulse on {} failed: {}", line.name(), e);
        }
        self.consecutive_bad = 0;

        match self.reinit_and_read(sensor) {
            Some(reading) => {
                info!("{} recovered after reset", sensor.label());
                self.accept(reading, RecoveryStep::Reset)
            }
            None => {
                self.failed_recoveries += 1;
                PollOutcome::Rejected
            }
        }
    }

    fn reinit(&mut self, sensor: &mut dyn Recoverable) -> PollOutcome {
        info!("{}: re-initializing after bad read", sensor.label());
        if let Some(reading) = self.reinit_and_read(sensor) {
            info!("{} recovered after re-initialization", sensor.label());
            return self.accept(reading, RecoveryStep::Reinit);
        }

        self.failed_recoveries += 1;
        if self.failed_recoveries >= self.policy.reinit_budget {
            error!(
                "{}: {} re-initializations in a row failed, giving up",
                sensor.label(),
                self.failed_recoveries
            );
            return PollOutcome::Exhausted;
        }
        PollOutcome::Rejected
    }

    fn reinit_and_read(&mut self, sensor: &mut dyn Recoverable) -> Option<Reading> {
        if let Err(e) = sensor.reinit() {
            warn!("{}: re-initialization failed: {}", sensor.label(), e);
            return None;
        }
        self.attempt(sensor)
    }

    fn attempt(&mut self, sensor: &mut dyn Recoverable) -> Option<Reading> {
        match sensor.read_checked() {
            Ok(reading) => Some(reading),
            Err(e) => {
                self.consecutive_bad += 1;
                warn!(
                    "{}: bad read ({} consecutive): {}",
                    sensor.label(),
                    self.consecutive_bad,
                    e
                );
                None
            }
        }
    }

    fn accept(&mut self, reading: Reading, step: RecoveryStep) -> PollOutcome {
        if self.consecutive_bad > 0 {
            debug!("Good read after {} bad", self.consecutive_bad);
        }
        self.restart();
        PollOutcome::Accepted { reading, step }
    }
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
