//! Clock driver.
//!
//! Turns wall-clock time into pulses at a target frequency. The caller
//! reports how long it has been since the last call; whole pulses are run
//! and the fractional remainder carries over, so the long-run rate holds
//! even when the caller's frame timing jitters.

use crate::cpu::{Cpu, Pulse};

/// Default target frequency in pulses per second.
pub const DEFAULT_HZ: f64 = 10.0;

/// Fixed-rate pulse generator.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockDriver {
    hz: f64,
    /// Pulses owed but not yet executed, always in `[0, 1)` between calls.
    accumulator: f64,
}

impl ClockDriver {
    pub fn new(hz: f64) -> Self {
        let mut clock = Self { hz: DEFAULT_HZ, accumulator: 0.0 };
        clock.configure(hz);
        clock
    }

    /// Set the target frequency. Non-finite or negative values stop the
    /// clock.
    pub fn configure(&mut self, hz: f64) {
        self.hz = if hz.is_finite() && hz > 0.0 { hz } else { 0.0 };
    }

    pub fn hz(&self) -> f64 {
        self.hz
    }

    /// Run the pulses owed for `elapsed` seconds of wall time. Returns the
    /// number executed. Stops early if the machine halts or faults.
    pub fn advance(&mut self, cpu: &mut Cpu, elapsed: f64) -> u64 {
        self.advance_with(cpu, elapsed, |_| ())
    }

    /// Like [`advance`](Self::advance), handing every pulse report to
    /// `observe` as it happens.
    pub fn advance_with<F>(&mut self, cpu: &mut Cpu, elapsed: f64, mut observe: F) -> u64
    where
        F: FnMut(&Pulse),
    {
        if cpu.is_halted() {
            self.accumulator = 0.0;
            return 0;
        }
        let elapsed = if elapsed.is_finite() && elapsed > 0.0 { elapsed } else { 0.0 };

        self.accumulator += elapsed * self.hz;
        let due = self.accumulator.floor() as u64;
        self.accumulator = self.accumulator.fract();

        let mut executed = 0;
        while executed < due && !cpu.is_halted() {
            let pulse = cpu.pulse();
            executed += 1;
            observe(&pulse);
        }
        if cpu.is_halted() {
            self.accumulator = 0.0;
        }
        executed
    }

    /// Run exactly one pulse, for single stepping.
    pub fn tick(&mut self, cpu: &mut Cpu) -> u64 {
        if cpu.is_halted() {
            return 0;
        }
        cpu.pulse();
        1
    }

    /// Drop any owed fraction of a pulse.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

impl Default for ClockDriver {
    fn default() -> Self {
        Self::new(DEFAULT_HZ)
    }
}
