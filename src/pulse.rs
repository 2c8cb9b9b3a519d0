//! Pulse-train engine.
//!
//! A bounded sequence of pulse periods replayed onto the half bridge with
//! alternating polarity. Periods are stored quantized to the 0.5 us timing
//! quantum; every polarity change passes through the safe state and holds
//! the dead-time before the opposite gate turns on, so the quantum is also
//! the floor on a usable period.

use static_assertions::const_assert;
use thiserror::Error;
use tracing::{debug, info};

use crate::hal::{spin_ns, Polarity, PulseBridge};

/// Sequence capacity.
pub const MAX_PULSES: usize = 256;

/// Shortest programmable period, equal to one timing quantum.
pub const MIN_PERIOD_S: f64 = 5e-7;

/// Longest programmable period.
pub const MAX_PERIOD_S: f64 = 5e-2;

/// Timing quantum in nanoseconds.
pub const QUANTUM_NS: u64 = 500;

/// Dead-time held between turning one gate off and the other on.
pub const DEADTIME_NS: u64 = 200;

const_assert!(MAX_PULSES.is_power_of_two());
const_assert!(DEADTIME_NS < QUANTUM_NS);

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum EngineError {
    #[error("pulse period must be a finite positive number")]
    InvalidPeriod,
    #[error("pulse period {0} s outside the supported range")]
    PeriodOutOfRange(f64),
    #[error("pulse sequence full")]
    SequenceFull,
}

/// Sequencer state: the stored periods, the cumulative train counter and
/// the running flag the status queries report.
#[derive(Debug, Default)]
pub struct PulseEngine {
    periods: heapless::Vec<u64, MAX_PULSES>,
    completed_trains: u64,
    running: bool,
}

impl PulseEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one period, quantized to the nearest multiple of 0.5 us.
    pub fn add_pulse(&mut self, period_s: f64) -> Result<(), EngineError> {
        if !period_s.is_finite() || period_s <= 0.0 {
            return Err(EngineError::InvalidPeriod);
        }
        if !(MIN_PERIOD_S..=MAX_PERIOD_S).contains(&period_s) {
            return Err(EngineError::PeriodOutOfRange(period_s));
        }
        let counts = (period_s / MIN_PERIOD_S).round() as u64;
        self.periods
            .push(counts)
            .map_err(|_| EngineError::SequenceFull)?;
        debug!(
            "pulse {} added: {} counts ({} s requested)",
            self.periods.len(),
            counts,
            period_s
        );
        Ok(())
    }

    pub fn clear(&mut self) {
        self.periods.clear();
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Stored periods in seconds, after quantization.
    pub fn periods_s(&self) -> impl Iterator<Item = f64> + '_ {
        self.periods.iter().map(|&c| c as f64 * MIN_PERIOD_S)
    }

    /// Trains completed since the last reset, cumulative across runs.
    pub fn completed_trains(&self) -> u64 {
        self.completed_trains
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Replay the sequence `repetitions` times.
    ///
    /// Polarity alternates starting positive. Each pulse begins with both
    /// gates released and the dead-time spun out before the new gate turns
    /// on; the remainder of the period is held on that gate. Each train runs
    /// inside a timing section so nothing preempts the waveform, and the
    /// outputs are back in the safe state before this returns.
    pub fn run<B: PulseBridge>(&mut self, bridge: &mut B, repetitions: u32) {
        self.running = true;
        bridge.release();
        for _ in 0..repetitions {
            let mut positive = false;
            bridge.enter_timing_section();
            for &counts in &self.periods {
                positive = !positive;
                bridge.release();
                spin_ns(bridge, DEADTIME_NS);
                bridge.drive(if positive {
                    Polarity::Positive
                } else {
                    Polarity::Negative
                });
                let width_ns = counts * QUANTUM_NS;
                if width_ns > DEADTIME_NS {
                    spin_ns(bridge, width_ns - DEADTIME_NS);
                }
            }
            bridge.release();
            bridge.exit_timing_section();
            self.completed_trains += 1;
        }
        self.running = false;
        info!(
            "ran {} train(s) of {} pulse(s), {} total since reset",
            repetitions,
            self.periods.len(),
            self.completed_trains
        );
    }

    /// Back to power-on state: empty sequence, zero counter, not running.
    pub fn reset(&mut self) {
        self.periods.clear();
        self.completed_trains = 0;
        self.running = false;
    }
}
