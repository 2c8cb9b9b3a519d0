//! Hardware abstraction seams.
//!
//! Two traits separate the instrument logic from the board: [`PulseBridge`]
//! is the pair of complementary half-bridge gate drives plus the free-running
//! cycle counter used for busy-wait timing, and [`SmbusPort`] is the
//! byte-level two-wire peripheral the PMBus host drives phase by phase.
//! [`sim`] provides host-side implementations of both for the simulator
//! binary and the test suite.

pub mod sim;

use std::time::{Duration, Instant};

use thiserror::Error;

/// Upper bound on any single bus wait.
pub const BUS_TIMEOUT: Duration = Duration::from_millis(100);

/// Which side of the half bridge conducts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

/// Complementary gate-drive pair with a cycle counter for nanosecond waits.
///
/// Implementations must guarantee that `drive` never turns a gate on while
/// the opposite gate could still be conducting; the engine always calls
/// `release` first and holds the dead-time itself.
pub trait PulseBridge {
    /// Turn on the gate for `polarity`, the opposite gate stays off.
    fn drive(&mut self, polarity: Polarity);

    /// Turn both gates off (the safe state).
    fn release(&mut self);

    /// Free-running monotonic cycle counter.
    fn cycle_count(&self) -> u64;

    /// Rate of the cycle counter in Hz.
    fn cycle_rate_hz(&self) -> u64;

    /// Mark the start of a timing-critical section.
    fn enter_timing_section(&mut self);

    /// Mark the end of a timing-critical section.
    fn exit_timing_section(&mut self);
}

/// Busy-wait for `ns` nanoseconds on the bridge's cycle counter.
pub fn spin_ns<B: PulseBridge + ?Sized>(bridge: &B, ns: u64) {
    let mut cycles = bridge.cycle_rate_hz().saturating_mul(ns) / 1_000_000_000;
    if cycles == 0 {
        cycles = 1;
    }
    let start = bridge.cycle_count();
    while bridge.cycle_count().wrapping_sub(start) < cycles {}
}

/// Global interrupt mask backing `enter_timing_section` on the target.
/// Host builds compile this to a no-op so the engine stays testable.
pub fn mask_interrupts() {
    #[cfg(target_arch = "arm")]
    cortex_m::interrupt::disable();
}

/// Re-enable interrupts after a timing-critical section.
pub fn unmask_interrupts() {
    #[cfg(target_arch = "arm")]
    unsafe {
        cortex_m::interrupt::enable();
    }
}

/// Terminal failure of a bus transfer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// A phase did not complete within [`BUS_TIMEOUT`].
    #[error("bus transfer timed out")]
    Timeout,
    /// The addressed device did not acknowledge.
    #[error("device not acknowledging")]
    Nack,
}

/// Direction of a transfer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

/// Byte-level two-wire master peripheral.
///
/// The poll methods follow the `nb` convention: `WouldBlock` while the
/// condition is pending, `Err(Nack)` if the device aborted the transfer.
/// Timeouts are not the port's concern; callers bound every wait with
/// [`block_with_timeout`].
pub trait SmbusPort {
    /// Arm a transfer phase of `nbytes` toward `addr`. With `autoend` the
    /// peripheral raises STOP by itself once the last byte moves; without it
    /// the phase ends in a transfer-complete state ready for a repeated START.
    fn start(&mut self, addr: u8, nbytes: u8, dir: Direction, autoend: bool);

    /// Ready to accept the next outgoing byte.
    fn poll_tx_empty(&mut self) -> nb::Result<(), BusError>;

    /// Push one outgoing byte.
    fn write_data(&mut self, byte: u8);

    /// An incoming byte is waiting.
    fn poll_rx_ready(&mut self) -> nb::Result<(), BusError>;

    /// Pop one incoming byte.
    fn read_data(&mut self) -> u8;

    /// The armed phase moved all its bytes (non-autoend phases only).
    fn poll_transfer_complete(&mut self) -> nb::Result<(), BusError>;

    /// STOP has been raised and the bus is idle.
    fn poll_stop(&mut self) -> nb::Result<(), BusError>;

    /// Force a STOP, used to terminate a zero-length block read.
    fn request_stop(&mut self);
}

/// Spin `poll` until it resolves or `timeout` elapses.
///
/// This is the single bounded-wait primitive in the crate; every flag wait
/// in the bus driver goes through it so no transfer can hang the command
/// loop for longer than the timeout.
pub fn block_with_timeout<T>(
    timeout: Duration,
    mut poll: impl FnMut() -> nb::Result<T, BusError>,
) -> Result<T, BusError> {
    let deadline = Instant::now() + timeout;
    loop {
        match poll() {
            Ok(value) => return Ok(value),
            Err(nb::Error::Other(e)) => return Err(e),
            Err(nb::Error::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(BusError::Timeout);
                }
            }
        }
    }
}
