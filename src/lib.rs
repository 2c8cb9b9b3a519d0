//! # OPEN_TPT Instrument Core
//!
//! The firmware brain of an open two-pulse-test bench instrument: a SCPI
//! command interpreter in front, a half-bridge pulse-train engine with
//! enforced dead-time in the middle, and a PMBus host talking to the power
//! supply at the back. All hardware sits behind the traits in [`hal`], so
//! the same core runs against the simulated board in [`hal::sim`], which is
//! what the `opentpt-sim` binary and the test suite use.
//!
//! ## Architecture
//!
//! ```text
//! line in -> scpi (pattern + params) -> instrument dispatch
//!                                        |-> pulse::PulseEngine -> hal::PulseBridge
//!                                        '-> pmbus::PmbusHost -> smbus -> hal::SmbusPort
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use opentpt::hal::sim::{SimBridge, SimSupply};
//! use opentpt::Instrument;
//!
//! let mut instrument = Instrument::new(SimBridge::new(), SimSupply::new());
//!
//! let idn = instrument.dispatch("*IDN?").unwrap();
//! assert_eq!(&idn[..], "OPEN_TPT,2402,00000000,0.0.1");
//! ```
//!
//! Memory is statically bounded throughout: the pulse sequence, the error
//! queue, the device registry and every response line live in
//! fixed-capacity containers.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod hal;
pub mod instrument;
pub mod linear;
pub mod pmbus;
pub mod pulse;
pub mod scpi;
pub mod smbus;

pub use instrument::Instrument;
pub use pmbus::PmbusHost;
pub use pulse::PulseEngine;
pub use smbus::SmbusMaster;
