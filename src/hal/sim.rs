//! Host-side hardware models.
//!
//! [`SimBridge`] stands in for the gate-drive pair and records every output
//! transition against a simulated cycle counter, which is what the dead-time
//! tests inspect. [`SimSupply`] is a register-map PMBus device sitting behind
//! the [`SmbusPort`] trait, faithful enough to exercise every transfer shape
//! the bus driver produces, including NACKs from an absent device.

use std::cell::Cell;
use std::collections::HashMap;

use crate::hal::{BusError, Direction, Polarity, PulseBridge, SmbusPort};
use crate::linear::f64_to_linear11;
use crate::pmbus::cmd;

/// Rate of the simulated cycle counter.
pub const SIM_CYCLE_RATE_HZ: u64 = 250_000_000;

/// Simulated time consumed by one counter read (100 ns).
const CYCLES_PER_READ: u64 = 25;

/// State of the half-bridge outputs at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Both gates off.
    Safe,
    Positive,
    Negative,
}

/// One recorded output change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub cycle: u64,
    pub state: OutputState,
}

/// Simulated half bridge. The cycle counter advances on every read, so
/// busy-wait loops terminate and recorded transitions carry meaningful
/// relative timestamps.
#[derive(Debug, Default)]
pub struct SimBridge {
    cycle: Cell<u64>,
    transitions: Vec<Transition>,
    section_depth: u32,
    section_imbalance: bool,
}

impl SimBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every output change seen so far, oldest first.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn clear_transitions(&mut self) {
        self.transitions.clear();
    }

    /// True if every timing section entered was also exited.
    pub fn sections_balanced(&self) -> bool {
        self.section_depth == 0 && !self.section_imbalance
    }

    fn record(&mut self, state: OutputState) {
        let cycle = self.cycle.get();
        // Collapse repeated identical states so tests see clean edges.
        if self.transitions.last().map(|t| t.state) != Some(state) {
            self.transitions.push(Transition { cycle, state });
        }
    }
}

impl PulseBridge for SimBridge {
    fn drive(&mut self, polarity: Polarity) {
        let state = match polarity {
            Polarity::Positive => OutputState::Positive,
            Polarity::Negative => OutputState::Negative,
        };
        self.record(state);
    }

    fn release(&mut self) {
        self.record(OutputState::Safe);
    }

    fn cycle_count(&self) -> u64 {
        let now = self.cycle.get().wrapping_add(CYCLES_PER_READ);
        self.cycle.set(now);
        now
    }

    fn cycle_rate_hz(&self) -> u64 {
        SIM_CYCLE_RATE_HZ
    }

    fn enter_timing_section(&mut self) {
        crate::hal::mask_interrupts();
        self.section_depth += 1;
    }

    fn exit_timing_section(&mut self) {
        crate::hal::unmask_interrupts();
        if self.section_depth == 0 {
            self.section_imbalance = true;
        } else {
            self.section_depth -= 1;
        }
    }
}

const DEFAULT_SUPPLY_ADDRESS: u8 = 0x5A;

/// Raw VOUT_MODE with a -9 exponent, about 125 V full scale.
const DEFAULT_VOUT_MODE: u16 = 0x0017;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Write,
    Read,
}

/// Register-map model of a PMBus power supply.
#[derive(Debug)]
pub struct SimSupply {
    address: u8,
    online: bool,
    words: HashMap<u8, u16>,
    blocks: HashMap<u8, Vec<u8>>,

    phase: Phase,
    selected: Option<u8>,
    tx: Vec<u8>,
    rx: Vec<u8>,
    remaining: u8,
    autoend: bool,
    nack: bool,
    tc_flag: bool,
    stop_flag: bool,
}

impl Default for SimSupply {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSupply {
    pub fn new() -> Self {
        let mut words = HashMap::new();
        words.insert(cmd::VOUT_MODE, DEFAULT_VOUT_MODE);
        words.insert(cmd::READ_VIN, f64_to_linear11(230.0, -2));
        words.insert(cmd::READ_IIN, f64_to_linear11(0.25, -8));
        words.insert(cmd::READ_IOUT, f64_to_linear11(1.5, -6));
        words.insert(cmd::READ_TEMPERATURE_1, f64_to_linear11(34.0, -2));
        words.insert(cmd::READ_TEMPERATURE_2, f64_to_linear11(41.5, -2));
        words.insert(cmd::READ_POUT, f64_to_linear11(36.0, -2));
        words.insert(cmd::READ_PIN, f64_to_linear11(42.0, -2));

        let mut blocks = HashMap::new();
        blocks.insert(cmd::MFR_ID, b"OPENSIM".to_vec());
        blocks.insert(cmd::MFR_MODEL, b"COOLX600".to_vec());
        blocks.insert(cmd::MFR_SERIAL, b"SIM00001".to_vec());

        Self {
            address: DEFAULT_SUPPLY_ADDRESS,
            online: true,
            words,
            blocks,
            phase: Phase::Idle,
            selected: None,
            tx: Vec::new(),
            rx: Vec::new(),
            remaining: 0,
            autoend: false,
            nack: false,
            tc_flag: false,
            stop_flag: false,
        }
    }

    pub fn with_address(address: u8) -> Self {
        Self {
            address,
            ..Self::new()
        }
    }

    /// Take the device off the bus; every transfer then ends in a NACK.
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Test hook: read a register word directly.
    pub fn word(&self, command: u8) -> u16 {
        self.words.get(&command).copied().unwrap_or(0)
    }

    /// Test hook: preset a register word directly.
    pub fn set_word(&mut self, command: u8, value: u16) {
        self.words.insert(command, value);
    }

    fn commit_write(&mut self) {
        let Some((&command, data)) = self.tx.split_first() else {
            return;
        };
        self.selected = Some(command);
        match data.len() {
            0 => {
                if command == cmd::CLEAR_FAULTS {
                    for status in [
                        cmd::STATUS_BYTE,
                        cmd::STATUS_WORD,
                        cmd::STATUS_VOUT,
                        cmd::STATUS_IOUT,
                        cmd::STATUS_INPUT,
                        cmd::STATUS_TEMPERATURE,
                    ] {
                        self.words.insert(status, 0);
                    }
                }
            }
            1 => {
                self.words.insert(command, u16::from(data[0]));
            }
            _ => {
                let value = u16::from(data[0]) | (u16::from(data[1]) << 8);
                self.words.insert(command, value);
                if command == cmd::VOUT_COMMAND {
                    // The model regulates perfectly: the readback mirrors
                    // the commanded mantissa.
                    self.words.insert(cmd::READ_VOUT, value);
                }
            }
        }
    }

    fn load_response(&mut self) {
        self.rx.clear();
        let Some(command) = self.selected else {
            return;
        };
        if let Some(block) = self.blocks.get(&command) {
            self.rx.push(block.len() as u8);
            self.rx.extend_from_slice(block);
        } else {
            let value = self.words.get(&command).copied().unwrap_or(0);
            self.rx.push(value as u8);
            self.rx.push((value >> 8) as u8);
        }
    }
}

impl SmbusPort for SimSupply {
    fn start(&mut self, addr: u8, nbytes: u8, dir: Direction, autoend: bool) {
        self.nack = !self.online || addr != self.address;
        self.remaining = nbytes;
        self.autoend = autoend;
        self.tc_flag = false;
        self.stop_flag = false;
        match dir {
            Direction::Write => {
                self.tx.clear();
                self.phase = Phase::Write;
            }
            Direction::Read => {
                // A read phase following a write selects a fresh response;
                // a read phase following a read continues the same stream
                // (block data after the length byte).
                if self.phase != Phase::Read {
                    self.load_response();
                }
                self.phase = Phase::Read;
            }
        }
    }

    fn poll_tx_empty(&mut self) -> nb::Result<(), BusError> {
        if self.nack {
            return Err(nb::Error::Other(BusError::Nack));
        }
        if self.phase == Phase::Write && (self.tx.len() as u8) < self.remaining {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn write_data(&mut self, byte: u8) {
        if self.phase != Phase::Write || self.nack {
            return;
        }
        self.tx.push(byte);
        if self.tx.len() as u8 == self.remaining {
            self.commit_write();
            if self.autoend {
                self.stop_flag = true;
                self.phase = Phase::Idle;
            } else {
                self.tc_flag = true;
            }
        }
    }

    fn poll_rx_ready(&mut self) -> nb::Result<(), BusError> {
        if self.nack {
            return Err(nb::Error::Other(BusError::Nack));
        }
        if self.phase == Phase::Read && !self.rx.is_empty() && self.remaining > 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn read_data(&mut self) -> u8 {
        if self.phase != Phase::Read || self.rx.is_empty() || self.remaining == 0 {
            return 0xFF;
        }
        let byte = self.rx.remove(0);
        self.remaining -= 1;
        if self.remaining == 0 {
            if self.autoend {
                self.stop_flag = true;
            } else {
                self.tc_flag = true;
            }
        }
        byte
    }

    fn poll_transfer_complete(&mut self) -> nb::Result<(), BusError> {
        if self.nack {
            return Err(nb::Error::Other(BusError::Nack));
        }
        if self.tc_flag {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn poll_stop(&mut self) -> nb::Result<(), BusError> {
        if self.nack {
            // A NACK still ends with the bus released.
            self.nack = false;
            self.phase = Phase::Idle;
            return Err(nb::Error::Other(BusError::Nack));
        }
        if self.stop_flag {
            self.stop_flag = false;
            self.phase = Phase::Idle;
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn request_stop(&mut self) {
        self.stop_flag = true;
    }
}
