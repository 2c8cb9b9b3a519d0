//! SMBus transfer driver.
//!
//! Builds the standard transfer shapes (send byte, write byte/word, read
//! byte/word, block read) out of [`SmbusPort`] phases. Every flag wait is
//! bounded by [`BUS_TIMEOUT`] through [`block_with_timeout`], and a NACK is
//! surfaced as its own error so callers can tell an absent device from a
//! wedged bus.

use tracing::trace;

use crate::hal::{block_with_timeout, BusError, Direction, SmbusPort, BUS_TIMEOUT};

/// Transfer driver over a byte-level port.
#[derive(Debug)]
pub struct SmbusMaster<P: SmbusPort> {
    port: P,
}

impl<P: SmbusPort> SmbusMaster<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    fn wait_tx_empty(&mut self) -> Result<(), BusError> {
        let port = &mut self.port;
        block_with_timeout(BUS_TIMEOUT, || port.poll_tx_empty())
    }

    fn wait_rx_ready(&mut self) -> Result<(), BusError> {
        let port = &mut self.port;
        block_with_timeout(BUS_TIMEOUT, || port.poll_rx_ready())
    }

    fn wait_transfer_complete(&mut self) -> Result<(), BusError> {
        let port = &mut self.port;
        block_with_timeout(BUS_TIMEOUT, || port.poll_transfer_complete())
    }

    fn wait_stop(&mut self) -> Result<(), BusError> {
        let port = &mut self.port;
        block_with_timeout(BUS_TIMEOUT, || port.poll_stop())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        for &byte in bytes {
            self.wait_tx_empty()?;
            self.port.write_data(byte);
        }
        Ok(())
    }

    /// Command code alone, no data phase.
    pub fn send_byte(&mut self, addr: u8, command: u8) -> Result<(), BusError> {
        trace!("send_byte 0x{:02X} @0x{:02X}", command, addr);
        self.port.start(addr, 1, Direction::Write, true);
        self.send_bytes(&[command])?;
        self.wait_stop()
    }

    pub fn write_byte(&mut self, addr: u8, command: u8, data: u8) -> Result<(), BusError> {
        trace!("write_byte 0x{:02X} <- 0x{:02X} @0x{:02X}", command, data, addr);
        self.port.start(addr, 2, Direction::Write, true);
        self.send_bytes(&[command, data])?;
        self.wait_stop()
    }

    /// Word data goes out low byte first.
    pub fn write_word(&mut self, addr: u8, command: u8, data: u16) -> Result<(), BusError> {
        trace!("write_word 0x{:02X} <- 0x{:04X} @0x{:02X}", command, data, addr);
        self.port.start(addr, 3, Direction::Write, true);
        self.send_bytes(&[command, data as u8, (data >> 8) as u8])?;
        self.wait_stop()
    }

    /// Command write, repeated START, one data byte back.
    pub fn read_byte(&mut self, addr: u8, command: u8) -> Result<u8, BusError> {
        self.write_command_phase(addr, command)?;
        self.port.start(addr, 1, Direction::Read, true);
        self.wait_rx_ready()?;
        let data = self.port.read_data();
        self.wait_stop()?;
        trace!("read_byte 0x{:02X} -> 0x{:02X} @0x{:02X}", command, data, addr);
        Ok(data)
    }

    /// Command write, repeated START, two data bytes back, low byte first.
    pub fn read_word(&mut self, addr: u8, command: u8) -> Result<u16, BusError> {
        self.write_command_phase(addr, command)?;
        self.port.start(addr, 2, Direction::Read, true);
        self.wait_rx_ready()?;
        let lo = self.port.read_data();
        self.wait_rx_ready()?;
        let hi = self.port.read_data();
        self.wait_stop()?;
        let data = u16::from(lo) | (u16::from(hi) << 8);
        trace!("read_word 0x{:02X} -> 0x{:04X} @0x{:02X}", command, data, addr);
        Ok(data)
    }

    /// Block read: the device sends a length byte first, then that many data
    /// bytes. The length is capped to `buf`; returns the number of bytes
    /// actually stored.
    pub fn read_block(&mut self, addr: u8, command: u8, buf: &mut [u8]) -> Result<usize, BusError> {
        self.write_command_phase(addr, command)?;

        // Length byte arrives in its own non-autoend phase so the data phase
        // can be armed with the exact count.
        self.port.start(addr, 1, Direction::Read, false);
        self.wait_rx_ready()?;
        let announced = self.port.read_data() as usize;
        self.wait_transfer_complete()?;

        let count = announced.min(buf.len());
        if count == 0 {
            self.port.request_stop();
            self.wait_stop()?;
            return Ok(0);
        }

        self.port.start(addr, count as u8, Direction::Read, true);
        for slot in buf.iter_mut().take(count) {
            self.wait_rx_ready()?;
            *slot = self.port.read_data();
        }
        self.wait_stop()?;
        trace!(
            "read_block 0x{:02X} -> {} bytes ({} announced) @0x{:02X}",
            command,
            count,
            announced,
            addr
        );
        Ok(count)
    }

    fn write_command_phase(&mut self, addr: u8, command: u8) -> Result<(), BusError> {
        self.port.start(addr, 1, Direction::Write, false);
        self.send_bytes(&[command])?;
        self.wait_transfer_complete()
    }
}
