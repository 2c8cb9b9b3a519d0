//! PMBus protocol host.
//!
//! High-level operations against a PMBus power supply: on/off control,
//! output voltage programming in Linear16, Linear11 telemetry, status and
//! manufacturer queries, and raw register access for bring-up work. The host
//! keeps a small registry of known devices and caches the VOUT_MODE exponent
//! per device so voltage traffic costs one transfer, not two.

use thiserror::Error;
use tracing::{debug, warn};

use crate::hal::{BusError, SmbusPort};
use crate::linear::{
    f64_to_linear16, linear11_to_f64, linear16_to_f64, sign_extend_exponent,
};
use crate::smbus::SmbusMaster;

/// PMBus command codes used by the host.
pub mod cmd {
    pub const PAGE: u8 = 0x00;
    pub const OPERATION: u8 = 0x01;
    pub const ON_OFF_CONFIG: u8 = 0x02;
    pub const CLEAR_FAULTS: u8 = 0x03;
    pub const VOUT_MODE: u8 = 0x20;
    pub const VOUT_COMMAND: u8 = 0x21;
    pub const STATUS_BYTE: u8 = 0x78;
    pub const STATUS_WORD: u8 = 0x79;
    pub const STATUS_VOUT: u8 = 0x7A;
    pub const STATUS_IOUT: u8 = 0x7B;
    pub const STATUS_INPUT: u8 = 0x7C;
    pub const STATUS_TEMPERATURE: u8 = 0x7D;
    pub const READ_VIN: u8 = 0x88;
    pub const READ_IIN: u8 = 0x89;
    pub const READ_VOUT: u8 = 0x8B;
    pub const READ_IOUT: u8 = 0x8C;
    pub const READ_TEMPERATURE_1: u8 = 0x8D;
    pub const READ_TEMPERATURE_2: u8 = 0x8E;
    pub const READ_POUT: u8 = 0x96;
    pub const READ_PIN: u8 = 0x97;
    pub const MFR_ID: u8 = 0x99;
    pub const MFR_MODEL: u8 = 0x9A;
    pub const MFR_SERIAL: u8 = 0x9E;
}

/// OPERATION register values.
pub mod operation {
    pub const ON: u8 = 0x80;
    pub const OFF_IMMEDIATE: u8 = 0x00;
}

/// Factory-default device address.
pub const DEFAULT_ADDRESS: u8 = 0x5A;

/// First valid 7-bit device address (below are reserved).
pub const ADDRESS_MIN: u8 = 0x08;
/// Last valid 7-bit device address.
pub const ADDRESS_MAX: u8 = 0x77;

/// Devices the registry can hold.
pub const MAX_DEVICES: usize = 4;

/// Longest manufacturer block the host stores.
pub const MFR_BLOCK_LEN: usize = 32;

/// Manufacturer strings come back as fixed-capacity ASCII.
pub type MfrString = arrayvec::ArrayString<MFR_BLOCK_LEN>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PmbusError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("host not initialized")]
    NotInitialized,
    #[error("address 0x{0:02X} outside the 7-bit device range")]
    InvalidAddress(u8),
    #[error("device registry full")]
    RegistryFull,
}

/// One known device on the bus.
#[derive(Debug, Clone, Copy)]
pub struct DeviceRecord {
    pub address: u8,
    pub page: u8,
    /// Last transfer toward this device was acknowledged.
    pub online: bool,
}

/// PMBus host over an SMBus transfer driver.
#[derive(Debug)]
pub struct PmbusHost<P: SmbusPort> {
    bus: SmbusMaster<P>,
    devices: heapless::Vec<DeviceRecord, MAX_DEVICES>,
    current: usize,
    vout_exponent: Option<i8>,
    initialized: bool,
}

impl<P: SmbusPort> PmbusHost<P> {
    pub fn new(port: P) -> Self {
        Self {
            bus: SmbusMaster::new(port),
            devices: heapless::Vec::new(),
            current: 0,
            vout_exponent: None,
            initialized: false,
        }
    }

    pub fn port_mut(&mut self) -> &mut P {
        self.bus.port_mut()
    }

    /// Bring the host up with the factory-default device. Idempotent.
    pub fn init(&mut self) -> Result<(), PmbusError> {
        if self.initialized {
            return Ok(());
        }
        self.devices
            .push(DeviceRecord {
                address: DEFAULT_ADDRESS,
                page: 0,
                online: false,
            })
            .map_err(|_| PmbusError::RegistryFull)?;
        self.current = 0;
        self.vout_exponent = None;
        self.initialized = true;
        debug!("PMBus host up, device at 0x{:02X}", DEFAULT_ADDRESS);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn device(&self) -> Result<&DeviceRecord, PmbusError> {
        if !self.initialized {
            return Err(PmbusError::NotInitialized);
        }
        self.devices.get(self.current).ok_or(PmbusError::NotInitialized)
    }

    fn device_mut(&mut self) -> Result<&mut DeviceRecord, PmbusError> {
        if !self.initialized {
            return Err(PmbusError::NotInitialized);
        }
        self.devices
            .get_mut(self.current)
            .ok_or(PmbusError::NotInitialized)
    }

    pub fn address(&self) -> Result<u8, PmbusError> {
        Ok(self.device()?.address)
    }

    /// Retarget the current device slot. Clears the cached VOUT exponent,
    /// the new device may scale differently.
    pub fn set_address(&mut self, address: u8) -> Result<(), PmbusError> {
        if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
            return Err(PmbusError::InvalidAddress(address));
        }
        let device = self.device_mut()?;
        device.address = address;
        device.online = false;
        self.vout_exponent = None;
        Ok(())
    }

    pub fn device_online(&self) -> Result<bool, PmbusError> {
        Ok(self.device()?.online)
    }

    fn note_result<T>(&mut self, result: Result<T, BusError>) -> Result<T, PmbusError> {
        match result {
            Ok(value) => {
                if let Ok(device) = self.device_mut() {
                    device.online = true;
                }
                Ok(value)
            }
            Err(e) => {
                if e == BusError::Nack {
                    if let Ok(device) = self.device_mut() {
                        device.online = false;
                    }
                }
                warn!("PMBus transfer failed: {}", e);
                Err(PmbusError::Bus(e))
            }
        }
    }

    fn bus_send_byte(&mut self, command: u8) -> Result<(), PmbusError> {
        let addr = self.address()?;
        let result = self.bus.send_byte(addr, command);
        self.note_result(result)
    }

    fn bus_write_byte(&mut self, command: u8, data: u8) -> Result<(), PmbusError> {
        let addr = self.address()?;
        let result = self.bus.write_byte(addr, command, data);
        self.note_result(result)
    }

    fn bus_write_word(&mut self, command: u8, data: u16) -> Result<(), PmbusError> {
        let addr = self.address()?;
        let result = self.bus.write_word(addr, command, data);
        self.note_result(result)
    }

    fn bus_read_byte(&mut self, command: u8) -> Result<u8, PmbusError> {
        let addr = self.address()?;
        let result = self.bus.read_byte(addr, command);
        self.note_result(result)
    }

    fn bus_read_word(&mut self, command: u8) -> Result<u16, PmbusError> {
        let addr = self.address()?;
        let result = self.bus.read_word(addr, command);
        self.note_result(result)
    }

    /// VOUT scaling exponent, read once from VOUT_MODE and cached.
    pub fn vout_exponent(&mut self) -> Result<i8, PmbusError> {
        if let Some(exp) = self.vout_exponent {
            return Ok(exp);
        }
        let raw = self.bus_read_byte(cmd::VOUT_MODE)?;
        let exp = sign_extend_exponent(raw);
        debug!("VOUT_MODE: 0x{:02X} (exponent {})", raw, exp);
        self.vout_exponent = Some(exp);
        Ok(exp)
    }

    pub fn power_on(&mut self) -> Result<(), PmbusError> {
        self.set_operation(operation::ON)
    }

    pub fn power_off(&mut self) -> Result<(), PmbusError> {
        self.set_operation(operation::OFF_IMMEDIATE)
    }

    pub fn set_operation(&mut self, value: u8) -> Result<(), PmbusError> {
        self.bus_write_byte(cmd::OPERATION, value)
    }

    pub fn operation(&mut self) -> Result<u8, PmbusError> {
        self.bus_read_byte(cmd::OPERATION)
    }

    pub fn clear_faults(&mut self) -> Result<(), PmbusError> {
        self.bus_send_byte(cmd::CLEAR_FAULTS)
    }

    pub fn set_page(&mut self, page: u8) -> Result<(), PmbusError> {
        self.bus_write_byte(cmd::PAGE, page)?;
        self.device_mut()?.page = page;
        Ok(())
    }

    pub fn page(&self) -> Result<u8, PmbusError> {
        Ok(self.device()?.page)
    }

    /// Program the output voltage setpoint in volts.
    pub fn set_vout(&mut self, volts: f64) -> Result<(), PmbusError> {
        let exp = self.vout_exponent()?;
        self.bus_write_word(cmd::VOUT_COMMAND, f64_to_linear16(volts, exp))
    }

    /// Programmed output voltage setpoint in volts.
    pub fn vout_setpoint(&mut self) -> Result<f64, PmbusError> {
        let exp = self.vout_exponent()?;
        let word = self.bus_read_word(cmd::VOUT_COMMAND)?;
        Ok(linear16_to_f64(word, exp))
    }

    /// Measured output voltage in volts.
    pub fn read_vout(&mut self) -> Result<f64, PmbusError> {
        let exp = self.vout_exponent()?;
        let word = self.bus_read_word(cmd::READ_VOUT)?;
        Ok(linear16_to_f64(word, exp))
    }

    fn read_linear11(&mut self, command: u8) -> Result<f64, PmbusError> {
        let word = self.bus_read_word(command)?;
        Ok(linear11_to_f64(word))
    }

    pub fn read_vin(&mut self) -> Result<f64, PmbusError> {
        self.read_linear11(cmd::READ_VIN)
    }

    pub fn read_iin(&mut self) -> Result<f64, PmbusError> {
        self.read_linear11(cmd::READ_IIN)
    }

    pub fn read_iout(&mut self) -> Result<f64, PmbusError> {
        self.read_linear11(cmd::READ_IOUT)
    }

    pub fn read_temperature_1(&mut self) -> Result<f64, PmbusError> {
        self.read_linear11(cmd::READ_TEMPERATURE_1)
    }

    pub fn read_temperature_2(&mut self) -> Result<f64, PmbusError> {
        self.read_linear11(cmd::READ_TEMPERATURE_2)
    }

    pub fn read_pout(&mut self) -> Result<f64, PmbusError> {
        self.read_linear11(cmd::READ_POUT)
    }

    pub fn read_pin(&mut self) -> Result<f64, PmbusError> {
        self.read_linear11(cmd::READ_PIN)
    }

    pub fn status_byte(&mut self) -> Result<u8, PmbusError> {
        self.bus_read_byte(cmd::STATUS_BYTE)
    }

    pub fn status_word(&mut self) -> Result<u16, PmbusError> {
        self.bus_read_word(cmd::STATUS_WORD)
    }

    pub fn status_vout(&mut self) -> Result<u8, PmbusError> {
        self.bus_read_byte(cmd::STATUS_VOUT)
    }

    pub fn status_iout(&mut self) -> Result<u8, PmbusError> {
        self.bus_read_byte(cmd::STATUS_IOUT)
    }

    pub fn status_input(&mut self) -> Result<u8, PmbusError> {
        self.bus_read_byte(cmd::STATUS_INPUT)
    }

    pub fn status_temperature(&mut self) -> Result<u8, PmbusError> {
        self.bus_read_byte(cmd::STATUS_TEMPERATURE)
    }

    fn read_mfr_block(&mut self, command: u8) -> Result<MfrString, PmbusError> {
        let addr = self.address()?;
        let mut buf = [0u8; MFR_BLOCK_LEN];
        let result = self.bus.read_block(addr, command, &mut buf);
        let count = self.note_result(result)?;
        let mut out = MfrString::new();
        // Printable ASCII only; anything else (padding, line noise) is dropped.
        for &byte in buf.iter().take(count) {
            if (0x20..0x7F).contains(&byte) {
                let _ = out.try_push(byte as char);
            }
        }
        Ok(out)
    }

    pub fn mfr_id(&mut self) -> Result<MfrString, PmbusError> {
        self.read_mfr_block(cmd::MFR_ID)
    }

    pub fn mfr_model(&mut self) -> Result<MfrString, PmbusError> {
        self.read_mfr_block(cmd::MFR_MODEL)
    }

    pub fn mfr_serial(&mut self) -> Result<MfrString, PmbusError> {
        self.read_mfr_block(cmd::MFR_SERIAL)
    }

    /// Raw register write, width 1 or 2 bytes.
    pub fn write_register(&mut self, command: u8, data: u16, width: u8) -> Result<(), PmbusError> {
        match width {
            1 => self.bus_write_byte(command, data as u8),
            _ => self.bus_write_word(command, data),
        }
    }

    /// Raw register read, width 1 or 2 bytes.
    pub fn read_register(&mut self, command: u8, width: u8) -> Result<u16, PmbusError> {
        match width {
            1 => Ok(u16::from(self.bus_read_byte(command)?)),
            _ => self.bus_read_word(command),
        }
    }
}
