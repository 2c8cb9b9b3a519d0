//! Instrument front end.
//!
//! Owns the pulse engine, the half bridge, the PMBus host and the SCPI
//! error queue, and maps every command the instrument understands onto
//! them. One line in, at most one response line out; failures land in the
//! error queue for `SYSTem:ERRor?` instead of on the wire.

use tracing::warn;

use crate::hal::{PulseBridge, SmbusPort};
use crate::pmbus::{PmbusError, PmbusHost};
use crate::pulse::{EngineError, PulseEngine, MAX_PERIOD_S, MIN_PERIOD_S};
use crate::scpi::params::Params;
use crate::scpi::{pattern, ErrorQueue, Response, ResponseBuffer, ScpiError};

const IDN: &str = "OPEN_TPT,2402,00000000,0.0.1";
const SCPI_VERSION: &str = "1999.0";

/// Everything the command table can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Idn,
    Rst,
    Cls,
    Opc,
    OpcQ,
    Wai,
    TstQ,
    SystemVersionQ,
    ErrorNextQ,
    ErrorCountQ,
    PulseAdd,
    PulseClear,
    PulsesQ,
    PulseMinQ,
    PulseMaxQ,
    PulseRun,
    PulseCountQ,
    PmbusInit,
    PmbusAddress,
    PmbusAddressQ,
    PmbusPage,
    PmbusPageQ,
    PmbusOperation,
    PmbusOperationQ,
    PmbusClear,
    PmbusRegister,
    PmbusRegisterQ,
    OutputState,
    SetVoltage,
    VoltageQ,
    MeasVoltageQ,
    MeasVinQ,
    MeasCurrentQ,
    MeasIinQ,
    MeasPowerQ,
    MeasPinQ,
    MeasTemp1Q,
    MeasTemp2Q,
    StatusByteQ,
    StatusWordQ,
    MfrIdQ,
    MfrModelQ,
    MfrSerialQ,
}

/// Pattern table searched in order; first match wins.
const COMMANDS: &[(&str, Command)] = &[
    ("*IDN?", Command::Idn),
    ("*RST", Command::Rst),
    ("*CLS", Command::Cls),
    ("*OPC?", Command::OpcQ),
    ("*OPC", Command::Opc),
    ("*WAI", Command::Wai),
    ("*TST?", Command::TstQ),
    ("SYSTem:VERSion?", Command::SystemVersionQ),
    ("SYSTem:ERRor[:NEXT]?", Command::ErrorNextQ),
    ("SYSTem:ERRor:COUNt?", Command::ErrorCountQ),
    ("CONFigure:PULses:ADD", Command::PulseAdd),
    ("CONFigure:PULses:CLEar", Command::PulseClear),
    ("CONFigure:PULses?", Command::PulsesQ),
    ("CONFigure:PULses:MINimum?", Command::PulseMinQ),
    ("CONFigure:PULses:MAXimum?", Command::PulseMaxQ),
    ("APPlication:PULses:RUN", Command::PulseRun),
    ("APPlication:PULses:COUNt?", Command::PulseCountQ),
    ("PMBus:INITialize", Command::PmbusInit),
    ("PMBus:ADDRess?", Command::PmbusAddressQ),
    ("PMBus:ADDRess", Command::PmbusAddress),
    ("PMBus:PAGE?", Command::PmbusPageQ),
    ("PMBus:PAGE", Command::PmbusPage),
    ("PMBus:OPERation?", Command::PmbusOperationQ),
    ("PMBus:OPERation", Command::PmbusOperation),
    ("PMBus:CLEar", Command::PmbusClear),
    ("PMBus:REGister?", Command::PmbusRegisterQ),
    ("PMBus:REGister", Command::PmbusRegister),
    ("OUTPut:PROTection:CLEar", Command::PmbusClear),
    ("OUTPut[:STATe]", Command::OutputState),
    (
        "[SOURce:]VOLTage[:LEVel][:IMMediate][:AMPLitude]?",
        Command::VoltageQ,
    ),
    (
        "[SOURce:]VOLTage[:LEVel][:IMMediate][:AMPLitude]",
        Command::SetVoltage,
    ),
    ("MEASure[:SCALar]:VOLTage[:DC]?", Command::MeasVoltageQ),
    ("MEASure[:SCALar]:VOLTage:INPut?", Command::MeasVinQ),
    ("MEASure[:SCALar]:CURRent[:DC]?", Command::MeasCurrentQ),
    ("MEASure[:SCALar]:CURRent:INPut?", Command::MeasIinQ),
    ("MEASure[:SCALar]:POWer[:DC]?", Command::MeasPowerQ),
    ("MEASure[:SCALar]:POWer:INPut?", Command::MeasPinQ),
    ("MEASure[:SCALar]:TEMPerature?", Command::MeasTemp1Q),
    ("MEASure[:SCALar]:TEMPerature1?", Command::MeasTemp1Q),
    ("MEASure[:SCALar]:TEMPerature2?", Command::MeasTemp2Q),
    ("STATus:BYTE?", Command::StatusByteQ),
    ("STATus:WORD?", Command::StatusWordQ),
    ("SYSTem:MFR:ID?", Command::MfrIdQ),
    ("SYSTem:MFR:MODel?", Command::MfrModelQ),
    ("SYSTem:MFR:SERial?", Command::MfrSerialQ),
];

/// The instrument: SCPI surface over the pulse engine and the PMBus host.
#[derive(Debug)]
pub struct Instrument<B: PulseBridge, P: SmbusPort> {
    engine: PulseEngine,
    bridge: B,
    pmbus: PmbusHost<P>,
    errors: ErrorQueue,
}

impl<B: PulseBridge, P: SmbusPort> Instrument<B, P> {
    pub fn new(bridge: B, port: P) -> Self {
        Self {
            engine: PulseEngine::new(),
            bridge,
            pmbus: PmbusHost::new(port),
            errors: ErrorQueue::new(),
        }
    }

    pub fn engine(&self) -> &PulseEngine {
        &self.engine
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn pmbus_mut(&mut self) -> &mut PmbusHost<P> {
        &mut self.pmbus
    }

    pub fn pending_errors(&self) -> usize {
        self.errors.len()
    }

    /// Process one input line, which may chain commands with `;`.
    /// Returns the response line (without terminator) if any command
    /// queried something; command failures go to the error queue.
    pub fn dispatch(&mut self, line: &str) -> Option<ResponseBuffer> {
        let mut response = Response::new();
        for unit in line.split(';') {
            let unit = unit.trim();
            if unit.is_empty() {
                continue;
            }
            if let Err(e) = self.execute(unit, &mut response) {
                warn!("command {:?} failed: {} {}", unit, e.code(), e.message());
                self.errors.push(e);
            }
        }
        if response.is_empty() {
            None
        } else {
            let mut out = ResponseBuffer::new();
            let _ = out.try_push_str(response.as_str());
            Some(out)
        }
    }

    fn execute(&mut self, unit: &str, response: &mut Response) -> Result<(), ScpiError> {
        let (header, raw_params) = match unit.find(char::is_whitespace) {
            Some(i) => (&unit[..i], unit[i..].trim()),
            None => (unit, ""),
        };
        let command = COMMANDS
            .iter()
            .find(|(p, _)| pattern::matches(p, header))
            .map(|&(_, c)| c)
            .ok_or(ScpiError::UndefinedHeader)?;
        let mut params = Params::parse(raw_params)?;
        self.run_command(command, &mut params, response)?;
        params.finish()
    }

    fn run_command(
        &mut self,
        command: Command,
        params: &mut Params<'_>,
        response: &mut Response,
    ) -> Result<(), ScpiError> {
        match command {
            Command::Idn => response.put_str(IDN),
            Command::Rst => {
                self.engine.reset();
                self.bridge.release();
                Ok(())
            }
            Command::Cls => {
                self.errors.clear();
                Ok(())
            }
            // Overlapped commands do not exist here, so *OPC and *WAI are
            // complete the moment they are parsed.
            Command::Opc | Command::Wai => Ok(()),
            Command::OpcQ => response.put_int(i64::from(!self.engine.is_running())),
            Command::TstQ => response.put_int(0),
            Command::SystemVersionQ => response.put_str(SCPI_VERSION),
            Command::ErrorNextQ => response.put_error(self.errors.pop()),
            Command::ErrorCountQ => response.put_int(self.errors.len() as i64),
            Command::PulseAdd => {
                let period = params.next_seconds()?;
                self.engine.add_pulse(period).map_err(engine_error)
            }
            Command::PulseClear => {
                self.engine.clear();
                Ok(())
            }
            Command::PulsesQ => {
                for period in self.engine.periods_s() {
                    response.put_f64(period)?;
                }
                Ok(())
            }
            Command::PulseMinQ => response.put_f64(MIN_PERIOD_S),
            Command::PulseMaxQ => response.put_f64(MAX_PERIOD_S),
            Command::PulseRun => {
                let repetitions = params.next_u32()?;
                self.engine.run(&mut self.bridge, repetitions);
                Ok(())
            }
            Command::PulseCountQ => response.put_int(self.engine.completed_trains() as i64),
            Command::PmbusInit => self.pmbus.init().map_err(pmbus_error),
            Command::PmbusAddress => {
                let address = params.next_u32()?;
                let address = u8::try_from(address).map_err(|_| ScpiError::DataOutOfRange)?;
                self.pmbus.set_address(address).map_err(pmbus_error)
            }
            Command::PmbusAddressQ => {
                let address = self.pmbus.address().map_err(pmbus_error)?;
                response.put_int(i64::from(address))
            }
            Command::PmbusPage => {
                let page = params.next_u32()?;
                let page = u8::try_from(page).map_err(|_| ScpiError::DataOutOfRange)?;
                self.pmbus.set_page(page).map_err(pmbus_error)
            }
            Command::PmbusPageQ => {
                let page = self.pmbus.page().map_err(pmbus_error)?;
                response.put_int(i64::from(page))
            }
            Command::PmbusOperation => {
                let value = params.next_u32()?;
                let value = u8::try_from(value).map_err(|_| ScpiError::DataOutOfRange)?;
                self.pmbus.set_operation(value).map_err(pmbus_error)
            }
            Command::PmbusOperationQ => {
                let value = self.pmbus.operation().map_err(pmbus_error)?;
                response.put_int(i64::from(value))
            }
            Command::PmbusClear => self.pmbus.clear_faults().map_err(pmbus_error),
            Command::PmbusRegister => {
                let register = params.next_u32()?;
                let register = u8::try_from(register).map_err(|_| ScpiError::DataOutOfRange)?;
                let data = params.next_u32()?;
                let data = u16::try_from(data).map_err(|_| ScpiError::DataOutOfRange)?;
                let width = register_width(params)?;
                self.pmbus
                    .write_register(register, data, width)
                    .map_err(pmbus_error)
            }
            Command::PmbusRegisterQ => {
                let register = params.next_u32()?;
                let register = u8::try_from(register).map_err(|_| ScpiError::DataOutOfRange)?;
                let width = register_width(params)?;
                let data = self.pmbus.read_register(register, width).map_err(pmbus_error)?;
                response.put_int(i64::from(data))
            }
            Command::OutputState => {
                if params.next_on_off()? {
                    self.pmbus.power_on().map_err(pmbus_error)
                } else {
                    self.pmbus.power_off().map_err(pmbus_error)
                }
            }
            Command::SetVoltage => {
                let volts = params.next_voltage()?;
                self.pmbus.set_vout(volts).map_err(pmbus_error)
            }
            Command::VoltageQ => {
                let volts = self.pmbus.vout_setpoint().map_err(pmbus_error)?;
                response.put_f64(volts)
            }
            Command::MeasVoltageQ => self.put_measure(response, PmbusHost::read_vout),
            Command::MeasVinQ => self.put_measure(response, PmbusHost::read_vin),
            Command::MeasCurrentQ => self.put_measure(response, PmbusHost::read_iout),
            Command::MeasIinQ => self.put_measure(response, PmbusHost::read_iin),
            Command::MeasPowerQ => self.put_measure(response, PmbusHost::read_pout),
            Command::MeasPinQ => self.put_measure(response, PmbusHost::read_pin),
            Command::MeasTemp1Q => self.put_measure(response, PmbusHost::read_temperature_1),
            Command::MeasTemp2Q => self.put_measure(response, PmbusHost::read_temperature_2),
            Command::StatusByteQ => {
                let status = self.pmbus.status_byte().map_err(pmbus_error)?;
                response.put_int(i64::from(status))
            }
            Command::StatusWordQ => {
                let status = self.pmbus.status_word().map_err(pmbus_error)?;
                response.put_int(i64::from(status))
            }
            Command::MfrIdQ => {
                let id = self.pmbus.mfr_id().map_err(pmbus_error)?;
                response.put_str(&id)
            }
            Command::MfrModelQ => {
                let model = self.pmbus.mfr_model().map_err(pmbus_error)?;
                response.put_str(&model)
            }
            Command::MfrSerialQ => {
                let serial = self.pmbus.mfr_serial().map_err(pmbus_error)?;
                response.put_str(&serial)
            }
        }
    }

    fn put_measure(
        &mut self,
        response: &mut Response,
        read: fn(&mut PmbusHost<P>) -> Result<f64, PmbusError>,
    ) -> Result<(), ScpiError> {
        let value = read(&mut self.pmbus).map_err(pmbus_error)?;
        response.put_f64(value)
    }
}

/// Optional trailing width parameter for raw register access.
fn register_width(params: &mut Params<'_>) -> Result<u8, ScpiError> {
    match params.opt_u32()? {
        None => Ok(1),
        Some(1) => Ok(1),
        Some(2) => Ok(2),
        Some(_) => Err(ScpiError::IllegalParameterValue),
    }
}

fn engine_error(e: EngineError) -> ScpiError {
    match e {
        EngineError::InvalidPeriod => ScpiError::IllegalParameterValue,
        EngineError::PeriodOutOfRange(_) | EngineError::SequenceFull => ScpiError::DataOutOfRange,
    }
}

fn pmbus_error(e: PmbusError) -> ScpiError {
    match e {
        PmbusError::InvalidAddress(_) => ScpiError::IllegalParameterValue,
        PmbusError::Bus(_) | PmbusError::NotInitialized | PmbusError::RegistryFull => {
            ScpiError::ExecutionError
        }
    }
}
