use opentpt::hal::sim::{SimBridge, SimSupply};
use opentpt::pmbus::cmd;
use opentpt::Instrument;

type SimInstrument = Instrument<SimBridge, SimSupply>;

fn instrument() -> SimInstrument {
    Instrument::new(SimBridge::new(), SimSupply::new())
}

fn query(instrument: &mut SimInstrument, line: &str) -> String {
    match instrument.dispatch(line) {
        Some(response) => response.to_string(),
        None => panic!("no response to {line:?}"),
    }
}

#[test]
fn identification() {
    let mut tpt = instrument();
    assert_eq!(query(&mut tpt, "*IDN?"), "OPEN_TPT,2402,00000000,0.0.1");
    assert_eq!(query(&mut tpt, "*idn?"), "OPEN_TPT,2402,00000000,0.0.1");
}

#[test]
fn system_version_and_self_test() {
    let mut tpt = instrument();
    assert_eq!(query(&mut tpt, "SYST:VERS?"), "1999.0");
    assert_eq!(query(&mut tpt, "*TST?"), "0");
}

#[test]
fn undefined_header_lands_in_error_queue() {
    let mut tpt = instrument();
    assert!(tpt.dispatch("FOO:BAR").is_none());
    assert_eq!(query(&mut tpt, "SYST:ERR:COUN?"), "1");
    assert_eq!(query(&mut tpt, "SYST:ERR?"), "-113,\"Undefined header\"");
    assert_eq!(query(&mut tpt, "SYST:ERR:NEXT?"), "0,\"No error\"");
}

#[test]
fn missing_parameter_is_reported() {
    let mut tpt = instrument();
    assert!(tpt.dispatch("CONF:PUL:ADD").is_none());
    assert_eq!(query(&mut tpt, "SYST:ERR?"), "-109,\"Missing parameter\"");
}

#[test]
fn out_of_range_period_is_reported() {
    let mut tpt = instrument();
    assert!(tpt.dispatch("CONF:PUL:ADD 1e-9").is_none());
    assert_eq!(query(&mut tpt, "SYST:ERR?"), "-222,\"Data out of range\"");
    assert!(tpt.engine().is_empty());
}

#[test]
fn bad_unit_suffix_is_reported() {
    let mut tpt = instrument();
    assert!(tpt.dispatch("CONF:PUL:ADD 10kg").is_none());
    assert_eq!(query(&mut tpt, "SYST:ERR?"), "-131,\"Invalid suffix\"");
}

#[test]
fn pulse_configuration_round_trip() {
    let mut tpt = instrument();
    tpt.dispatch("CONF:PUL:ADD 1e-5");
    tpt.dispatch("CONFigure:PULses:ADD 20us");
    tpt.dispatch("conf:pul:add 0.00001");
    assert_eq!(tpt.pending_errors(), 0);

    let listed = query(&mut tpt, "CONF:PUL?");
    let periods: Vec<f64> = listed.split(',').map(|s| s.parse().unwrap()).collect();
    assert_eq!(periods.len(), 3);
    assert!((periods[0] - 1e-5).abs() < 1e-12);
    assert!((periods[1] - 2e-5).abs() < 1e-12);
    assert!((periods[2] - 1e-5).abs() < 1e-12);

    tpt.dispatch("CONF:PUL:CLE");
    assert!(tpt.dispatch("CONF:PUL?").is_none());
    assert_eq!(tpt.pending_errors(), 0);
}

#[test]
fn period_limit_queries() {
    let mut tpt = instrument();
    assert_eq!(query(&mut tpt, "CONF:PUL:MIN?").parse::<f64>().unwrap(), 5e-7);
    assert_eq!(query(&mut tpt, "CONF:PUL:MAX?").parse::<f64>().unwrap(), 5e-2);
}

#[test]
fn run_counts_trains_and_reset_clears() {
    let mut tpt = instrument();
    tpt.dispatch("CONF:PUL:ADD 1e-5");
    tpt.dispatch("APP:PUL:RUN 3");
    assert_eq!(query(&mut tpt, "APP:PUL:COUN?"), "3");
    tpt.dispatch("APP:PUL:RUN 2");
    assert_eq!(query(&mut tpt, "APP:PUL:COUN?"), "5");
    assert_eq!(query(&mut tpt, "*OPC?"), "1");

    tpt.dispatch("*RST");
    assert_eq!(query(&mut tpt, "APP:PUL:COUN?"), "0");
    assert!(tpt.engine().is_empty());
}

#[test]
fn chained_commands_share_one_line() {
    let mut tpt = instrument();
    tpt.dispatch("CONF:PUL:ADD 1e-5;CONF:PUL:ADD 2e-5;APP:PUL:RUN 1");
    assert_eq!(tpt.pending_errors(), 0);
    assert_eq!(query(&mut tpt, "APP:PUL:COUN?"), "1");
}

#[test]
fn chained_queries_join_responses() {
    let mut tpt = instrument();
    assert_eq!(query(&mut tpt, "*TST?;*OPC?"), "0,1");
}

#[test]
fn cls_drains_error_queue() {
    let mut tpt = instrument();
    tpt.dispatch("BOGUS");
    tpt.dispatch("ALSO:BOGUS");
    assert_eq!(query(&mut tpt, "SYST:ERR:COUN?"), "2");
    tpt.dispatch("*CLS");
    assert_eq!(query(&mut tpt, "SYST:ERR:COUN?"), "0");
}

#[test]
fn pmbus_operations_require_initialization() {
    let mut tpt = instrument();
    assert!(tpt.dispatch("OUTP ON").is_none());
    assert_eq!(query(&mut tpt, "SYST:ERR?"), "-200,\"Execution error\"");
}

#[test]
fn output_state_drives_operation_register() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    tpt.dispatch("OUTP ON");
    assert_eq!(tpt.pmbus_mut().port_mut().word(cmd::OPERATION), 0x80);
    tpt.dispatch("OUTPut:STATe OFF");
    assert_eq!(tpt.pmbus_mut().port_mut().word(cmd::OPERATION), 0x00);
    assert_eq!(tpt.pending_errors(), 0);
}

#[test]
fn voltage_programming_and_measurement() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    tpt.dispatch("SOUR:VOLT 12");
    assert_eq!(tpt.pending_errors(), 0);

    // The model regulates perfectly, measurement mirrors the setpoint.
    let setpoint: f64 = query(&mut tpt, "SOUR:VOLT?").parse().unwrap();
    let measured: f64 = query(&mut tpt, "MEAS:VOLT?").parse().unwrap();
    assert!((setpoint - 12.0).abs() < 2f64.powi(-9));
    assert!((measured - 12.0).abs() < 2f64.powi(-9));
}

#[test]
fn voltage_source_prefix_is_optional() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    tpt.dispatch("VOLT 5");
    assert_eq!(tpt.pending_errors(), 0);
    let setpoint: f64 = query(&mut tpt, "VOLT?").parse().unwrap();
    assert!((setpoint - 5.0).abs() < 2f64.powi(-9));
    let long: f64 = query(&mut tpt, "VOLTage:LEVel?").parse().unwrap();
    assert!((long - 5.0).abs() < 2f64.powi(-9));
}

#[test]
fn voltage_accepts_unit_suffixes() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    tpt.dispatch("SOURce:VOLTage:LEVel:IMMediate:AMPLitude 3300mV");
    let setpoint: f64 = query(&mut tpt, "SOUR:VOLT?").parse().unwrap();
    assert!((setpoint - 3.3).abs() < 2f64.powi(-9));
}

#[test]
fn raw_register_access_round_trip() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    tpt.dispatch("PMB:REG 0x21,6144,2");
    assert_eq!(query(&mut tpt, "PMB:REG? 0x8B,2"), "6144");
    assert_eq!(tpt.pending_errors(), 0);
}

#[test]
fn register_width_defaults_to_one_byte() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    tpt.dispatch("PMB:REG 0x00,3");
    assert_eq!(query(&mut tpt, "PMB:REG? 0x00"), "3");
    assert!(tpt.dispatch("PMB:REG 0x00,1,7").is_none());
    assert_eq!(
        query(&mut tpt, "SYST:ERR?"),
        "-224,\"Illegal parameter value\""
    );
}

#[test]
fn pmbus_address_query_and_validation() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    assert_eq!(query(&mut tpt, "PMB:ADDR?"), "90");
    tpt.dispatch("PMB:ADDR 0x03");
    assert_eq!(
        query(&mut tpt, "SYST:ERR?"),
        "-224,\"Illegal parameter value\""
    );
    assert_eq!(query(&mut tpt, "PMB:ADDR?"), "90");
}

#[test]
fn telemetry_queries() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    let vin: f64 = query(&mut tpt, "MEAS:VOLT:INP?").parse().unwrap();
    assert!((vin - 230.0).abs() < 0.25);
    let iout: f64 = query(&mut tpt, "MEAS:CURR?").parse().unwrap();
    assert!((iout - 1.5).abs() < 0.1);
    let temp: f64 = query(&mut tpt, "MEAS:TEMP?").parse().unwrap();
    assert!((temp - 34.0).abs() < 0.25);
    let temp2: f64 = query(&mut tpt, "MEAS:TEMP2?").parse().unwrap();
    assert!((temp2 - 41.5).abs() < 0.25);
    let pout: f64 = query(&mut tpt, "MEAS:POW?").parse().unwrap();
    assert!((pout - 36.0).abs() < 0.25);
}

#[test]
fn temperature_channels_answer_all_header_forms() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    for header in ["MEAS:TEMP?", "MEAS:TEMP1?", "MEASURE:TEMPERATURE1?"] {
        let temp: f64 = query(&mut tpt, header).parse().unwrap();
        assert!((temp - 34.0).abs() < 0.25, "{header}");
    }
    let temp2: f64 = query(&mut tpt, "MEAS:TEMP2?").parse().unwrap();
    assert!((temp2 - 41.5).abs() < 0.25);
    assert_eq!(tpt.pending_errors(), 0);
}

#[test]
fn status_and_manufacturer_queries() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    assert_eq!(query(&mut tpt, "STAT:BYTE?"), "0");
    assert_eq!(query(&mut tpt, "STAT:WORD?"), "0");
    assert_eq!(query(&mut tpt, "SYST:MFR:ID?"), "OPENSIM");
    assert_eq!(query(&mut tpt, "SYST:MFR:MOD?"), "COOLX600");
    assert_eq!(query(&mut tpt, "SYST:MFR:SER?"), "SIM00001");
}

#[test]
fn protection_clear_sends_clear_faults() {
    let mut tpt = instrument();
    tpt.dispatch("PMB:INIT");
    tpt.pmbus_mut().port_mut().set_word(cmd::STATUS_BYTE, 0x41);
    tpt.dispatch("OUTP:PROT:CLE");
    assert_eq!(query(&mut tpt, "STAT:BYTE?"), "0");
    assert_eq!(tpt.pending_errors(), 0);
}

#[test]
fn error_queue_overflow_marks_newest() {
    let mut tpt = instrument();
    for _ in 0..25 {
        tpt.dispatch("NOT:A:COMMAND");
    }
    assert_eq!(query(&mut tpt, "SYST:ERR:COUN?"), "17");
    for _ in 0..16 {
        assert_eq!(query(&mut tpt, "SYST:ERR?"), "-113,\"Undefined header\"");
    }
    assert_eq!(query(&mut tpt, "SYST:ERR?"), "-350,\"Queue overflow\"");
    assert_eq!(query(&mut tpt, "SYST:ERR?"), "0,\"No error\"");
}
