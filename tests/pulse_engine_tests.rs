use opentpt::hal::sim::{OutputState, SimBridge, SIM_CYCLE_RATE_HZ};
use opentpt::pulse::{
    EngineError, PulseEngine, DEADTIME_NS, MAX_PERIOD_S, MAX_PULSES, MIN_PERIOD_S,
};

#[test]
fn periods_are_quantized_to_half_microsecond() {
    let mut engine = PulseEngine::new();
    engine.add_pulse(10.0e-6).unwrap();
    engine.add_pulse(20.3e-6).unwrap();

    let stored: Vec<f64> = engine.periods_s().collect();
    assert_eq!(stored.len(), 2);
    assert!((stored[0] - 10.0e-6).abs() < 1e-12);
    // 20.3 us rounds to 20.5 us, the nearest quantum multiple.
    assert!((stored[1] - 20.5e-6).abs() < 1e-12);
}

#[test]
fn rejects_invalid_periods() {
    let mut engine = PulseEngine::new();
    assert_eq!(engine.add_pulse(f64::NAN), Err(EngineError::InvalidPeriod));
    assert_eq!(
        engine.add_pulse(f64::INFINITY),
        Err(EngineError::InvalidPeriod)
    );
    assert_eq!(engine.add_pulse(0.0), Err(EngineError::InvalidPeriod));
    assert_eq!(engine.add_pulse(-1e-5), Err(EngineError::InvalidPeriod));
    assert_eq!(
        engine.add_pulse(1e-9),
        Err(EngineError::PeriodOutOfRange(1e-9))
    );
    assert_eq!(
        engine.add_pulse(MAX_PERIOD_S * 2.0),
        Err(EngineError::PeriodOutOfRange(MAX_PERIOD_S * 2.0))
    );
    assert!(engine.is_empty());
}

#[test]
fn boundary_periods_are_accepted() {
    let mut engine = PulseEngine::new();
    engine.add_pulse(MIN_PERIOD_S).unwrap();
    engine.add_pulse(MAX_PERIOD_S).unwrap();
    assert_eq!(engine.len(), 2);
}

#[test]
fn sequence_capacity_is_enforced() {
    let mut engine = PulseEngine::new();
    for _ in 0..MAX_PULSES {
        engine.add_pulse(10.0e-6).unwrap();
    }
    assert_eq!(engine.add_pulse(10.0e-6), Err(EngineError::SequenceFull));
    assert_eq!(engine.len(), MAX_PULSES);
}

#[test]
fn clear_empties_sequence_but_keeps_counter() {
    let mut engine = PulseEngine::new();
    let mut bridge = SimBridge::new();
    engine.add_pulse(10.0e-6).unwrap();
    engine.run(&mut bridge, 2);
    engine.clear();
    assert!(engine.is_empty());
    assert_eq!(engine.completed_trains(), 2);
}

#[test]
fn train_counter_accumulates_across_runs() {
    let mut engine = PulseEngine::new();
    let mut bridge = SimBridge::new();
    engine.add_pulse(5.0e-6).unwrap();
    engine.add_pulse(5.0e-6).unwrap();

    engine.run(&mut bridge, 3);
    assert_eq!(engine.completed_trains(), 3);
    engine.run(&mut bridge, 2);
    assert_eq!(engine.completed_trains(), 5);

    engine.reset();
    assert_eq!(engine.completed_trains(), 0);
    assert!(engine.is_empty());
    assert!(!engine.is_running());
}

#[test]
fn run_alternates_polarity_starting_positive() {
    let mut engine = PulseEngine::new();
    let mut bridge = SimBridge::new();
    engine.add_pulse(10.0e-6).unwrap();
    engine.add_pulse(20.0e-6).unwrap();
    engine.add_pulse(10.0e-6).unwrap();
    engine.run(&mut bridge, 1);

    let driven: Vec<OutputState> = bridge
        .transitions()
        .iter()
        .map(|t| t.state)
        .filter(|s| *s != OutputState::Safe)
        .collect();
    assert_eq!(
        driven,
        vec![
            OutputState::Positive,
            OutputState::Negative,
            OutputState::Positive
        ]
    );

    // Outputs end in the safe state.
    assert_eq!(
        bridge.transitions().last().map(|t| t.state),
        Some(OutputState::Safe)
    );
    assert!(bridge.sections_balanced());
}

#[test]
fn deadtime_held_before_every_turn_on() {
    let mut engine = PulseEngine::new();
    let mut bridge = SimBridge::new();
    for _ in 0..4 {
        engine.add_pulse(10.0e-6).unwrap();
    }
    engine.run(&mut bridge, 2);

    let deadtime_cycles = SIM_CYCLE_RATE_HZ * DEADTIME_NS / 1_000_000_000;
    let transitions = bridge.transitions();
    for pair in transitions.windows(2) {
        if pair[1].state != OutputState::Safe {
            assert_eq!(
                pair[0].state,
                OutputState::Safe,
                "gate turned on without passing through the safe state"
            );
            let gap = pair[1].cycle - pair[0].cycle;
            assert!(
                gap >= deadtime_cycles,
                "only {gap} cycles of dead-time before turn-on, need {deadtime_cycles}"
            );
        }
    }
}

#[test]
fn run_with_empty_sequence_is_a_no_op_on_outputs() {
    let mut engine = PulseEngine::new();
    let mut bridge = SimBridge::new();
    engine.run(&mut bridge, 5);
    assert_eq!(engine.completed_trains(), 5);
    let driven = bridge
        .transitions()
        .iter()
        .any(|t| t.state != OutputState::Safe);
    assert!(!driven);
}

#[test]
fn zero_repetitions_leaves_counter_untouched() {
    let mut engine = PulseEngine::new();
    let mut bridge = SimBridge::new();
    engine.add_pulse(10.0e-6).unwrap();
    engine.run(&mut bridge, 0);
    assert_eq!(engine.completed_trains(), 0);
    assert!(!engine.is_running());
}
