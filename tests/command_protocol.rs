//! Protocol-level tests of the dispatcher loop without acquisition running.

use rust_lockin::command::Dispatcher;
use rust_lockin::config::Settings;
use rust_lockin::data::Stores;
use rust_lockin::hardware::{MockDaq, WaveformOutput};
use rust_lockin::state::SharedState;
use std::sync::Arc;

fn session(script: &str) -> (String, Arc<SharedState>, Arc<MockDaq>) {
    let settings = Settings::default();
    let state = Arc::new(SharedState::new(settings.clone()));
    let stores = Arc::new(Stores::from_settings(&settings));
    let daq = Arc::new(MockDaq::new());
    let mut dispatcher = Dispatcher::new(Arc::clone(&state), stores)
        .with_output(Arc::clone(&daq) as Arc<dyn WaveformOutput>);

    let mut output = Vec::new();
    dispatcher.run(script.as_bytes(), &mut output).unwrap();
    (String::from_utf8(output).unwrap(), state, daq)
}

#[test]
fn test_frequency_round_trip_and_rejection() {
    let (output, state, _) = session("w1:freq 1000\nw1:freq?\nw1:freq 1e9\nw1:freq?\nerror?\nerror?\n");
    assert_eq!(output, "1000\n1000\nw1:freq 1e9\nNo error.\n");
    assert_eq!(state.snapshot().reference_frequency(), 1000.0);
}

#[test]
fn test_commands_are_case_insensitive() {
    let (output, state, daq) = session("W2:FREQ 440\nw2:Freq?\nCALC:HPF:FREQ 2.5\n");
    assert_eq!(output, "440\n");
    assert_eq!(state.snapshot().waveforms[1].frequency, 440.0);
    assert_eq!(state.snapshot().hpf_cutoff, 2.5);
    assert_eq!(daq.excitation()[1].frequency, 440.0);
}

#[test]
fn test_only_the_last_failure_is_kept() {
    let (output, _, _) = session("w1:volt 9\nw2:volt -1\nerror?\n");
    assert_eq!(output, "w2:volt -1\n");
}

#[test]
fn test_unknown_query_echoes_original_line() {
    let (output, _, _) = session("Data:Nothing?\n");
    assert_eq!(output, "Error: 'Data:Nothing?'\n");
}

#[test]
fn test_exit_keywords_stop_the_loop() {
    for keyword in ["end", "exit", "quit", "close"] {
        let script = format!("w1:volt 2\n{keyword}\nw1:volt 3\n");
        let (_, state, _) = session(&script);
        assert_eq!(state.snapshot().waveforms[0].amplitude, 2.0, "{keyword}");
    }
}

#[test]
fn test_reset_restores_defaults() {
    let (output, state, _) = session("w1:phase 90\ncalc1:offset:phase 45\nchan2:disp off\nreset\nw1:phase?\nchan2:disp?\n");
    assert_eq!(output, "0\non\n");
    assert_eq!(state.snapshot().rotation_deg, [0.0, 0.0]);
}

#[test]
fn test_identity_reports_generator() {
    let (output, _, _) = session("*idn?\n");
    assert_eq!(output, "rust-lockin,MockAwg,0,0.1\n");
}
