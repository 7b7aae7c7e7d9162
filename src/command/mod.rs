//! Text command dispatcher.
//!
//! Reads one command per line, routes it through [`table::COMMANDS`] and
//! answers queries on the output stream. Failures follow the protocol rules:
//!
//! - a failing query prints `Error: '<line>'`
//! - a failing set or action stays silent and is reported by `error?`
//!
//! Generator changes are collected while a line is handled and pushed to the
//! [`WaveformOutput`] in one call afterwards.

pub mod parser;
pub mod table;

use crate::acquisition::AcquisitionEngine;
use crate::data::{storage, Stores};
use crate::error::{AppResult, LockinError};
use crate::hardware::{AnalogInput, WaveformOutput};
use crate::state::{Configuration, SharedState};
use crate::validation::{is_in_range, is_positive_up_to, parse_switch};
use parser::{Argument, ParsedLine};
use std::io::{BufRead, Write};
use std::sync::Arc;
use table::{Axis, Command, Entry, Plot, QueryForm, SetForm, Toggle, WaveProperty, COMMANDS};
use tracing::{debug, info, warn};

/// Amplitude range of the generator in volts.
pub const AMPLITUDE_LIMITS: (f64, f64) = (0.0, 5.0);

/// High-pass cutoff range in Hz.
pub const HPF_LIMITS: (f64, f64) = (0.0, 50.0);

/// Upper bound of the plot limits in volts.
pub const DISPLAY_LIMIT_MAX: f64 = 100.0;

/// What the caller should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading
    Continue,
    /// An exit keyword was received
    Exit,
}

/// Validated request passed to a handler.
#[derive(Debug, Clone, PartialEq)]
enum Request {
    Query,
    QuerySpan(Option<f64>),
    QueryMin,
    QueryMax,
    Action,
    Number(f64),
    Switch(bool),
    File(Option<String>),
}

/// Per-connection command dispatcher.
pub struct Dispatcher {
    state: Arc<SharedState>,
    stores: Arc<Stores>,
    input: Option<Arc<dyn AnalogInput>>,
    output: Option<Arc<dyn WaveformOutput>>,
    engine: Option<Arc<AcquisitionEngine>>,
    last_error: Option<String>,
    generator_dirty: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("input", &self.input.as_ref().map(|i| i.identity()))
            .field("output", &self.output.as_ref().map(|o| o.identity()))
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher over the shared state and stores, with no hardware attached.
    pub fn new(state: Arc<SharedState>, stores: Arc<Stores>) -> Self {
        Self {
            state,
            stores,
            input: None,
            output: None,
            engine: None,
            last_error: None,
            generator_dirty: false,
        }
    }

    /// Attach the analog input reported by `*idn?`.
    pub fn with_input(mut self, input: Arc<dyn AnalogInput>) -> Self {
        self.input = Some(input);
        self
    }

    /// Attach the generator that receives excitation changes.
    pub fn with_output(mut self, output: Arc<dyn WaveformOutput>) -> Self {
        self.output = Some(output);
        self
    }

    /// Attach the acquisition engine for `acq:*`.
    pub fn with_engine(mut self, engine: Arc<AcquisitionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Last failed non-query line, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Read lines until end of input or an exit keyword.
    pub fn run<R: BufRead, W: Write>(&mut self, reader: R, mut writer: W) -> AppResult<()> {
        for line in reader.lines() {
            let flow = self.execute(&line?, &mut writer)?;
            writer.flush()?;
            if flow == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Handle one line, writing any reply to `out`.
    ///
    /// Only I/O errors on `out` are returned; command failures are reported
    /// through the protocol.
    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> AppResult<Flow> {
        let Some(parsed) = ParsedLine::parse(line) else {
            return Ok(Flow::Continue);
        };

        let mut reply = Vec::new();
        let outcome = self.handle(&parsed, &mut reply);
        let outcome = outcome.and_then(|flow| self.flush_generator().map(|()| flow));

        match outcome {
            Ok(flow) => {
                out.write_all(&reply)?;
                Ok(flow)
            }
            Err(e) => {
                debug!(line = %parsed.original, error = %e, "Command failed");
                if parsed.is_query() {
                    writeln!(out, "Error: '{}'", parsed.original)?;
                } else {
                    self.last_error = Some(parsed.original);
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn handle(&mut self, line: &ParsedLine, out: &mut Vec<u8>) -> AppResult<Flow> {
        let entry = *COMMANDS
            .lookup(&line.key())
            .ok_or_else(|| rejected(format!("unknown command '{}'", line.key())))?;
        let request = validate(&entry, line)?;
        if entry.command == Command::Exit {
            return Ok(Flow::Exit);
        }
        self.apply(entry.command, request, out)?;
        Ok(Flow::Continue)
    }

    fn apply(&mut self, command: Command, request: Request, out: &mut Vec<u8>) -> AppResult<()> {
        let state = Arc::clone(&self.state);
        match (command, request) {
            (Command::Reset, _) => {
                state.reset();
                state.set_measuring(true);
                self.generator_dirty = true;
                info!("Configuration reset to defaults");
            }
            (Command::Identify, _) => {
                let identity = match (&self.input, &self.output) {
                    (None, None) => return Err(LockinError::NotConnected),
                    (Some(i), None) => i.identity(),
                    (None, Some(o)) => o.identity(),
                    (Some(i), Some(o)) if i.identity() == o.identity() => i.identity(),
                    (Some(i), Some(o)) => format!("{}; {}", i.identity(), o.identity()),
                };
                writeln!(out, "{identity}")?;
            }
            (Command::LastError, _) => match self.last_error.take() {
                Some(line) => writeln!(out, "{line}")?,
                None => writeln!(out, "No error.")?,
            },
            (Command::Pause, _) => state.set_measuring(false),
            (Command::Run, _) => state.set_measuring(true),

            (Command::RawSave, Request::File(file)) => {
                let frame = state.raw_frame();
                if frame.is_empty() {
                    return Err(LockinError::Storage("no raw buffer captured yet".into()));
                }
                let path = storage::resolve_path(&state.settings().storage, file.as_deref(), "raw")?;
                storage::save_raw(&path, &frame, state.snapshot().active_channels())?;
            }
            (Command::RawSize, _) => writeln!(out, "{}", state.raw_frame().len())?,
            (Command::RawDump, _) => {
                let frame = state.raw_frame();
                let channels = state.snapshot().active_channels().min(frame.channels.len());
                for i in 0..frame.len() {
                    let t = i as f64 * frame.sample_interval;
                    write!(out, "{t}")?;
                    for samples in &frame.channels[..channels] {
                        write!(out, ",{}", samples[i])?;
                    }
                    writeln!(out)?;
                }
            }
            (Command::History, Request::QuerySpan(seconds)) => {
                let rows = self.stores.history.snapshot_range(seconds);
                let channels = state.snapshot().active_channels();
                writeln!(out, "{}", rows.len())?;
                for p in &rows {
                    write!(out, "{},{},{}", p.t, p.x[0], p.y[0])?;
                    if channels > 1 {
                        write!(out, ",{},{}", p.x[1], p.y[1])?;
                    }
                    writeln!(out)?;
                }
            }
            (Command::HistorySave, Request::File(file)) => {
                let rows = self.stores.history.snapshot_range(None);
                let path = storage::resolve_path(&state.settings().storage, file.as_deref(), "txy")?;
                storage::save_history(&path, &rows, state.snapshot().active_channels())?;
            }
            (Command::XyLatest, _) => {
                let p = self
                    .stores
                    .xy
                    .latest()
                    .ok_or_else(|| LockinError::Processing("no XY data yet".into()))?;
                write!(out, "{},{}", p.x[0], p.y[0])?;
                if state.snapshot().active_channels() > 1 {
                    write!(out, ",{},{}", p.x[1], p.y[1])?;
                }
                writeln!(out)?;
            }
            (Command::ClearStores, _) => state.clear_stores.raise(),

            (Command::DisplayLimit(plot), Request::Query) => {
                let config = state.snapshot();
                let limit = match plot {
                    Plot::Xy => config.xy_limit,
                    Plot::Raw => config.raw_limit,
                };
                writeln!(out, "{limit}")?;
            }
            (Command::DisplayLimit(plot), Request::Number(value)) => {
                is_positive_up_to(value, DISPLAY_LIMIT_MAX).map_err(rejected)?;
                state.update(|c| match plot {
                    Plot::Xy => c.xy_limit = value,
                    Plot::Raw => c.raw_limit = value,
                });
            }

            (Command::Display(toggle), Request::Query) => {
                let config = state.snapshot();
                let on = match toggle {
                    Toggle::Channel2 => config.chan2_enabled,
                    Toggle::Acfm => config.acfm_display,
                };
                writeln!(out, "{}", switch_word(on))?;
            }
            (Command::Display(Toggle::Channel2), Request::Switch(on)) => {
                if on && state.settings().acquisition.channel_count < 2 {
                    return Err(rejected("only one input channel is acquired"));
                }
                state.update(|c| c.chan2_enabled = on);
            }
            (Command::Display(Toggle::Acfm), Request::Switch(on)) => {
                state.update(|c| c.acfm_display = on);
            }

            (Command::Waveform { channel, property }, request) => {
                self.waveform(channel, property, request, out)?;
            }

            (Command::OffsetState, Request::Query) => {
                writeln!(out, "{}", switch_word(state.snapshot().offset_enabled))?;
            }
            (Command::OffsetState, Request::Switch(on)) => {
                state.update(|c| c.offset_enabled = on);
            }
            (Command::OffsetAuto, _) => {
                state.auto_zero.raise();
                debug!("Auto-zero requested");
            }
            (Command::OffsetValue { channel, axis }, _) => {
                let offset = state.snapshot().offsets[channel];
                let value = match axis {
                    Axis::X => offset.x,
                    Axis::Y => offset.y,
                };
                writeln!(out, "{value}")?;
            }
            (Command::Rotation { channel }, Request::Query) => {
                writeln!(out, "{}", state.snapshot().rotation_deg[channel])?;
            }
            (Command::Rotation { channel }, Request::Number(degrees)) => {
                if !degrees.is_finite() {
                    return Err(rejected("rotation must be finite"));
                }
                state.update(|c| c.rotation_deg[channel] = degrees);
            }
            (Command::HighPass, Request::Query) => {
                writeln!(out, "{}", state.snapshot().hpf_cutoff)?;
            }
            (Command::HighPass, Request::Number(cutoff)) => {
                is_in_range(cutoff, HPF_LIMITS.0..=HPF_LIMITS.1).map_err(rejected)?;
                state.update(|c| c.hpf_cutoff = cutoff);
            }

            (Command::AcquisitionStart, _) => self.engine()?.start()?,
            (Command::AcquisitionStop, _) => self.engine()?.stop()?,
            (Command::AcquisitionState, _) => {
                let running = self.engine()?.is_running();
                writeln!(out, "{}", if running { "running" } else { "stopped" })?;
            }

            (Command::Help, _) => {
                for (pattern, description) in COMMANDS.help() {
                    writeln!(out, "{pattern:<40} {description}")?;
                }
            }

            (command, request) => {
                return Err(rejected(format!("{command:?} does not accept {request:?}")));
            }
        }
        Ok(())
    }

    fn waveform(
        &mut self,
        channel: usize,
        property: WaveProperty,
        request: Request,
        out: &mut Vec<u8>,
    ) -> AppResult<()> {
        let limits = self.waveform_limits(property);
        match request {
            Request::Query => {
                let excitation = self.state.snapshot().waveforms[channel];
                let value = match property {
                    WaveProperty::Frequency => excitation.frequency,
                    WaveProperty::Amplitude => excitation.amplitude,
                    WaveProperty::Phase => excitation.phase,
                };
                writeln!(out, "{value}")?;
            }
            Request::QueryMin | Request::QueryMax => {
                let (min, max) = limits.ok_or_else(|| rejected("phase is unrestricted"))?;
                let value = if request == Request::QueryMin { min } else { max };
                writeln!(out, "{value}")?;
            }
            Request::Number(value) => {
                if !value.is_finite() {
                    return Err(rejected("value must be finite"));
                }
                if let Some((min, max)) = limits {
                    is_in_range(value, min..=max).map_err(rejected)?;
                }
                let changed = self.state.update(|c: &mut Configuration| {
                    let excitation = &mut c.waveforms[channel];
                    let field = match property {
                        WaveProperty::Frequency => &mut excitation.frequency,
                        WaveProperty::Amplitude => &mut excitation.amplitude,
                        WaveProperty::Phase => &mut excitation.phase,
                    };
                    #[allow(clippy::float_cmp)]
                    let changed = *field != value;
                    *field = value;
                    changed
                });
                self.generator_dirty |= changed;
            }
            other => return Err(rejected(format!("waveform does not accept {other:?}"))),
        }
        Ok(())
    }

    fn waveform_limits(&self, property: WaveProperty) -> Option<(f64, f64)> {
        match property {
            WaveProperty::Frequency => Some(self.state.settings().frequency_limits()),
            WaveProperty::Amplitude => Some(AMPLITUDE_LIMITS),
            WaveProperty::Phase => None,
        }
    }

    fn engine(&self) -> AppResult<&AcquisitionEngine> {
        self.engine.as_deref().ok_or(LockinError::NotConnected)
    }

    /// Push pending excitation changes to the generator in one call.
    fn flush_generator(&mut self) -> AppResult<()> {
        if !std::mem::take(&mut self.generator_dirty) {
            return Ok(());
        }
        let Some(output) = &self.output else {
            return Ok(());
        };
        let waveforms = self.state.snapshot().waveforms;
        output.apply(&waveforms).map_err(|e| {
            warn!(error = %e, "Generator update failed");
            self.state.record_fault(e.to_string());
            e
        })
    }
}

fn rejected(reason: impl Into<String>) -> LockinError {
    LockinError::CommandRejected(reason.into())
}

fn switch_word(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// Check the line's shape against the table entry.
fn validate(entry: &Entry, line: &ParsedLine) -> AppResult<Request> {
    let argument = line.argument.as_ref();
    if line.is_query() {
        return match (entry.query, argument) {
            (QueryForm::Bare, None) => Ok(Request::Query),
            (QueryForm::Limits, None) if line.query => Ok(Request::Query),
            (QueryForm::Limits, Some(arg)) => match arg.word().as_deref() {
                Some("min?") => Ok(Request::QueryMin),
                Some("max?") => Ok(Request::QueryMax),
                _ => Err(rejected("expected min? or max?")),
            },
            (QueryForm::OptionalSpan, None) => Ok(Request::QuerySpan(None)),
            (QueryForm::OptionalSpan, Some(Argument::Number(s))) if *s >= 0.0 => {
                Ok(Request::QuerySpan(Some(*s)))
            }
            _ => Err(rejected("malformed query")),
        };
    }

    match (entry.set, argument) {
        (SetForm::Bare, None) => Ok(Request::Action),
        (SetForm::Number, Some(Argument::Number(value))) => Ok(Request::Number(*value)),
        (SetForm::Switch, Some(Argument::Number(value))) => {
            parse_switch(&value.to_string()).map(Request::Switch).map_err(rejected)
        }
        (SetForm::Switch, Some(arg @ Argument::Text(_))) => arg
            .word()
            .as_deref()
            .map_or(Err("Expected 'on' or 'off'"), parse_switch)
            .map(Request::Switch)
            .map_err(rejected),
        (SetForm::Word(word), Some(arg)) if arg.word().as_deref() == Some(word) => {
            Ok(Request::Action)
        }
        (SetForm::OptionalFile, None) => Ok(Request::File(None)),
        (SetForm::OptionalFile, Some(Argument::Text(file))) => Ok(Request::File(Some(file.clone()))),
        (SetForm::OptionalFile, Some(Argument::Number(n))) => Ok(Request::File(Some(n.to_string()))),
        _ => Err(rejected("malformed command")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::hardware::MockDaq;
    use crate::psd::{DemodulatedPoint, Tick};
    use crate::state::RawFrame;

    struct Fixture {
        dispatcher: Dispatcher,
        state: Arc<SharedState>,
        stores: Arc<Stores>,
        daq: Arc<MockDaq>,
    }

    fn fixture() -> Fixture {
        let settings = Settings::default();
        let state = Arc::new(SharedState::new(settings.clone()));
        let stores = Arc::new(Stores::from_settings(&settings));
        let daq = Arc::new(MockDaq::new());
        let dispatcher = Dispatcher::new(Arc::clone(&state), Arc::clone(&stores))
            .with_input(Arc::clone(&daq) as Arc<dyn AnalogInput>)
            .with_output(Arc::clone(&daq) as Arc<dyn WaveformOutput>);
        Fixture {
            dispatcher,
            state,
            stores,
            daq,
        }
    }

    fn send(dispatcher: &mut Dispatcher, line: &str) -> String {
        let mut out = Vec::new();
        dispatcher.execute(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn frequency_set_then_query() {
        let mut f = fixture();
        assert_eq!(send(&mut f.dispatcher, "w1:freq 2000"), "");
        assert_eq!(send(&mut f.dispatcher, "w1:freq?"), "2000\n");
        assert_eq!(f.state.snapshot().reference_frequency(), 2000.0);
        assert_eq!(f.daq.excitation()[0].frequency, 2000.0);
    }

    #[test]
    fn out_of_range_set_is_recorded_for_error_query() {
        let mut f = fixture();
        send(&mut f.dispatcher, "w1:freq 1000");
        assert_eq!(send(&mut f.dispatcher, "w1:freq 1e9"), "");
        assert_eq!(send(&mut f.dispatcher, "w1:freq?"), "1000\n");
        assert_eq!(send(&mut f.dispatcher, "error?"), "w1:freq 1e9\n");
        assert_eq!(send(&mut f.dispatcher, "error?"), "No error.\n");
    }

    #[test]
    fn failing_query_echoes_line() {
        let mut f = fixture();
        assert_eq!(send(&mut f.dispatcher, "bogus:thing?"), "Error: 'bogus:thing?'\n");
        assert_eq!(send(&mut f.dispatcher, "data:xy?"), "Error: 'data:xy?'\n");
        assert_eq!(send(&mut f.dispatcher, "error?"), "No error.\n");
    }

    #[test]
    fn unknown_action_is_silent() {
        let mut f = fixture();
        assert_eq!(send(&mut f.dispatcher, "Frobnicate 3"), "");
        assert_eq!(f.dispatcher.last_error(), Some("Frobnicate 3"));
    }

    #[test]
    fn limits_are_queryable() {
        let mut f = fixture();
        assert_eq!(send(&mut f.dispatcher, "w1:freq min?"), "100\n");
        assert_eq!(send(&mut f.dispatcher, "w2:freq max?"), "25000\n");
        assert_eq!(send(&mut f.dispatcher, "w1:volt max?"), "5\n");
        assert_eq!(send(&mut f.dispatcher, "w1:phase min?"), "Error: 'w1:phase min?'\n");
    }

    #[test]
    fn generator_receives_both_channels_in_one_call() {
        let mut f = fixture();
        send(&mut f.dispatcher, "w2:volt 0.25");
        send(&mut f.dispatcher, "w2:phase -45");
        let applied = f.daq.excitation();
        assert_eq!(applied[1].amplitude, 0.25);
        assert_eq!(applied[1].phase, -45.0);
        assert_eq!(applied[0].amplitude, 1.0);
    }

    #[test]
    fn generator_failure_is_reported_by_error_query() {
        let mut f = fixture();
        f.daq.fail_next_apply();
        send(&mut f.dispatcher, "w1:volt 2");
        assert_eq!(send(&mut f.dispatcher, "error?"), "w1:volt 2\n");
        assert!(f.state.last_fault().is_some());
    }

    #[test]
    fn switches_and_display_limits() {
        let mut f = fixture();
        send(&mut f.dispatcher, "chan2:disp off");
        assert_eq!(send(&mut f.dispatcher, "chan2:disp?"), "off\n");
        send(&mut f.dispatcher, "ACFM:DISP ON");
        assert!(f.state.snapshot().acfm_display);

        send(&mut f.dispatcher, "display:xy:limit 0.5");
        assert_eq!(send(&mut f.dispatcher, "display:xy:limit?"), "0.5\n");
        send(&mut f.dispatcher, "display:raw:limit 0");
        assert_eq!(f.dispatcher.last_error(), Some("display:raw:limit 0"));
        send(&mut f.dispatcher, "chan2:disp maybe");
        assert_eq!(f.dispatcher.last_error(), Some("chan2:disp maybe"));
    }

    #[test]
    fn offsets_rotation_and_high_pass() {
        let mut f = fixture();
        send(&mut f.dispatcher, "calc:offset:auto once");
        assert!(f.state.auto_zero.is_raised());
        send(&mut f.dispatcher, "calc:offset:auto twice");
        assert_eq!(f.dispatcher.last_error(), Some("calc:offset:auto twice"));

        send(&mut f.dispatcher, "calc:offset:state off");
        assert_eq!(send(&mut f.dispatcher, "calc:offset:state?"), "off\n");

        send(&mut f.dispatcher, "calc2:offset:phase 30");
        assert_eq!(f.state.snapshot().rotation_deg, [0.0, 30.0]);
        assert_eq!(send(&mut f.dispatcher, "calc1:offset:x?"), "0\n");

        send(&mut f.dispatcher, "calc:hpf:freq 10");
        assert_eq!(send(&mut f.dispatcher, "calc:hpf:freq?"), "10\n");
        send(&mut f.dispatcher, "calc:hpf:freq 51");
        assert_eq!(f.state.snapshot().hpf_cutoff, 10.0);
    }

    #[test]
    fn reset_restores_defaults_and_pushes_generator() {
        let mut f = fixture();
        send(&mut f.dispatcher, "w1:freq 3000");
        send(&mut f.dispatcher, "pause");
        assert!(!f.state.is_measuring());
        send(&mut f.dispatcher, "*rst");
        assert_eq!(f.state.snapshot().reference_frequency(), 1000.0);
        assert!(f.state.is_measuring());
        assert_eq!(f.daq.excitation()[0].frequency, 1000.0);
    }

    #[test]
    fn identity_without_hardware() {
        let settings = Settings::default();
        let state = Arc::new(SharedState::new(settings.clone()));
        let stores = Arc::new(Stores::from_settings(&settings));
        let mut dispatcher = Dispatcher::new(state, stores);
        assert_eq!(send(&mut dispatcher, "*idn?"), "Error: '*idn?'\n");
        assert_eq!(send(&mut dispatcher, "acq:state?"), "Error: 'acq:state?'\n");
    }

    #[test]
    fn identity_combines_input_and_output() {
        let mut f = fixture();
        assert_eq!(
            send(&mut f.dispatcher, "*idn?"),
            "rust-lockin,MockDaq,0,0.1; rust-lockin,MockAwg,0,0.1\n"
        );
    }

    #[test]
    fn raw_and_history_queries() {
        let mut f = fixture();
        f.state.publish_raw(RawFrame {
            t: 1.0,
            sample_interval: 0.5,
            channels: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        });
        assert_eq!(send(&mut f.dispatcher, "data:raw:size?"), "2\n");
        assert_eq!(send(&mut f.dispatcher, "data:raw?"), "0,1,3\n0.5,2,4\n");

        for i in 0..3 {
            let t = i as f64 * 0.01;
            f.stores.append(&Tick {
                t,
                dt: 0.01,
                points: vec![
                    DemodulatedPoint { t, x: 1.0, y: 2.0 },
                    DemodulatedPoint { t, x: 3.0, y: 4.0 },
                ],
            });
        }
        assert_eq!(send(&mut f.dispatcher, "data:xy?"), "1,2,3,4\n");
        let reply = send(&mut f.dispatcher, "data:txy? 0.02");
        assert_eq!(reply, "2\n0.01,1,2,3,4\n0.02,1,2,3,4\n");

        send(&mut f.dispatcher, "chan2:disp off");
        let reply = send(&mut f.dispatcher, "data:txy?");
        assert_eq!(reply.lines().next(), Some("3"));
        assert_eq!(reply.lines().nth(1), Some("0,1,2"));
    }

    #[test]
    fn history_span_returns_whole_ticks() {
        let mut f = fixture();
        for i in 0..50 {
            let t = i as f64 * 0.01;
            f.stores.append(&Tick {
                t,
                dt: 0.01,
                points: vec![DemodulatedPoint { t, x: 1.0, y: 0.0 }; 2],
            });
        }
        let reply = send(&mut f.dispatcher, "data:txy? 0.07");
        assert_eq!(reply.lines().next(), Some("7"));
        assert_eq!(reply.lines().count(), 8);
    }

    #[test]
    fn help_and_exit() {
        let mut f = fixture();
        let help = send(&mut f.dispatcher, "?");
        assert!(help.contains("w1:freq"));
        assert!(help.contains("data:txy"));

        let mut out = Vec::new();
        assert_eq!(f.dispatcher.execute("QUIT", &mut out).unwrap(), Flow::Exit);
        assert_eq!(f.dispatcher.execute("", &mut out).unwrap(), Flow::Continue);
    }

    #[test]
    fn run_stops_at_exit_keyword() {
        let mut f = fixture();
        let input = b"w1:volt 2\nw1:volt?\nexit\nw1:volt 3\n";
        let mut output = Vec::new();
        f.dispatcher.run(&input[..], &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "2\n");
        assert_eq!(f.state.snapshot().waveforms[0].amplitude, 2.0);
    }
}
