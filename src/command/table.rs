//! Declarative command table.
//!
//! Every accepted path maps to a tagged [`Command`] plus the argument shapes it
//! takes as a query and as a set. The table is built once on first use.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Generator property addressed by `wN:<property>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveProperty {
    /// Frequency in Hz
    Frequency,
    /// Amplitude in volts
    Amplitude,
    /// Phase in degrees
    Phase,
}

/// Plot bound addressed by `display:<plot>:limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plot {
    /// XY plot
    Xy,
    /// Raw signal plot
    Raw,
}

/// Display toggle addressed by `<name>:disp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Second input channel
    Channel2,
    /// ACFM overlay
    Acfm,
}

/// Offset component addressed by `calcN:offset:<axis>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// In-phase
    X,
    /// Quadrature
    Y,
}

/// Handler selected by a command path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Restore the power-on configuration
    Reset,
    /// Device identity
    Identify,
    /// Report and clear the last failed line
    LastError,
    /// Stop store appends
    Pause,
    /// Resume store appends
    Run,
    /// Archive the raw buffer
    RawSave,
    /// Raw buffer length
    RawSize,
    /// Dump the raw buffer
    RawDump,
    /// Dump history rows
    History,
    /// Archive history rows
    HistorySave,
    /// Most recent XY point
    XyLatest,
    /// Clear both stores
    ClearStores,
    /// Plot bound
    DisplayLimit(Plot),
    /// Display toggle
    Display(Toggle),
    /// Generator property of channel 0 or 1
    Waveform {
        /// Generator channel, 0-based
        channel: usize,
        /// Addressed property
        property: WaveProperty,
    },
    /// Enable offset subtraction
    OffsetState,
    /// One-shot auto-zero
    OffsetAuto,
    /// Stored offset of one channel
    OffsetValue {
        /// Input channel, 0-based
        channel: usize,
        /// Component
        axis: Axis,
    },
    /// Phase rotation of one channel
    Rotation {
        /// Input channel, 0-based
        channel: usize,
    },
    /// High-pass cutoff
    HighPass,
    /// Start acquisition
    AcquisitionStart,
    /// Stop acquisition
    AcquisitionStop,
    /// Acquisition state
    AcquisitionState,
    /// Command summary
    Help,
    /// Leave the dispatcher loop
    Exit,
}

/// Accepted query shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryForm {
    /// Not queryable
    Never,
    /// `path?`
    Bare,
    /// `path? [seconds]`
    OptionalSpan,
    /// `path?`, `path min?`, `path max?`
    Limits,
}

/// Accepted set shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetForm {
    /// Not settable
    Never,
    /// No argument
    Bare,
    /// One number
    Number,
    /// `on|off|1|0`
    Switch,
    /// Exactly this word
    Word(&'static str),
    /// Optional file name
    OptionalFile,
}

/// One table entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    /// Handler tag
    pub command: Command,
    /// Query shape
    pub query: QueryForm,
    /// Set shape
    pub set: SetForm,
}

/// Path to entry map plus the help text.
#[derive(Debug)]
pub struct CommandTable {
    entries: HashMap<String, Entry>,
    help: Vec<(String, &'static str)>,
}

impl CommandTable {
    /// Look up a colon-joined path.
    pub fn lookup(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Number of accepted paths, aliases included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(pattern, description)` lines for `help?`.
    pub fn help(&self) -> &[(String, &'static str)] {
        &self.help
    }

    fn add(
        &mut self,
        paths: &[&str],
        command: Command,
        query: QueryForm,
        set: SetForm,
        help: &'static str,
    ) {
        for path in paths {
            self.entries
                .insert((*path).to_string(), Entry { command, query, set });
        }
        self.help.push((paths.join(" | "), help));
    }

    fn build() -> Self {
        use QueryForm as Q;
        use SetForm as S;

        let mut table = Self {
            entries: HashMap::new(),
            help: Vec::new(),
        };

        table.add(&["reset", "*rst"], Command::Reset, Q::Never, S::Bare, "restore power-on configuration");
        table.add(&["*idn"], Command::Identify, Q::Bare, S::Never, "connected device identity");
        table.add(&["error"], Command::LastError, Q::Bare, S::Never, "print and clear the last failed line");
        table.add(&["pause"], Command::Pause, Q::Never, S::Bare, "stop appending to the stores");
        table.add(&["run"], Command::Run, Q::Never, S::Bare, "resume appending to the stores");

        table.add(&["data:raw:save"], Command::RawSave, Q::Never, S::OptionalFile, "save raw buffer as CSV [file]");
        table.add(&["data:raw:size"], Command::RawSize, Q::Bare, S::Never, "raw buffer length");
        table.add(&["data:raw"], Command::RawDump, Q::Bare, S::Never, "time,ch1[,ch2] per raw sample");
        table.add(&["data:txy"], Command::History, Q::OptionalSpan, S::Never, "count, then t,x1,y1[,x2,y2] rows [seconds]");
        table.add(&["data:txy:save"], Command::HistorySave, Q::Never, S::OptionalFile, "save history as CSV [file]");
        table.add(&["data:xy"], Command::XyLatest, Q::Bare, S::Never, "latest x1,y1[,x2,y2]");
        table.add(&["data:clear"], Command::ClearStores, Q::Never, S::Bare, "clear history and XY trace");

        table.add(&["display:xy:limit"], Command::DisplayLimit(Plot::Xy), Q::Bare, S::Number, "XY plot bound in V");
        table.add(&["display:raw:limit"], Command::DisplayLimit(Plot::Raw), Q::Bare, S::Number, "raw plot bound in V");
        table.add(&["chan2:disp"], Command::Display(Toggle::Channel2), Q::Bare, S::Switch, "second channel on|off");
        table.add(&["acfm:disp"], Command::Display(Toggle::Acfm), Q::Bare, S::Switch, "ACFM overlay on|off");

        for channel in 0..2 {
            let n = channel + 1;
            for (name, property, help) in [
                ("freq", WaveProperty::Frequency, "generator frequency in Hz"),
                ("volt", WaveProperty::Amplitude, "generator amplitude in V"),
                ("phase", WaveProperty::Phase, "generator phase in degrees"),
            ] {
                let path = format!("w{n}:{name}");
                table.add(&[path.as_str()], Command::Waveform { channel, property }, Q::Limits, S::Number, help);
            }

            let path = format!("calc{n}:offset:phase");
            table.add(&[path.as_str()], Command::Rotation { channel }, Q::Bare, S::Number, "phase rotation in degrees");
            for (name, axis) in [("x", Axis::X), ("y", Axis::Y)] {
                let path = format!("calc{n}:offset:{name}");
                table.add(&[path.as_str()], Command::OffsetValue { channel, axis }, Q::Bare, S::Never, "stored offset in V");
            }
        }

        table.add(&["calc:offset:state"], Command::OffsetState, Q::Bare, S::Switch, "offset subtraction on|off");
        table.add(&["calc:offset:auto"], Command::OffsetAuto, Q::Never, S::Word("once"), "capture offsets on the next tick");
        table.add(&["calc:hpf:freq"], Command::HighPass, Q::Bare, S::Number, "high-pass cutoff in Hz, 0 disables");

        table.add(&["acq:start"], Command::AcquisitionStart, Q::Never, S::Bare, "start acquisition");
        table.add(&["acq:stop"], Command::AcquisitionStop, Q::Never, S::Bare, "stop acquisition");
        table.add(&["acq:state"], Command::AcquisitionState, Q::Bare, S::Never, "running or stopped");

        table.add(&["help", ""], Command::Help, Q::Bare, S::Never, "this summary");
        table.add(&["end", "exit", "quit", "close"], Command::Exit, Q::Never, S::Bare, "close the control channel");

        table
    }
}

/// The command table, built on first use.
pub static COMMANDS: Lazy<CommandTable> = Lazy::new(CommandTable::build);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_share_a_handler() {
        assert_eq!(COMMANDS.lookup("reset").map(|e| e.command), Some(Command::Reset));
        assert_eq!(COMMANDS.lookup("*rst").map(|e| e.command), Some(Command::Reset));
        for word in ["end", "exit", "quit", "close"] {
            assert_eq!(COMMANDS.lookup(word).map(|e| e.command), Some(Command::Exit));
        }
        assert_eq!(COMMANDS.lookup("").map(|e| e.command), Some(Command::Help));
    }

    #[test]
    fn test_waveform_family_is_parameterised_by_channel() {
        let entry = COMMANDS.lookup("w2:volt").unwrap();
        assert_eq!(
            entry.command,
            Command::Waveform {
                channel: 1,
                property: WaveProperty::Amplitude
            }
        );
        assert_eq!(entry.query, QueryForm::Limits);
        assert_eq!(entry.set, SetForm::Number);
        assert!(COMMANDS.lookup("w3:freq").is_none());
    }

    #[test]
    fn test_help_covers_every_entry() {
        let mentioned: usize = COMMANDS
            .help()
            .iter()
            .map(|(pattern, _)| pattern.split(" | ").count())
            .sum();
        assert_eq!(mentioned, COMMANDS.len());
    }
}
