//! Runtime configuration shared between the acquisition thread, the command
//! dispatcher and any reader of the stores.
//!
//! [`Configuration`] is an immutable snapshot. [`SharedState`] publishes snapshots
//! read-copy-update style: readers clone the current `Arc` (never blocked by a
//! writer for longer than a pointer swap), writers clone the snapshot, mutate the
//! copy and publish it. All writers, including auto-zero on the acquisition thread,
//! go through [`SharedState::update`], so no read-modify-write is ever lost.
//!
//! Edge-triggered requests (auto-zero, store clear) are [`OneShot`] flags that are
//! raised by one thread and consumed exactly once by another.

use crate::config::{InstrumentDefaults, Settings};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Excitation output settings for one generator channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Excitation {
    /// Frequency in Hz
    pub frequency: f64,
    /// Amplitude in volts
    pub amplitude: f64,
    /// Phase in degrees
    pub phase: f64,
}

/// Baseline subtracted from a channel's demodulated output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Offset {
    /// In-phase offset in volts
    pub x: f64,
    /// Quadrature offset in volts
    pub y: f64,
}

/// One immutable snapshot of the instrument configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Generator settings for channels 1 and 2. Channel 1's frequency is the reference.
    pub waveforms: [Excitation; 2],
    /// Subtract `offsets` from the demodulated output
    pub offset_enabled: bool,
    /// Per-channel baseline
    pub offsets: [Offset; 2],
    /// Per-channel phase rotation in degrees
    pub rotation_deg: [f64; 2],
    /// Demodulate and display the second input channel
    pub chan2_enabled: bool,
    /// Show the ACFM overlay in the rendering layer
    pub acfm_display: bool,
    /// High-pass cutoff on the demodulated stream in Hz, 0 disables
    pub hpf_cutoff: f64,
    /// XY plot bound in volts
    pub xy_limit: f64,
    /// Raw plot bound in volts
    pub raw_limit: f64,
}

impl Configuration {
    /// Power-on configuration derived from the settings file.
    pub fn from_defaults(defaults: &InstrumentDefaults, channel_count: usize) -> Self {
        let excitation = Excitation {
            frequency: defaults.frequency,
            amplitude: defaults.amplitude,
            phase: defaults.phase,
        };
        Self {
            waveforms: [excitation; 2],
            offset_enabled: true,
            offsets: [Offset::default(); 2],
            rotation_deg: [0.0; 2],
            chan2_enabled: channel_count > 1,
            acfm_display: false,
            hpf_cutoff: defaults.hpf_cutoff,
            xy_limit: defaults.xy_limit,
            raw_limit: defaults.raw_limit,
        }
    }

    /// Frequency the reference tables are built for.
    pub fn reference_frequency(&self) -> f64 {
        self.waveforms[0].frequency
    }

    /// Number of channels the demodulator should emit.
    pub fn active_channels(&self) -> usize {
        if self.chan2_enabled {
            2
        } else {
            1
        }
    }
}

/// Edge-triggered flag consumed exactly once.
#[derive(Debug, Default)]
pub struct OneShot(AtomicBool);

impl OneShot {
    /// Create a lowered flag.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Request the action. Raising an already raised flag is a no-op.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the request. Returns `true` to exactly one caller per raise.
    pub fn take(&self) -> bool {
        self.0
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether a request is pending.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Most recent raw buffer, kept for the `data:raw*` commands.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    /// Clock time of the fetch in seconds
    pub t: f64,
    /// Seconds between samples
    pub sample_interval: f64,
    /// One sample vector per input channel
    pub channels: Vec<Vec<f64>>,
}

impl RawFrame {
    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Whether no frame has been captured yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State shared by every thread of the instrument.
#[derive(Debug)]
pub struct SharedState {
    settings: Settings,
    config: RwLock<Arc<Configuration>>,
    raw: Mutex<Arc<RawFrame>>,
    last_fault: Mutex<Option<String>>,
    /// Capture the next demodulated point as the offset
    pub auto_zero: OneShot,
    /// Reset both stores before the next append
    pub clear_stores: OneShot,
    measuring: AtomicBool,
    trigger: AtomicBool,
    status: AtomicBool,
}

impl SharedState {
    /// Build the shared state with power-on defaults.
    pub fn new(settings: Settings) -> Self {
        let config = Configuration::from_defaults(
            &settings.instrument,
            settings.acquisition.channel_count,
        );
        Self {
            settings,
            config: RwLock::new(Arc::new(config)),
            raw: Mutex::new(Arc::new(RawFrame::default())),
            last_fault: Mutex::new(None),
            auto_zero: OneShot::new(),
            clear_stores: OneShot::new(),
            measuring: AtomicBool::new(true),
            trigger: AtomicBool::new(false),
            status: AtomicBool::new(false),
        }
    }

    /// Startup settings this state was created from.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Latest published configuration.
    pub fn snapshot(&self) -> Arc<Configuration> {
        Arc::clone(&*self.config.read())
    }

    /// Apply `f` to a copy of the current configuration and publish the result.
    ///
    /// Returns whatever `f` returns. Concurrent updates are serialised.
    pub fn update<R>(&self, f: impl FnOnce(&mut Configuration) -> R) -> R {
        let mut guard = self.config.write();
        let mut next = Configuration::clone(&**guard);
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }

    /// Restore the power-on configuration.
    pub fn reset(&self) {
        let defaults = Configuration::from_defaults(
            &self.settings.instrument,
            self.settings.acquisition.channel_count,
        );
        *self.config.write() = Arc::new(defaults);
    }

    /// Publish the raw buffer of the current tick.
    pub fn publish_raw(&self, frame: RawFrame) {
        *self.raw.lock() = Arc::new(frame);
    }

    /// Raw buffer of the most recent tick.
    pub fn raw_frame(&self) -> Arc<RawFrame> {
        Arc::clone(&*self.raw.lock())
    }

    /// Whether demodulated points are appended to the stores.
    pub fn is_measuring(&self) -> bool {
        self.measuring.load(Ordering::Acquire)
    }

    /// Pause (`false`) or resume (`true`) store appends.
    pub fn set_measuring(&self, on: bool) {
        self.measuring.store(on, Ordering::Release);
    }

    /// Acquisition requested by the controlling thread.
    pub fn trigger(&self) -> bool {
        self.trigger.load(Ordering::Acquire)
    }

    /// Request acquisition to run or stop.
    pub fn set_trigger(&self, on: bool) {
        self.trigger.store(on, Ordering::Release);
    }

    /// Acquisition state reported by the acquisition thread.
    pub fn status(&self) -> bool {
        self.status.load(Ordering::Acquire)
    }

    /// Report the acquisition thread's state. Only the acquisition thread calls this.
    pub fn set_status(&self, on: bool) {
        self.status.store(on, Ordering::Release);
    }

    /// Remember a hardware fault for later reporting.
    pub fn record_fault(&self, message: String) {
        *self.last_fault.lock() = Some(message);
    }

    /// Most recent hardware fault, if any.
    pub fn last_fault(&self) -> Option<String> {
        self.last_fault.lock().clone()
    }
}
