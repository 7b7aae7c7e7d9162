//! Synchronous demodulation of one raw buffer per tick.
//!
//! For every active channel:
//!
//! 1. correlate the raw buffer with the reference tables (`x_raw`, `y_raw`),
//! 2. on a pending auto-zero request, store `(x_raw, y_raw)` as the channel offset,
//! 3. subtract the offset (when offset subtraction is enabled),
//! 4. rotate by the channel's phase angle,
//! 5. optionally high-pass the resulting x/y stream at the tick rate.
//!
//! The reference table is rebuilt lazily whenever the configured reference
//! frequency differs from the one the table was built for.

use crate::data::iir_filter::{HighPass, IirFilterConfig};
use crate::error::{AppResult, LockinError};
use crate::psd::reference::ReferenceTable;
use crate::state::{Configuration, Offset, RawFrame, SharedState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One demodulated reading of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DemodulatedPoint {
    /// Clock time of the tick in seconds
    pub t: f64,
    /// In-phase component in volts
    pub x: f64,
    /// Quadrature component in volts
    pub y: f64,
}

impl DemodulatedPoint {
    /// Amplitude `sqrt(x² + y²)`.
    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Phase `atan2(y, x)` in degrees.
    pub fn phase_deg(&self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }
}

/// Output of one demodulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Clock time of the tick in seconds
    pub t: f64,
    /// Seconds since the previous tick (0 for the first)
    pub dt: f64,
    /// One point per active channel
    pub points: Vec<DemodulatedPoint>,
}

/// Rotate `(x, y)` by `theta` radians.
pub fn rotate(x: f64, y: f64, theta: f64) -> (f64, f64) {
    let (s, c) = theta.sin_cos();
    (x * c - y * s, x * s + y * c)
}

#[derive(Debug, Default)]
struct HighPassBank {
    cutoff: f64,
    /// `[channel][x, y]`, `None` when disabled or not realisable
    filters: Option<Vec<[HighPass; 2]>>,
}

impl HighPassBank {
    #[allow(clippy::float_cmp)]
    fn configure(&mut self, cutoff: f64, tick_rate: f64, channels: usize) {
        let unchanged = self.cutoff == cutoff
            && self.filters.as_ref().map_or(true, |f| f.len() == channels);
        if unchanged {
            return;
        }
        self.cutoff = cutoff;
        self.filters = None;
        if cutoff <= 0.0 {
            return;
        }

        let config = IirFilterConfig {
            f0: cutoff,
            fs: tick_rate,
            q: None,
        };
        let bank: Result<Vec<[HighPass; 2]>, &'static str> = (0..channels)
            .map(|_| Ok([HighPass::new(config)?, HighPass::new(config)?]))
            .collect();
        match bank {
            Ok(bank) => {
                debug!(cutoff, tick_rate, "High-pass filter rebuilt");
                self.filters = Some(bank);
            }
            Err(e) => warn!(cutoff, tick_rate, error = e, "High-pass disabled"),
        }
    }

    fn run(&mut self, channel: usize, x: f64, y: f64) -> (f64, f64) {
        match self.filters.as_mut().and_then(|f| f.get_mut(channel)) {
            Some([fx, fy]) => (fx.run(x), fy.run(y)),
            None => (x, y),
        }
    }
}

/// Phase-sensitive detector holding the reference table and filter state.
#[derive(Debug)]
pub struct Demodulator {
    sample_interval: f64,
    max_length: usize,
    tick_rate: f64,
    table: Option<ReferenceTable>,
    rebuilds: u64,
    hpf: HighPassBank,
    last_t: Option<f64>,
}

impl Demodulator {
    /// Create a demodulator for buffers of `max_length` samples spaced by
    /// `sample_interval`, produced `tick_rate` times per second.
    pub fn new(sample_interval: f64, max_length: usize, tick_rate: f64) -> Self {
        Self {
            sample_interval,
            max_length,
            tick_rate,
            table: None,
            rebuilds: 0,
            hpf: HighPassBank::default(),
            last_t: None,
        }
    }

    /// Current reference table, if one has been built.
    pub fn table(&self) -> Option<&ReferenceTable> {
        self.table.as_ref()
    }

    /// Number of reference table builds so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Return a table for `frequency`, rebuilding it if the frequency changed.
    pub fn ensure_table(&mut self, frequency: f64) -> AppResult<&ReferenceTable> {
        let stale = self.table.as_ref().map_or(true, |t| t.is_stale(frequency));
        if stale {
            let table = ReferenceTable::build(frequency, self.sample_interval, self.max_length)?;
            debug!(
                frequency,
                length = table.len(),
                half_period = table.half_period_samples(),
                "Reference table rebuilt"
            );
            self.rebuilds += 1;
            self.table = Some(table);
        }
        self.table
            .as_ref()
            .ok_or_else(|| LockinError::Processing("Reference table unavailable".into()))
    }

    /// Forget tick timing and filter history (used when acquisition restarts).
    pub fn restart(&mut self) {
        self.last_t = None;
        self.hpf = HighPassBank::default();
    }

    /// Demodulate one raw frame against the live configuration.
    ///
    /// Consumes a pending auto-zero request and publishes the captured offsets.
    pub fn process(&mut self, frame: &RawFrame, state: &SharedState) -> AppResult<Tick> {
        let mut config = state.snapshot();
        let channels = config.active_channels().min(frame.channels.len());
        if channels == 0 {
            return Err(LockinError::Processing("Raw frame has no channels".into()));
        }

        let table = self.ensure_table(config.reference_frequency())?;
        let raw = frame.channels[..channels]
            .iter()
            .map(|samples| table.correlate(samples))
            .collect::<AppResult<Vec<_>>>()?;

        if state.auto_zero.take() {
            config = state.update(|c| {
                for (offset, &(x, y)) in c.offsets.iter_mut().zip(&raw) {
                    *offset = Offset { x, y };
                }
                c.offset_enabled = true;
                Arc::new(c.clone())
            });
            info!(channels, offsets = ?&config.offsets[..channels], "Auto-zero captured");
        }

        self.hpf.configure(config.hpf_cutoff, self.tick_rate, channels);

        let points = raw
            .iter()
            .enumerate()
            .map(|(ch, &(x_raw, y_raw))| {
                let (x, y) = self.finish_channel(&config, ch, x_raw, y_raw);
                DemodulatedPoint { t: frame.t, x, y }
            })
            .collect();

        let dt = self.last_t.map_or(0.0, |last| frame.t - last);
        self.last_t = Some(frame.t);

        Ok(Tick {
            t: frame.t,
            dt,
            points,
        })
    }

    fn finish_channel(&mut self, config: &Configuration, ch: usize, x_raw: f64, y_raw: f64) -> (f64, f64) {
        let (x, y) = if config.offset_enabled {
            let offset = config.offsets[ch];
            (x_raw - offset.x, y_raw - offset.y)
        } else {
            (x_raw, y_raw)
        };
        let (x, y) = rotate(x, y, config.rotation_deg[ch].to_radians());
        self.hpf.run(ch, x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::f64::consts::{FRAC_PI_2, TAU};
    use tracing_test::traced_test;

    const DT: f64 = 1e-5;
    const N: usize = 1000;

    fn sine(frequency: f64, amplitude: f64, phase: f64, offset: f64) -> Vec<f64> {
        (0..N)
            .map(|i| amplitude * (TAU * frequency * i as f64 * DT + phase).sin() + offset)
            .collect()
    }

    fn frame(t: f64, channels: Vec<Vec<f64>>) -> RawFrame {
        RawFrame {
            t,
            sample_interval: DT,
            channels,
        }
    }

    fn demodulator() -> Demodulator {
        Demodulator::new(DT, N, 100.0)
    }

    #[test]
    fn magnitude_is_independent_of_input_phase() {
        let state = SharedState::new(Settings::default());
        let mut demod = demodulator();
        for k in 0..12 {
            let phase = k as f64 * TAU / 12.0;
            let tick = demod
                .process(&frame(0.0, vec![sine(1000.0, 0.7, phase, 0.0); 2]), &state)
                .unwrap();
            let p = tick.points[0];
            assert!((p.magnitude() - 0.7).abs() < 1e-9, "phase {phase}: {p:?}");
            assert!((p.x - 0.7 * phase.cos()).abs() < 1e-9);
            assert!((p.y - 0.7 * phase.sin()).abs() < 1e-9);
        }
    }

    #[test]
    fn magnitude_holds_for_non_integer_half_periods() {
        let mut settings = Settings::default();
        settings.instrument.frequency = 3000.0;
        let state = SharedState::new(settings);
        let mut demod = demodulator();
        let tick = demod
            .process(&frame(0.0, vec![sine(3000.0, 1.0, 0.3, 0.0); 2]), &state)
            .unwrap();
        // 17 samples per half period approximates 16.67; leakage stays small
        assert!((tick.points[0].magnitude() - 1.0).abs() < 0.05);
    }

    #[test]
    fn auto_zero_nulls_the_next_point_and_is_consumed() {
        let state = SharedState::new(Settings::default());
        let mut demod = demodulator();
        let input = vec![sine(1000.0, 0.4, 1.0, 0.2), sine(1000.0, 0.1, -0.5, 0.0)];

        let before = demod.process(&frame(0.0, input.clone()), &state).unwrap();
        assert!(before.points[0].magnitude() > 0.3);

        state.auto_zero.raise();
        let zeroed = demod.process(&frame(0.01, input.clone()), &state).unwrap();
        assert!(!state.auto_zero.is_raised());
        for p in &zeroed.points {
            assert!(p.x.abs() < 1e-12 && p.y.abs() < 1e-12, "{p:?}");
        }

        let config = state.snapshot();
        assert!((config.offsets[0].x - before.points[0].x).abs() < 1e-12);
        assert!((config.offsets[0].y - before.points[0].y).abs() < 1e-12);

        let after = demod.process(&frame(0.02, input), &state).unwrap();
        assert!(after.points[0].magnitude() < 1e-12);
    }

    #[test]
    fn offsets_are_ignored_when_disabled() {
        let state = SharedState::new(Settings::default());
        state.update(|c| {
            c.offsets[0] = Offset { x: 0.5, y: 0.5 };
            c.offset_enabled = false;
        });
        let mut demod = demodulator();
        let tick = demod
            .process(&frame(0.0, vec![sine(1000.0, 1.0, 0.0, 0.0); 2]), &state)
            .unwrap();
        assert!((tick.points[0].x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_moves_signal_into_quadrature() {
        let state = SharedState::new(Settings::default());
        state.update(|c| c.rotation_deg = [90.0, -90.0]);
        let mut demod = demodulator();
        let tick = demod
            .process(&frame(0.0, vec![sine(1000.0, 1.0, 0.0, 0.0); 2]), &state)
            .unwrap();
        assert!(tick.points[0].x.abs() < 1e-9);
        assert!((tick.points[0].y - 1.0).abs() < 1e-9);
        assert!((tick.points[1].y + 1.0).abs() < 1e-9);
    }

    #[test]
    fn rotate_is_counter_clockwise() {
        let (x, y) = rotate(1.0, 0.0, FRAC_PI_2);
        assert!(x.abs() < 1e-12);
        assert!((y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn frequency_change_rebuilds_table_before_demodulating() {
        let state = SharedState::new(Settings::default());
        let mut demod = demodulator();
        demod
            .process(&frame(0.0, vec![sine(1000.0, 1.0, 0.0, 0.0); 2]), &state)
            .unwrap();
        assert_eq!(demod.rebuilds(), 1);

        demod
            .process(&frame(0.01, vec![sine(1000.0, 1.0, 0.0, 0.0); 2]), &state)
            .unwrap();
        assert_eq!(demod.rebuilds(), 1);

        state.update(|c| c.waveforms[0].frequency = 2000.0);
        let tick = demod
            .process(&frame(0.02, vec![sine(2000.0, 0.5, 0.0, 0.0); 2]), &state)
            .unwrap();
        assert_eq!(demod.rebuilds(), 2);
        assert_eq!(demod.table().map(|t| t.frequency()), Some(2000.0));
        assert!((tick.points[0].magnitude() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn second_channel_follows_enable_flag() {
        let state = SharedState::new(Settings::default());
        let mut demod = demodulator();
        let input = vec![sine(1000.0, 1.0, 0.0, 0.0); 2];
        assert_eq!(demod.process(&frame(0.0, input.clone()), &state).unwrap().points.len(), 2);

        state.update(|c| c.chan2_enabled = false);
        assert_eq!(demod.process(&frame(0.01, input), &state).unwrap().points.len(), 1);
    }

    #[test]
    fn dt_is_measured_between_ticks() {
        let state = SharedState::new(Settings::default());
        let mut demod = demodulator();
        let input = vec![sine(1000.0, 1.0, 0.0, 0.0); 2];
        assert_eq!(demod.process(&frame(1.0, input.clone()), &state).unwrap().dt, 0.0);
        let tick = demod.process(&frame(1.25, input), &state).unwrap();
        assert!((tick.dt - 0.25).abs() < 1e-12);
    }

    #[test]
    fn high_pass_removes_static_reading() {
        let state = SharedState::new(Settings::default());
        state.update(|c| c.hpf_cutoff = 5.0);
        let mut demod = demodulator();
        let input = vec![sine(1000.0, 1.0, 0.0, 0.0); 2];
        let mut last = None;
        for i in 0..500 {
            last = Some(demod.process(&frame(i as f64 * 0.01, input.clone()), &state).unwrap());
        }
        let last = last.unwrap();
        assert!(last.points[0].magnitude() < 1e-6);
    }

    #[test]
    #[traced_test]
    fn unrealisable_cutoff_passes_through() {
        let state = SharedState::new(Settings::default());
        // tick rate 100 Hz, Nyquist 50 Hz
        state.update(|c| c.hpf_cutoff = 60.0);
        let mut demod = demodulator();
        let tick = demod
            .process(&frame(0.0, vec![sine(1000.0, 1.0, 0.0, 0.0); 2]), &state)
            .unwrap();
        assert!((tick.points[0].x - 1.0).abs() < 1e-9);
        assert!(logs_contain("High-pass disabled"));
    }

    #[test]
    fn short_buffer_is_a_processing_error() {
        let state = SharedState::new(Settings::default());
        let mut demod = demodulator();
        let err = demod
            .process(&frame(0.0, vec![vec![0.0; 10]; 2]), &state)
            .unwrap_err();
        assert!(matches!(err, LockinError::Processing(_)));
    }
}
