//! Mock Hardware Implementation
//!
//! [`MockDaq`] simulates a two-channel DAQ board whose analog inputs are wired
//! back to its own generator outputs through a configurable response:
//!
//! `input[k](t) = gain[k] · A[k] · sin(2π f[k] t + φ[k] + lag[k]) + offset[k] + noise`
//!
//! The simulated sample clock runs continuously from `start`, so consecutive
//! fetches are phase-continuous. With pacing enabled, `fetch` blocks until the
//! last sample of the buffer would have been converted in real time.

use crate::error::{AppResult, LockinError};
use crate::hardware::capabilities::{AnalogInput, WaveformOutput};
use crate::state::Excitation;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Onboard timebase the sample clock divides down from (Hz).
pub const BASE_CLOCK_HZ: f64 = 20_000_000.0;

/// 24-bit clock divisor range.
const DIVISOR_RANGE: (f64, f64) = (1.0, 16_777_215.0);

/// Transfer function from a generator output to the matching input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelResponse {
    /// Amplitude gain
    pub gain: f64,
    /// Phase lag in degrees added to the excitation phase
    pub phase_deg: f64,
    /// DC level in volts
    pub offset: f64,
}

impl Default for ChannelResponse {
    fn default() -> Self {
        Self {
            gain: 1.0,
            phase_deg: 0.0,
            offset: 0.0,
        }
    }
}

struct MockState {
    channel_count: usize,
    sample_rate: f64,
    buffer_length: usize,
    running: bool,
    /// Index of the next sample to produce
    sample_index: u64,
    started_at: Option<Instant>,
    excitation: [Excitation; 2],
    response: [ChannelResponse; 2],
    /// Additive white noise, `None` when noiseless
    noise: Option<Normal<f64>>,
    rng: StdRng,
}

/// Simulated DAQ board with loopback wiring.
pub struct MockDaq {
    state: Mutex<MockState>,
    pacing: bool,
    fail_next_fetch: AtomicBool,
    fail_next_apply: AtomicBool,
}

impl std::fmt::Debug for MockDaq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDaq")
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl Default for MockDaq {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDaq {
    /// Unpaced, noiseless mock with unity loopback on both channels.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                channel_count: 1,
                sample_rate: 100_000.0,
                buffer_length: 1000,
                running: false,
                sample_index: 0,
                started_at: None,
                excitation: [Excitation {
                    frequency: 1000.0,
                    amplitude: 1.0,
                    phase: 0.0,
                }; 2],
                response: [ChannelResponse::default(); 2],
                noise: None,
                rng: StdRng::seed_from_u64(0x10C4_1A),
            }),
            pacing: false,
            fail_next_fetch: AtomicBool::new(false),
            fail_next_apply: AtomicBool::new(false),
        }
    }

    /// Block in `fetch` until the buffer would exist in real time.
    pub fn with_pacing(mut self, pacing: bool) -> Self {
        self.pacing = pacing;
        self
    }

    /// Add white Gaussian noise with the given RMS in volts.
    ///
    /// A non-positive or non-finite RMS leaves the mock noiseless.
    pub fn with_noise(self, rms: f64) -> Self {
        let noise = if rms.is_finite() && rms > 0.0 {
            Normal::new(0.0, rms).ok()
        } else {
            None
        };
        if noise.is_none() && rms != 0.0 {
            tracing::warn!(rms, "MockDaq: noise RMS rejected, running noiseless");
        }
        self.state.lock().noise = noise;
        self
    }

    /// Set the loopback response of one input channel (0-based).
    pub fn with_response(self, channel: usize, response: ChannelResponse) -> Self {
        if let Some(slot) = self.state.lock().response.get_mut(channel) {
            *slot = response;
        }
        self
    }

    /// Seed the noise generator for reproducible runs.
    pub fn with_seed(self, seed: u64) -> Self {
        self.state.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Change a channel's response while running.
    pub fn set_response(&self, channel: usize, response: ChannelResponse) {
        if let Some(slot) = self.state.lock().response.get_mut(channel) {
            *slot = response;
        }
    }

    /// Make the next `fetch` fail with a hardware fault.
    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::Release);
    }

    /// Make the next `apply` fail with a hardware fault.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::Release);
    }

    /// Generator settings currently applied.
    pub fn excitation(&self) -> [Excitation; 2] {
        self.state.lock().excitation
    }

    /// Whether acquisition is running.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Closest rate the base clock can produce for `requested`.
    pub fn nearest_sample_rate(requested: f64) -> f64 {
        let divisor = (BASE_CLOCK_HZ / requested)
            .round()
            .clamp(DIVISOR_RANGE.0, DIVISOR_RANGE.1);
        BASE_CLOCK_HZ / divisor
    }
}

impl AnalogInput for MockDaq {
    fn configure(
        &self,
        channel_count: usize,
        sample_rate: f64,
        buffer_length: usize,
    ) -> AppResult<f64> {
        if !(1..=2).contains(&channel_count) {
            return Err(LockinError::HardwareFault(format!(
                "MockDaq: {channel_count} channels requested, board has 2"
            )));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) || buffer_length == 0 {
            return Err(LockinError::HardwareFault(format!(
                "MockDaq: invalid timing ({sample_rate} Hz, {buffer_length} samples)"
            )));
        }

        let actual = Self::nearest_sample_rate(sample_rate);
        let mut state = self.state.lock();
        state.channel_count = channel_count;
        state.sample_rate = actual;
        state.buffer_length = buffer_length;
        tracing::debug!(
            requested = sample_rate,
            actual,
            buffer_length,
            channel_count,
            "MockDaq configured"
        );
        Ok(actual)
    }

    fn start(&self) -> AppResult<()> {
        let mut state = self.state.lock();
        state.running = true;
        state.sample_index = 0;
        state.started_at = Some(Instant::now());
        tracing::debug!("MockDaq acquisition started");
        Ok(())
    }

    fn stop(&self) -> AppResult<()> {
        let mut state = self.state.lock();
        state.running = false;
        state.started_at = None;
        tracing::debug!("MockDaq acquisition stopped");
        Ok(())
    }

    fn fetch(&self, buffers: &mut [Vec<f64>]) -> AppResult<()> {
        if self.fail_next_fetch.swap(false, Ordering::AcqRel) {
            return Err(LockinError::HardwareFault(
                "MockDaq: injected fetch failure".into(),
            ));
        }

        let ready_at = {
            let state = self.state.lock();
            if !state.running {
                return Err(LockinError::HardwareFault(
                    "MockDaq: fetch while stopped".into(),
                ));
            }
            if buffers.len() < state.channel_count {
                return Err(LockinError::HardwareFault(format!(
                    "MockDaq: {} buffers for {} channels",
                    buffers.len(),
                    state.channel_count
                )));
            }
            let end = state.sample_index + state.buffer_length as u64;
            state
                .started_at
                .map(|t0| t0 + Duration::from_secs_f64(end as f64 / state.sample_rate))
        };

        if self.pacing {
            if let Some(ready_at) = ready_at {
                let now = Instant::now();
                if ready_at > now {
                    std::thread::sleep(ready_at - now);
                }
            }
        }

        let mut state = self.state.lock();
        let MockState {
            channel_count,
            sample_rate,
            buffer_length,
            sample_index,
            excitation,
            response,
            noise,
            rng,
            ..
        } = &mut *state;

        let dt = 1.0 / *sample_rate;
        for (channel, buffer) in buffers.iter_mut().take(*channel_count).enumerate() {
            let source = excitation[channel];
            let wiring = response[channel];
            let amplitude = wiring.gain * source.amplitude;
            let phase = (source.phase + wiring.phase_deg).to_radians();
            buffer.resize(*buffer_length, 0.0);
            for (i, sample) in buffer.iter_mut().enumerate() {
                let t = (*sample_index + i as u64) as f64 * dt;
                let mut value = amplitude * (TAU * source.frequency * t + phase).sin() + wiring.offset;
                if let Some(noise) = noise.as_ref() {
                    value += noise.sample(rng);
                }
                *sample = value;
            }
        }
        *sample_index += *buffer_length as u64;
        Ok(())
    }

    fn identity(&self) -> String {
        "rust-lockin,MockDaq,0,0.1".to_string()
    }
}

impl WaveformOutput for MockDaq {
    fn apply(&self, channels: &[Excitation; 2]) -> AppResult<()> {
        if self.fail_next_apply.swap(false, Ordering::AcqRel) {
            return Err(LockinError::HardwareFault(
                "MockDaq: injected generator failure".into(),
            ));
        }
        self.state.lock().excitation = *channels;
        tracing::debug!(
            f1 = channels[0].frequency,
            a1 = channels[0].amplitude,
            f2 = channels[1].frequency,
            a2 = channels[1].amplitude,
            "MockDaq generator updated"
        );
        Ok(())
    }

    fn identity(&self) -> String {
        "rust-lockin,MockAwg,0,0.1".to_string()
    }
}
