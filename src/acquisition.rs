//! Acquisition engine: the fixed-cadence fetch → demodulate → append loop.
//!
//! The loop runs on a dedicated thread (`lockin-acquisition`) and is the only
//! writer of the stores. Control uses a two-flag handshake on [`SharedState`]:
//! the controller raises or lowers `trigger`, the acquisition thread answers by
//! mirroring it in `status` once the hardware is actually running or stopped.
//!
//! A hardware fault stops the run: the fault is recorded, `trigger` is cleared
//! and `status` drops, after which [`AcquisitionEngine::start`] may be called
//! again to retry.

use crate::clock::Clock;
use crate::data::Stores;
use crate::error::{AppResult, LockinError};
use crate::hardware::AnalogInput;
use crate::psd::Demodulator;
use crate::state::{RawFrame, SharedState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default time `start`/`stop` wait for the acquisition thread.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll period of the idle acquisition thread.
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Handle to the acquisition thread.
pub struct AcquisitionEngine {
    state: Arc<SharedState>,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

impl std::fmt::Debug for AcquisitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionEngine")
            .field("trigger", &self.state.trigger())
            .field("status", &self.state.status())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AcquisitionEngine {
    /// Spawn the acquisition thread. It idles until [`start`](Self::start).
    pub fn spawn(
        state: Arc<SharedState>,
        stores: Arc<Stores>,
        input: Arc<dyn AnalogInput>,
    ) -> AppResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = Worker::new(Arc::clone(&state), stores, input);
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("lockin-acquisition".to_string())
            .spawn(move || worker.run(&thread_shutdown))?;

        Ok(Self {
            state,
            shutdown,
            handle: Mutex::new(Some(handle)),
            timeout: HANDSHAKE_TIMEOUT,
        })
    }

    /// Override the handshake timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Request acquisition and wait until the thread reports it running.
    ///
    /// Returns the recorded hardware fault if arming the input fails.
    pub fn start(&self) -> AppResult<()> {
        self.state.set_trigger(true);
        self.wait_for_status(true, "start")
    }

    /// Request a stop and wait until the thread reports it idle.
    pub fn stop(&self) -> AppResult<()> {
        self.state.set_trigger(false);
        self.wait_for_status(false, "stop")
    }

    /// Whether the acquisition thread reports a running acquisition.
    pub fn is_running(&self) -> bool {
        self.state.status()
    }

    /// Stop acquisition and join the thread. Idempotent.
    pub fn shutdown(&self) -> AppResult<()> {
        let stopped = self.stop();
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.lock().take() {
            handle.join().map_err(|_| {
                LockinError::Processing("Acquisition thread panicked".to_string())
            })?;
            info!("Acquisition thread joined");
        }
        stopped
    }

    fn wait_for_status(&self, wanted: bool, request: &'static str) -> AppResult<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.state.status() == wanted {
                return Ok(());
            }
            // The thread clears the trigger when arming fails.
            if wanted && !self.state.trigger() {
                let fault = self
                    .state
                    .last_fault()
                    .unwrap_or_else(|| "acquisition did not start".to_string());
                return Err(LockinError::HardwareFault(fault));
            }
            if self.shutdown.load(Ordering::Acquire) || Instant::now() >= deadline {
                return Err(LockinError::HandshakeTimeout(request));
            }
            std::thread::yield_now();
        }
    }
}

impl Drop for AcquisitionEngine {
    fn drop(&mut self) {
        self.state.set_trigger(false);
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.get_mut().take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    state: Arc<SharedState>,
    stores: Arc<Stores>,
    input: Arc<dyn AnalogInput>,
    clock: Clock,
    interval: f64,
    demodulator: Option<Demodulator>,
    sample_interval: f64,
    buffers: Vec<Vec<f64>>,
    ticks: u64,
    overruns: u64,
}

impl Worker {
    fn new(state: Arc<SharedState>, stores: Arc<Stores>, input: Arc<dyn AnalogInput>) -> Self {
        let interval = state.settings().tick_interval().as_secs_f64();
        Self {
            state,
            stores,
            input,
            clock: Clock::new(),
            interval,
            demodulator: None,
            sample_interval: 0.0,
            buffers: Vec::new(),
            ticks: 0,
            overruns: 0,
        }
    }

    fn run(mut self, shutdown: &AtomicBool) {
        debug!("Acquisition thread ready");
        while !shutdown.load(Ordering::Acquire) {
            if !self.state.trigger() {
                if self.state.clear_stores.take() {
                    self.stores.clear();
                    debug!("Stores cleared");
                }
                std::thread::sleep(IDLE_POLL);
                continue;
            }

            if let Err(e) = self.arm() {
                self.fault(&e);
                continue;
            }
            self.state.set_status(true);
            info!(interval = self.interval, "Acquisition started");

            while self.state.trigger() && !shutdown.load(Ordering::Acquire) {
                if let Err(e) = self.tick() {
                    self.fault(&e);
                    break;
                }
            }

            if let Err(e) = self.input.stop() {
                warn!(error = %e, "Failed to stop analog input");
            }
            self.state.set_status(false);
            info!(ticks = self.ticks, overruns = self.overruns, "Acquisition stopped");
        }
        debug!("Acquisition thread exiting");
    }

    /// Configure and start the input for a new run.
    fn arm(&mut self) -> AppResult<()> {
        let acq = &self.state.settings().acquisition;
        let (channels, rate, length) = (acq.channel_count, acq.sample_rate, acq.buffer_length);

        let actual = self.input.configure(channels, rate, length)?;
        if !(actual.is_finite() && actual > 0.0) {
            return Err(LockinError::HardwareFault(format!(
                "Input reported sample rate {actual}"
            )));
        }
        let sample_interval = 1.0 / actual;

        #[allow(clippy::float_cmp)]
        let reuse = self.sample_interval == sample_interval;
        match self.demodulator.as_mut() {
            Some(demodulator) if reuse => demodulator.restart(),
            _ => {
                self.demodulator = Some(Demodulator::new(sample_interval, length, 1.0 / self.interval));
            }
        }
        self.sample_interval = sample_interval;
        self.buffers = vec![vec![0.0; length]; channels];
        self.ticks = 0;
        self.overruns = 0;

        self.input.start()?;
        self.clock.reset_schedule();
        debug!(requested = rate, actual, length, channels, "Analog input armed");
        Ok(())
    }

    fn tick(&mut self) -> AppResult<()> {
        self.clock.sleep_from_previous(self.interval);
        self.input.fetch(&mut self.buffers)?;
        let t = self.clock.now();
        if t > self.clock.previous_target() + self.interval {
            self.overruns += 1;
        }

        let frame = RawFrame {
            t,
            sample_interval: self.sample_interval,
            channels: self.buffers.clone(),
        };
        let demodulator = self
            .demodulator
            .as_mut()
            .ok_or_else(|| LockinError::Processing("Demodulator not armed".to_string()))?;
        let tick = demodulator.process(&frame, &self.state)?;
        self.state.publish_raw(frame);

        if self.state.clear_stores.take() {
            self.stores.clear();
            debug!("Stores cleared");
        }
        if self.state.is_measuring() {
            self.stores.append(&tick);
        }
        self.ticks += 1;
        Ok(())
    }

    fn fault(&mut self, e: &LockinError) {
        error!(error = %e, "Acquisition fault");
        self.state.record_fault(e.to_string());
        self.state.set_trigger(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::hardware::MockDaq;

    fn engine() -> (AcquisitionEngine, Arc<SharedState>, Arc<Stores>, Arc<MockDaq>) {
        let settings = Settings::default();
        let state = Arc::new(SharedState::new(settings.clone()));
        let stores = Arc::new(Stores::from_settings(&settings));
        let daq = Arc::new(MockDaq::new());
        let engine = AcquisitionEngine::spawn(
            Arc::clone(&state),
            Arc::clone(&stores),
            Arc::clone(&daq) as Arc<dyn AnalogInput>,
        )
        .unwrap();
        (engine, state, stores, daq)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn handshake_mirrors_trigger_in_status() {
        let (engine, state, stores, daq) = engine();
        assert!(!engine.is_running());

        engine.start().unwrap();
        assert!(state.status());
        assert!(daq.is_running());
        assert!(wait_for(|| stores.history.len() >= 3));

        engine.stop().unwrap();
        assert!(!state.status());
        assert!(!daq.is_running());
        engine.shutdown().unwrap();
    }

    #[test]
    fn demodulated_points_reach_both_stores() {
        let (engine, _state, stores, _daq) = engine();
        engine.start().unwrap();
        assert!(wait_for(|| stores.xy.len() >= 5));
        engine.shutdown().unwrap();

        let latest = stores.history.latest().unwrap();
        // unity loopback of a 1 V sine at zero phase
        assert!((latest.x[0] - 1.0).abs() < 1e-6, "{latest:?}");
        assert!(latest.y[0].abs() < 1e-6);
        let rows = stores.history.snapshot_range(None);
        assert!(rows.windows(2).all(|w| w[1].t > w[0].t));
        assert!(rows[1..].iter().all(|p| p.dt > 0.0));
    }

    #[test]
    fn pause_stops_store_appends() {
        let (engine, state, stores, _daq) = engine();
        engine.start().unwrap();
        assert!(wait_for(|| stores.history.len() >= 2));

        state.set_measuring(false);
        std::thread::sleep(Duration::from_millis(30));
        let paused = stores.history.len();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(stores.history.len(), paused);
        assert!(!state.raw_frame().is_empty());

        state.set_measuring(true);
        assert!(wait_for(|| stores.history.len() > paused));
        engine.shutdown().unwrap();
    }

    #[test]
    fn clear_request_is_consumed_while_idle() {
        let (engine, state, stores, _daq) = engine();
        engine.start().unwrap();
        assert!(wait_for(|| stores.history.len() >= 2));
        engine.stop().unwrap();

        state.clear_stores.raise();
        assert!(wait_for(|| !state.clear_stores.is_raised()));
        assert!(stores.history.is_empty());
        assert!(stores.xy.is_empty());
        engine.shutdown().unwrap();
    }

    #[test]
    fn hardware_fault_stops_and_allows_restart() {
        let (engine, state, stores, daq) = engine();
        engine.start().unwrap();
        assert!(wait_for(|| stores.history.len() >= 2));

        daq.fail_next_fetch();
        assert!(wait_for(|| !state.status()));
        assert!(!state.trigger());
        assert!(state.last_fault().unwrap().contains("injected fetch failure"));

        engine.start().unwrap();
        let before = stores.history.len();
        assert!(wait_for(|| stores.history.len() > before));
        engine.shutdown().unwrap();
    }

    #[test]
    fn start_reports_arming_failure() {
        let mut settings = Settings::default();
        settings.acquisition.channel_count = 2;
        let state = Arc::new(SharedState::new(settings.clone()));
        let stores = Arc::new(Stores::from_settings(&settings));

        struct DeadInput;
        impl AnalogInput for DeadInput {
            fn configure(&self, _: usize, _: f64, _: usize) -> AppResult<f64> {
                Err(LockinError::HardwareFault("board unplugged".into()))
            }
            fn start(&self) -> AppResult<()> {
                Ok(())
            }
            fn fetch(&self, _: &mut [Vec<f64>]) -> AppResult<()> {
                Ok(())
            }
            fn identity(&self) -> String {
                "dead".into()
            }
        }

        let engine = AcquisitionEngine::spawn(state, stores, Arc::new(DeadInput)).unwrap();
        let err = engine.start().unwrap_err();
        assert!(matches!(err, LockinError::HardwareFault(ref m) if m.contains("unplugged")));
        assert!(!engine.is_running());
    }
}
