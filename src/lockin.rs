//! Instrument assembly: shared state, stores, hardware and the acquisition
//! thread wired together, plus dispatchers on demand.

use crate::acquisition::AcquisitionEngine;
use crate::command::Dispatcher;
use crate::config::Settings;
use crate::data::Stores;
use crate::error::AppResult;
use crate::hardware::{AnalogInput, MockDaq, WaveformOutput};
use crate::server::DispatcherFactory;
use crate::state::SharedState;
use std::sync::Arc;
use tracing::info;

/// A running lock-in instrument.
pub struct LockIn {
    state: Arc<SharedState>,
    stores: Arc<Stores>,
    input: Arc<dyn AnalogInput>,
    output: Arc<dyn WaveformOutput>,
    engine: Arc<AcquisitionEngine>,
}

impl std::fmt::Debug for LockIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockIn")
            .field("input", &self.input.identity())
            .field("output", &self.output.identity())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl LockIn {
    /// Wire `input` and `output` to fresh state and stores.
    ///
    /// The power-on excitation is applied to `output`; acquisition stays idle
    /// until [`start`](Self::start).
    pub fn new(
        settings: Settings,
        input: Arc<dyn AnalogInput>,
        output: Arc<dyn WaveformOutput>,
    ) -> AppResult<Self> {
        let stores = Arc::new(Stores::from_settings(&settings));
        let state = Arc::new(SharedState::new(settings));
        output.apply(&state.snapshot().waveforms)?;
        let engine = Arc::new(AcquisitionEngine::spawn(
            Arc::clone(&state),
            Arc::clone(&stores),
            Arc::clone(&input),
        )?);
        info!(
            input = %input.identity(),
            output = %output.identity(),
            history = stores.history.capacity(),
            xy = stores.xy.capacity(),
            "Lock-in assembled"
        );
        Ok(Self {
            state,
            stores,
            input,
            output,
            engine,
        })
    }

    /// Instrument backed by the real-time paced mock DAQ.
    pub fn with_mock(settings: Settings) -> AppResult<Self> {
        let daq = Arc::new(MockDaq::new().with_pacing(true).with_noise(1e-3));
        Self::new(settings, Arc::clone(&daq) as Arc<dyn AnalogInput>, daq)
    }

    /// Start acquisition.
    pub fn start(&self) -> AppResult<()> {
        self.engine.start()
    }

    /// Stop acquisition and join the acquisition thread.
    pub fn shutdown(&self) -> AppResult<()> {
        self.engine.shutdown()
    }

    /// Shared runtime state.
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// History and XY stores.
    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    /// Acquisition engine.
    pub fn engine(&self) -> &Arc<AcquisitionEngine> {
        &self.engine
    }

    /// A dispatcher bound to this instrument.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.state), Arc::clone(&self.stores))
            .with_input(Arc::clone(&self.input))
            .with_output(Arc::clone(&self.output))
            .with_engine(Arc::clone(&self.engine))
    }

    /// Factory handing every control connection its own dispatcher.
    pub fn dispatcher_factory(self: &Arc<Self>) -> DispatcherFactory {
        let lockin = Arc::clone(self);
        Arc::new(move || lockin.dispatcher())
    }
}
