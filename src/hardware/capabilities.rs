//! Hardware Capabilities
//!
//! The measurement core only talks to hardware through two small capability
//! traits:
//!
//! - [`AnalogInput`]: a buffered, clocked analog input (one buffer per tick)
//! - [`WaveformOutput`]: the excitation generator for both output channels
//!
//! A single device may implement both (the mock DAQ does).
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is synchronous (the acquisition loop runs on a dedicated thread and must
//!   block inside `fetch` until the hardware signals data-ready)
//! - Is thread-safe (requires Send + Sync, methods take `&self`)
//! - Reports failures as [`LockinError::HardwareFault`](crate::error::LockinError)
//!   so callers can retry instead of terminating
//!
//! # Example
//!
//! ```rust,ignore
//! fn one_buffer<D: AnalogInput>(daq: &D) -> AppResult<Vec<Vec<f64>>> {
//!     let rate = daq.configure(2, 100_000.0, 1000)?;
//!     daq.start()?;
//!     let mut buffers = vec![vec![0.0; 1000]; 2];
//!     daq.fetch(&mut buffers)?;
//!     Ok(buffers)
//! }
//! ```

use crate::error::AppResult;
use crate::state::Excitation;

/// Capability: Clocked Analog Input
///
/// # Contract
/// - `configure` must be called before `start`; it returns the sample rate the
///   hardware actually achieved, which may differ from the request
/// - `fetch` blocks until one full buffer per channel is available and fills
///   `buffers[channel][..buffer_length]`
/// - consecutive fetches are contiguous in time while running
pub trait AnalogInput: Send + Sync {
    /// Configure channel count, sample rate (Hz) and samples per fetch.
    ///
    /// # Returns
    /// The achieved sample rate in Hz.
    fn configure(
        &self,
        channel_count: usize,
        sample_rate: f64,
        buffer_length: usize,
    ) -> AppResult<f64>;

    /// Start continuous acquisition.
    fn start(&self) -> AppResult<()>;

    /// Stop acquisition. Default implementation does nothing.
    fn stop(&self) -> AppResult<()> {
        Ok(())
    }

    /// Block until the next buffer is ready and copy it out.
    ///
    /// # Arguments
    /// * `buffers` - one vector per configured channel, each at least `buffer_length` long
    fn fetch(&self, buffers: &mut [Vec<f64>]) -> AppResult<()>;

    /// Human-readable device identity.
    fn identity(&self) -> String;
}

/// Capability: Excitation Output
///
/// # Contract
/// - `apply` reconfigures both output channels in one call so frequency,
///   amplitude and phase change together at the hardware boundary
pub trait WaveformOutput: Send + Sync {
    /// Apply frequency, amplitude and phase for both channels.
    fn apply(&self, channels: &[Excitation; 2]) -> AppResult<()>;

    /// Human-readable device identity.
    fn identity(&self) -> String;
}
