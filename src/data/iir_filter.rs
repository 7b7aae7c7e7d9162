//! Second-order IIR high-pass for the demodulated x/y streams.
use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Q_BUTTERWORTH_F64};

/// Configuration for the `HighPass` filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IirFilterConfig {
    /// The cutoff frequency of the filter in Hz.
    pub f0: f64,
    /// The sample rate of the filtered stream in Hz (the tick rate).
    pub fs: f64,
    /// The quality factor (Q) of the filter.
    /// If not provided, a default Butterworth Q value is used.
    pub q: Option<f64>,
}

/// A Butterworth high-pass applied to one scalar stream.
///
/// This uses the `biquad` crate's direct form 1 implementation; state persists
/// between calls so consecutive ticks form one continuous signal.
pub struct HighPass {
    filter: DirectForm1<f64>,
}

impl std::fmt::Debug for HighPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighPass").finish_non_exhaustive()
    }
}

impl HighPass {
    /// Design the filter. Fails when the cutoff is not below the Nyquist frequency.
    pub fn new(config: IirFilterConfig) -> Result<Self, &'static str> {
        if !(config.f0.is_finite() && config.f0 > 0.0) {
            return Err("Cutoff frequency must be positive");
        }
        let q = config.q.unwrap_or(Q_BUTTERWORTH_F64);
        let coeffs = Coefficients::<f64>::from_params(
            biquad::Type::HighPass,
            config.fs.hz(),
            config.f0.hz(),
            q,
        )
        .map_err(|_| "Failed to create IIR filter coefficients")?;
        Ok(Self {
            filter: DirectForm1::<f64>::new(coeffs),
        })
    }

    /// Filter one sample.
    pub fn run(&mut self, value: f64) -> f64 {
        self.filter.run(value)
    }
}
