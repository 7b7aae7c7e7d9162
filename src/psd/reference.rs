//! Reference tables for synchronous detection.
//!
//! A table covers a whole number of reference half-periods so that the
//! correlation integral of a sinusoid at the reference frequency has no
//! truncation error. Entries carry a factor 2 so that the mean of
//! `A·sin(ωt+φ) · 2·sin(ωt)` over the table is `A·cos(φ)`.

use crate::error::{AppResult, LockinError};
use std::f64::consts::TAU;

/// Precomputed sine and cosine references at one frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    frequency: f64,
    sample_interval: f64,
    half_period_samples: usize,
    sin: Vec<f64>,
    cos: Vec<f64>,
}

impl ReferenceTable {
    /// Build the tables for `frequency` sampled every `sample_interval` seconds.
    ///
    /// The length is the largest multiple of the half-period sample count not
    /// exceeding `max_length`, and never less than one half-period.
    pub fn build(frequency: f64, sample_interval: f64, max_length: usize) -> AppResult<Self> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(LockinError::Processing(format!(
                "Reference frequency must be positive, got {frequency}"
            )));
        }
        if !(sample_interval.is_finite() && sample_interval > 0.0) {
            return Err(LockinError::Processing(format!(
                "Sample interval must be positive, got {sample_interval}"
            )));
        }

        let half_period_samples = ((0.5 / frequency / sample_interval).round() as usize).max(1);
        let length = (half_period_samples * (max_length / half_period_samples)).max(half_period_samples);

        let (sin, cos) = (0..length)
            .map(|i| {
                let phase = TAU * frequency * i as f64 * sample_interval;
                (2.0 * phase.sin(), 2.0 * phase.cos())
            })
            .unzip();

        Ok(Self {
            frequency,
            sample_interval,
            half_period_samples,
            sin,
            cos,
        })
    }

    /// Whether the table must be rebuilt for `frequency`.
    ///
    /// Exact comparison: frequencies come straight from operator input.
    #[allow(clippy::float_cmp)]
    pub fn is_stale(&self, frequency: f64) -> bool {
        self.frequency != frequency
    }

    /// Frequency the table was built for.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Sample interval the table was built for.
    pub fn sample_interval(&self) -> f64 {
        self.sample_interval
    }

    /// Samples in one reference half-period.
    pub fn half_period_samples(&self) -> usize {
        self.half_period_samples
    }

    /// Number of entries in each table.
    pub fn len(&self) -> usize {
        self.sin.len()
    }

    /// Tables are never empty; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.sin.is_empty()
    }

    /// In-phase kernel.
    pub fn sin(&self) -> &[f64] {
        &self.sin
    }

    /// Quadrature kernel.
    pub fn cos(&self) -> &[f64] {
        &self.cos
    }

    /// Correlate `raw` against both kernels over the table length.
    ///
    /// Returns `(x, y)`. Samples beyond the table length are ignored.
    pub fn correlate(&self, raw: &[f64]) -> AppResult<(f64, f64)> {
        let n = self.len();
        if raw.len() < n {
            return Err(LockinError::Processing(format!(
                "Raw buffer has {} samples, reference table needs {}",
                raw.len(),
                n
            )));
        }
        let (sx, sy) = raw[..n]
            .iter()
            .zip(self.sin.iter().zip(&self.cos))
            .fold((0.0, 0.0), |(sx, sy), (r, (s, c))| (sx + r * s, sy + r * c));
        Ok((sx / n as f64, sy / n as f64))
    }
}
