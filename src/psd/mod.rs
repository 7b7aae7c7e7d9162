//! Phase-sensitive detection.
//!
//! - [`reference`]: precomputed sine/cosine correlation kernels
//! - [`demodulator`]: turns one raw buffer into one (t, x, y) point per channel

pub mod demodulator;
pub mod reference;

pub use demodulator::{DemodulatedPoint, Demodulator, Tick};
pub use reference::ReferenceTable;
