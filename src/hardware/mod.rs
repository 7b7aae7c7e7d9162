//! Hardware boundary of the measurement core.
//!
//! The acquisition thread pulls raw buffers through [`AnalogInput`]; the command
//! dispatcher pushes excitation changes through [`WaveformOutput`].

pub mod capabilities;
pub mod mock;

pub use capabilities::{AnalogInput, WaveformOutput};
pub use mock::{ChannelResponse, MockDaq};
