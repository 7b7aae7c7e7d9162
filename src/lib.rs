//! # Rust Lock-in Core Library
//!
//! Measurement core of a lock-in amplifier: it turns a stream of raw analog
//! buffers into a continuous phase-resolved (x, y) measurement at a reference
//! frequency, keeps the result history in lock-free rings, and exposes a
//! line-oriented text protocol for live reconfiguration.
//!
//! ## Crate Structure
//!
//! - **`clock`**: monotonic clock with drift-free, sub-millisecond tick scheduling.
//! - **`psd`**: reference tables and the phase-sensitive demodulator (offsets,
//!   auto-zero, phase rotation, output high-pass).
//! - **`data`**: the lock-free `AtomicRing`, the history and XY stores, the
//!   output high-pass filter and CSV export.
//! - **`state`**: the runtime configuration, published as immutable snapshots,
//!   and the one-shot request flags shared by all threads.
//! - **`hardware`**: `AnalogInput` / `WaveformOutput` capability traits and the
//!   loopback `MockDaq`.
//! - **`acquisition`**: the acquisition thread and its start/stop handshake.
//! - **`command`**: parser, declarative command table and dispatcher.
//! - **`server`**: TCP control channel.
//! - **`lockin`**: assembles all of the above into a running instrument.
//! - **`config`**, **`logging`**, **`error`**, **`validation`**: startup settings,
//!   tracing setup, the `LockinError` type and argument validators.

pub mod acquisition;
pub mod clock;
pub mod command;
pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod lockin;
pub mod logging;
pub mod psd;
pub mod server;
pub mod state;
pub mod validation;
