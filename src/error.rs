//! Custom error types for the lock-in core.
//!
//! This module defines the primary error type, `LockinError`, used throughout the crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures the measurement core can run into.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically parse or type errors in the
//!   settings file or in `RUST_LOCKIN_*` environment overrides.
//! - **`Configuration`**: Semantic errors in otherwise well-formed settings (e.g. a tick
//!   interval too short to hold one raw buffer). Caught by `Settings::validate`.
//! - **`Io`**: Wraps `std::io::Error` (control channel, export files).
//! - **`HardwareFault`**: A call across the acquisition or generator boundary failed.
//!   Never fatal; the acquisition thread stops and the caller may restart it.
//! - **`Processing`**: Demodulation could not be carried out (e.g. a raw buffer shorter
//!   than the reference table).
//! - **`CommandRejected`**: A command line was malformed or out of range.
//!
//! By using `#[from]`, `LockinError` can be created from the underlying error types,
//! so the `?` operator works across module boundaries.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, LockinError>;

/// Errors produced by the lock-in core.
#[derive(Error, Debug)]
pub enum LockinError {
    /// The settings file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Settings parsed but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The acquisition or generator hardware reported a failure.
    #[error("Hardware fault: {0}")]
    HardwareFault(String),

    /// No acquisition device is attached.
    #[error("No DAQ is connected.")]
    NotConnected,

    /// Demodulation failed for the current tick.
    #[error("Data processing error: {0}")]
    Processing(String),

    /// Export to disk failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A command line could not be applied.
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// The acquisition thread did not acknowledge a start/stop request in time.
    #[error("Acquisition did not acknowledge {0} request")]
    HandshakeTimeout(&'static str),
}

impl From<figment::Error> for LockinError {
    fn from(value: figment::Error) -> Self {
        LockinError::Config(Box::new(value))
    }
}

impl LockinError {
    /// Whether an operator can recover by re-issuing the operation
    /// (restarting acquisition, reconnecting) without restarting the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LockinError::HardwareFault(_)
                | LockinError::NotConnected
                | LockinError::Processing(_)
                | LockinError::CommandRejected(_)
                | LockinError::HandshakeTimeout(_)
                | LockinError::Storage(_)
        )
    }
}
