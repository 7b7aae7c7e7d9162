//! Demodulated data: lock-free rings, the history/XY stores, the output
//! high-pass and CSV export.
pub mod iir_filter;
pub mod ring_buffer;
pub mod storage;
pub mod store;

pub use ring_buffer::AtomicRing;
pub use store::{HistoryPoint, HistoryStore, Stores, XyPoint, XyStore};
