//! Time-series stores fed by the acquisition thread.
//!
//! - [`HistoryStore`]: long horizon of `(t, dt, x1, y1, x2, y2)` rows
//! - [`XyStore`]: short rolling `(x1, y1, x2, y2)` trace
//!
//! Both wrap an [`AtomicRing`] sized from the settings; they are written only by
//! the acquisition thread and read lock-free by everybody else.

use crate::config::Settings;
use crate::data::ring_buffer::AtomicRing;
use crate::psd::Tick;
use std::time::Duration;

/// One row of the long-history store.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoryPoint {
    /// Clock time of the tick in seconds
    pub t: f64,
    /// Seconds since the previous tick
    pub dt: f64,
    /// In-phase value per channel
    pub x: [f64; 2],
    /// Quadrature value per channel
    pub y: [f64; 2],
}

impl HistoryPoint {
    fn from_row(row: [f64; 6]) -> Self {
        let [t, dt, x1, y1, x2, y2] = row;
        Self {
            t,
            dt,
            x: [x1, x2],
            y: [y1, y2],
        }
    }

    fn to_row(self) -> [f64; 6] {
        [self.t, self.dt, self.x[0], self.y[0], self.x[1], self.y[1]]
    }
}

/// One row of the XY trace store.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct XyPoint {
    /// In-phase value per channel
    pub x: [f64; 2],
    /// Quadrature value per channel
    pub y: [f64; 2],
}

fn channel_values(tick: &Tick) -> ([f64; 2], [f64; 2]) {
    let mut x = [0.0; 2];
    let mut y = [0.0; 2];
    for (ch, point) in tick.points.iter().take(2).enumerate() {
        x[ch] = point.x;
        y[ch] = point.y;
    }
    (x, y)
}

/// Rows needed to cover `seconds` at `interval` spacing.
///
/// Quotients within rounding error of a whole number count as that number, so
/// `0.07 / 0.01` gives 7 rows, not 8.
fn span_to_rows(seconds: f64, interval: f64) -> usize {
    let ticks = seconds / interval;
    let nearest = ticks.round();
    if (ticks - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest as usize
    } else {
        ticks.ceil() as usize
    }
}

/// Long-horizon demodulated history.
#[derive(Debug)]
pub struct HistoryStore {
    ring: AtomicRing<6>,
    tick_interval: f64,
}

impl HistoryStore {
    /// Allocate `capacity` rows for ticks nominally `tick_interval` apart.
    pub fn new(capacity: usize, tick_interval: Duration) -> Self {
        Self {
            ring: AtomicRing::new(capacity),
            tick_interval: tick_interval.as_secs_f64(),
        }
    }

    /// Append one tick. Acquisition thread only.
    pub fn append(&self, tick: &Tick) {
        let (x, y) = channel_values(tick);
        self.push(HistoryPoint {
            t: tick.t,
            dt: tick.dt,
            x,
            y,
        });
    }

    /// Append a prepared row. Acquisition thread only.
    pub fn push(&self, point: HistoryPoint) {
        self.ring.push(point.to_row());
    }

    /// Rows covering the last `seconds` of history (all rows for `None`), oldest first.
    ///
    /// The span is converted to a row count with the nominal tick interval;
    /// a span longer than the written history returns everything written.
    pub fn snapshot_range(&self, seconds: Option<f64>) -> Vec<HistoryPoint> {
        let count = match seconds {
            Some(s) if s.is_finite() && s >= 0.0 => span_to_rows(s, self.tick_interval),
            _ => self.ring.capacity(),
        };
        self.ring
            .read_last(count)
            .into_iter()
            .map(HistoryPoint::from_row)
            .collect()
    }

    /// Most recent row.
    pub fn latest(&self) -> Option<HistoryPoint> {
        self.ring.last().map(HistoryPoint::from_row)
    }

    /// Readable rows.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether no row is readable.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Maximum readable rows.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Drop all rows. Acquisition thread only.
    pub fn clear(&self) {
        self.ring.clear();
    }
}

/// Short rolling XY trace.
#[derive(Debug)]
pub struct XyStore {
    ring: AtomicRing<4>,
}

impl XyStore {
    /// Allocate `capacity` rows.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: AtomicRing::new(capacity),
        }
    }

    /// Append one tick. Acquisition thread only.
    pub fn append(&self, tick: &Tick) {
        let (x, y) = channel_values(tick);
        self.ring.push([x[0], y[0], x[1], y[1]]);
    }

    /// Whole trace, oldest first.
    pub fn snapshot(&self) -> Vec<XyPoint> {
        self.ring.read_all().into_iter().map(Self::point).collect()
    }

    /// Most recent point.
    pub fn latest(&self) -> Option<XyPoint> {
        self.ring.last().map(Self::point)
    }

    /// Readable rows.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether no row is readable.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Maximum readable rows.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Drop all rows. Acquisition thread only.
    pub fn clear(&self) {
        self.ring.clear();
    }

    fn point(row: [f64; 4]) -> XyPoint {
        XyPoint {
            x: [row[0], row[2]],
            y: [row[1], row[3]],
        }
    }
}

/// Both stores, shared between the acquisition thread and readers.
#[derive(Debug)]
pub struct Stores {
    /// Long-horizon history
    pub history: HistoryStore,
    /// Short XY trace
    pub xy: XyStore,
}

impl Stores {
    /// Size both stores from the history horizons in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            history: HistoryStore::new(settings.history_capacity(), settings.tick_interval()),
            xy: XyStore::new(settings.xy_capacity()),
        }
    }

    /// Append one tick to both stores.
    pub fn append(&self, tick: &Tick) {
        self.history.append(tick);
        self.xy.append(tick);
    }

    /// Drop all rows from both stores.
    pub fn clear(&self) {
        self.history.clear();
        self.xy.clear();
    }
}
