//! Fixed-capacity rolling history of metric values for charting.
//!
//! The buffers provide no locking of their own; when a renderer reads from a
//! different thread than the feeder writes, the caller wraps them in a lock.

use std::collections::BTreeMap;
use std::fmt;

use crate::{Metric, TelemetrySnapshot};

/// Default number of samples kept per metric.
pub const DEFAULT_CAPACITY: usize = 101;

type UpdatedListener = Box<dyn FnMut(f32) + Send>;

/// Circular buffer of the most recent `capacity` values.
///
/// The buffer is pre-filled with zeros, so its length is always its capacity
/// and logical index 0 is always the oldest value held.
pub struct RollingHistory {
    values: Vec<f32>,
    /// Physical slot of the oldest value.
    head: usize,
    written: bool,
    on_updated: Option<UpdatedListener>,
}

impl RollingHistory {
    /// Creates a history holding `capacity` values (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![0.0; capacity.max(1)],
            head: 0,
            written: false,
            on_updated: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Always equal to the capacity.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Appends a value, evicting the oldest, and notifies the listener.
    pub fn add(&mut self, value: f32) {
        self.values[self.head] = value;
        self.head = (self.head + 1) % self.values.len();
        self.written = true;
        if let Some(listener) = self.on_updated.as_mut() {
            listener(value);
        }
    }

    /// Value at logical position `index`, 0 being the oldest.
    ///
    /// Returns `None` only when `index` is outside `[0, capacity)`.
    pub fn get(&self, index: usize) -> Option<f32> {
        if index >= self.values.len() {
            return None;
        }
        Some(self.values[(self.head + index) % self.values.len()])
    }

    /// Most recently added value, or 0 if nothing was added yet.
    pub fn last(&self) -> f32 {
        if !self.written {
            return 0.0;
        }
        let len = self.values.len();
        self.values[(self.head + len - 1) % len]
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let (newer, older) = self.values.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    /// Registers the listener called after every [`add`](Self::add),
    /// replacing any previous one.
    pub fn on_updated<F>(&mut self, listener: F)
    where
        F: FnMut(f32) + Send + 'static,
    {
        self.on_updated = Some(Box::new(listener));
    }

    /// Maps a horizontal position over a chart `width` units wide to the
    /// logical index drawn there.
    pub fn index_at(&self, x: f32, width: f32) -> Option<usize> {
        if width <= 0.0 || x < 0.0 || x >= width {
            return None;
        }
        let index = (x / width * self.values.len() as f32) as usize;
        (index < self.values.len()).then_some(index)
    }
}

impl Default for RollingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Clone for RollingHistory {
    /// Clones the values; the listener stays with the original.
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            head: self.head,
            written: self.written,
            on_updated: None,
        }
    }
}

impl fmt::Debug for RollingHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingHistory")
            .field("capacity", &self.capacity())
            .field("last", &self.last())
            .field("listener", &self.on_updated.is_some())
            .finish()
    }
}

/// One rolling history per metric.
#[derive(Debug, Clone)]
pub struct MetricHistory {
    capacity: usize,
    series: BTreeMap<Metric, RollingHistory>,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        let series = Metric::ALL
            .into_iter()
            .map(|m| (m, RollingHistory::new(capacity)))
            .collect();
        Self {
            capacity: capacity.max(1),
            series,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Adds every field of the snapshot to its series.
    pub fn record(&mut self, snapshot: &TelemetrySnapshot) {
        for (metric, history) in &mut self.series {
            history.add(metric.value(snapshot));
        }
    }

    pub fn series(&self, metric: Metric) -> &RollingHistory {
        // every metric is inserted at construction
        &self.series[&metric]
    }

    pub fn series_mut(&mut self, metric: Metric) -> &mut RollingHistory {
        self.series
            .entry(metric)
            .or_insert_with(|| RollingHistory::new(self.capacity))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &RollingHistory)> {
        self.series.iter().map(|(m, h)| (*m, h))
    }
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
