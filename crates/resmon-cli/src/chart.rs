//! Sparkline rendering of rolling metric history.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use resmon_client::{Metric, MetricHistory, RollingHistory, TelemetrySnapshot};

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Rolling history of the charted metrics plus the redraw state.
pub struct Chart {
    history: MetricHistory,
    metrics: Vec<Metric>,
    width: usize,
    inspect: Option<usize>,
    dirty: Arc<AtomicBool>,
}

impl Chart {
    /// Charts `metrics` (all of them if empty) over `capacity` samples.
    pub fn new(metrics: Vec<Metric>, capacity: usize, width: usize) -> Self {
        let metrics = if metrics.is_empty() {
            Metric::ALL.to_vec()
        } else {
            metrics
        };

        let mut history = MetricHistory::new(capacity);
        let dirty = Arc::new(AtomicBool::new(true));
        for metric in &metrics {
            let dirty = dirty.clone();
            history
                .series_mut(*metric)
                .on_updated(move |_| dirty.store(true, Ordering::Relaxed));
        }

        Self {
            history,
            metrics,
            width: width.max(1),
            inspect: None,
            dirty,
        }
    }

    /// Also shows the value at this logical index under each row.
    pub fn inspect(mut self, index: Option<usize>) -> Self {
        self.inspect = index;
        self
    }

    pub fn record(&mut self, snapshot: &TelemetrySnapshot) {
        self.history.record(snapshot);
    }

    /// Returns whether anything changed since the last call.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for metric in &self.metrics {
            let series = self.history.series(*metric);
            let _ = writeln!(
                out,
                "{:<16} {} {:>6.1}{}",
                metric.label(),
                sparkline(series, *metric, self.width),
                series.last(),
                metric.unit()
            );
            if let Some(index) = self.inspect {
                match series.get(index) {
                    Some(value) => {
                        let _ = writeln!(out, "{:<16} [{}] {:.1}{}", "", index, value, metric.unit());
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "{:<16} [{}] out of range (0..{})",
                            "",
                            index,
                            series.capacity()
                        );
                    }
                }
            }
        }
        out
    }
}

/// Draws `width` columns, each showing the sample under that column.
fn sparkline(series: &RollingHistory, metric: Metric, width: usize) -> String {
    (0..width)
        .map(|column| {
            let value = series
                .index_at(column as f32 + 0.5, width as f32)
                .and_then(|index| series.get(index))
                .unwrap_or(0.0);
            bar(value, metric.max_value())
        })
        .collect()
}

fn bar(value: f32, max: f32) -> char {
    let level = (value / max).clamp(0.0, 1.0) * (BARS.len() - 1) as f32;
    BARS[level.round() as usize]
}
