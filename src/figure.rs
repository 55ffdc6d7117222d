//! Live figure data shared between an acquisition loop and whatever draws it.
//!
//! The loop owns a `watch::Sender<LiveFigure>` and appends points as they are
//! measured; a front end keeps the receiver and redraws on its own timer.

use serde::Serialize;
use tokio::sync::watch;

/// One plotted line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    /// Legend label
    pub label: String,
    /// `[x, y]` pairs in acquisition order
    pub points: Vec<[f64; 2]>,
}

/// Everything needed to redraw the plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveFigure {
    /// Window / plot title
    pub title: String,
    /// X axis label
    pub x_label: String,
    /// Y axis label
    pub y_label: String,
    /// One series per loop (scan) or a single series (temperature log)
    pub series: Vec<Series>,
}

impl LiveFigure {
    /// Empty figure with the given axis labels.
    pub fn new(title: &str, x_label: &str, y_label: &str) -> Self {
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            series: Vec::new(),
        }
    }

    /// Figure for a delay scan.
    pub fn delay_scan() -> Self {
        Self::new("Delay scan", "Time (ps)", "Amp (V)")
    }

    /// Figure for a temperature log.
    pub fn temperature_log(y_label: &str) -> Self {
        Self::new("Temperature log", "Time (s)", y_label)
    }

    /// Start a new, empty series and return its index.
    pub fn add_series(&mut self, label: impl Into<String>) -> usize {
        self.series.push(Series {
            label: label.into(),
            points: Vec::new(),
        });
        self.series.len() - 1
    }

    /// Append a point to series `index`; unknown indices are ignored.
    pub fn push(&mut self, index: usize, x: f64, y: f64) {
        if let Some(series) = self.series.get_mut(index) {
            series.points.push([x, y]);
        }
    }

    /// Total number of points over all series.
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }
}

/// Create a figure channel seeded with `figure`.
pub fn channel(figure: LiveFigure) -> (watch::Sender<LiveFigure>, watch::Receiver<LiveFigure>) {
    watch::channel(figure)
}
