//! Half-open time windows

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Time window `(start, end]` outside of which output is masked to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// `start < t <= end`
    pub fn contains(&self, t: f64) -> bool {
        t > self.start && t <= self.end
    }

    /// Indicator `1[start < t <= end]`.
    pub fn mask(&self, t: f64) -> f64 {
        if self.contains(t) {
            1.0
        } else {
            0.0
        }
    }

    /// Width of the window.
    pub fn range(&self) -> f64 {
        self.end - self.start
    }

    /// Multiply every channel of `columns` by the indicator evaluated at `time`.
    pub fn apply(&self, columns: &mut Array2<f64>, time: ArrayView1<'_, f64>) {
        let mask = time.mapv(|t| self.mask(t));
        for mut channel in columns.axis_iter_mut(Axis(0)) {
            channel *= &mask;
        }
    }
}
