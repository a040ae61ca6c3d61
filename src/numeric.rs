//! Numeric building blocks
//!
//! Zero-safe reciprocal, shape squeezing, linear interpolation and step
//! functions shared by the time function generators.

use ndarray::{Array1, Array2, ArrayD, ArrayView1, Axis};

use crate::{Result, TimeFnError};

/// Reciprocal that maps zero to zero instead of infinity.
pub fn recip0(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        1.0 / x
    }
}

/// Drop every length-1 axis of a `(channels, samples)` result.
pub fn squeeze(values: Array2<f64>) -> ArrayD<f64> {
    let mut out = values.into_dyn();
    for axis in (0..out.ndim()).rev() {
        if out.shape()[axis] == 1 {
            out = out.index_axis_move(Axis(axis), 0);
        }
    }
    out
}

/// Indices that sort `xs` ascending. Ties keep their input order.
pub fn stable_argsort(xs: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..xs.len()).collect();
    order.sort_by(|&a, &b| xs[a].total_cmp(&xs[b]));
    order
}

/// Gather `xs` in the order given by `order`.
pub fn permute(xs: &[f64], order: &[usize]) -> Vec<f64> {
    order.iter().map(|&idx| xs[idx]).collect()
}

/// Piecewise-linear interpolant over sampled points.
///
/// Queries outside `[xs[0], xs[n - 1]]` (and NaN queries) resolve to
/// `fill_value` instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolant {
    xs: Vec<f64>,
    ys: Vec<f64>,
    fill_value: f64,
}

impl Interpolant {
    /// Build an interpolant from unsorted samples.
    pub fn new(xs: &[f64], ys: &[f64], fill_value: f64) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(TimeFnError::LengthMismatch {
                context: "interpolant samples",
                expected: xs.len(),
                got: ys.len(),
            });
        }
        if xs.len() < 2 {
            return Err(TimeFnError::InvalidConfig(
                "interpolation needs at least two samples".to_string(),
            ));
        }
        if xs.iter().any(|x| !x.is_finite()) {
            return Err(TimeFnError::InvalidConfig(
                "interpolation sample times must be finite".to_string(),
            ));
        }

        let order = stable_argsort(xs);
        Ok(Self {
            xs: permute(xs, &order),
            ys: permute(ys, &order),
            fill_value,
        })
    }

    /// Value returned for queries outside the sampled range.
    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = fill_value;
        self
    }

    /// Sample times, ascending.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }

    /// Evaluate at a single point.
    pub fn eval(&self, x: f64) -> f64 {
        let last = self.xs.len() - 1;
        if x.is_nan() || x < self.xs[0] || x > self.xs[last] {
            return self.fill_value;
        }

        let idx = self.xs.partition_point(|&v| v < x);
        if self.xs[idx] == x {
            return self.ys[idx];
        }

        // xs[idx - 1] < x < xs[idx]
        let (x0, x1) = (self.xs[idx - 1], self.xs[idx]);
        let (y0, y1) = (self.ys[idx - 1], self.ys[idx]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }

    /// Evaluate elementwise over a time axis.
    pub fn eval_array(&self, time: ArrayView1<'_, f64>) -> Array1<f64> {
        time.mapv(|t| self.eval(t))
    }
}

/// Which side of a breakpoint takes the new level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuity {
    /// A breakpoint begins its level: `f(b_k) = v_k`.
    #[default]
    Right,
    /// The level changes just after the breakpoint: `f(b_k) = v_{k-1}`.
    Left,
}

/// Step function over ascending breakpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFunction {
    breakpoints: Vec<f64>,
    values: Vec<f64>,
    initial: f64,
    continuity: Continuity,
}

impl StepFunction {
    /// Build a step function, sorting the breakpoints stably and permuting
    /// the values with them. The level before the first breakpoint is 0.
    pub fn new(breakpoints: &[f64], values: &[f64], continuity: Continuity) -> Result<Self> {
        if breakpoints.len() != values.len() {
            return Err(TimeFnError::LengthMismatch {
                context: "step function levels",
                expected: breakpoints.len(),
                got: values.len(),
            });
        }

        let order = stable_argsort(breakpoints);
        Ok(Self {
            breakpoints: permute(breakpoints, &order),
            values: permute(values, &order),
            initial: 0.0,
            continuity,
        })
    }

    /// Build from breakpoints already sorted ascending, with values aligned.
    pub(crate) fn from_sorted(
        breakpoints: Vec<f64>,
        values: Vec<f64>,
        continuity: Continuity,
    ) -> Self {
        debug_assert_eq!(breakpoints.len(), values.len());
        Self {
            breakpoints,
            values,
            initial: 0.0,
            continuity,
        }
    }

    /// Level held before the first breakpoint.
    pub fn with_initial(mut self, initial: f64) -> Self {
        self.initial = initial;
        self
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn continuity(&self) -> Continuity {
        self.continuity
    }

    /// Evaluate at a single point.
    pub fn eval(&self, t: f64) -> f64 {
        let passed = match self.continuity {
            Continuity::Right => self.breakpoints.partition_point(|&b| b <= t),
            Continuity::Left => self.breakpoints.partition_point(|&b| b < t),
        };
        if passed == 0 {
            self.initial
        } else {
            self.values[passed - 1]
        }
    }

    /// Evaluate elementwise over a time axis.
    pub fn eval_array(&self, time: ArrayView1<'_, f64>) -> Array1<f64> {
        time.mapv(|t| self.eval(t))
    }
}
