//! Time functions
//!
//! A [`TimeFunction`] maps an array of time points to one row per output
//! channel. Time functions combine with other time functions, scalars and
//! per-channel vectors through multiplication, addition, subtraction and
//! zero-safe division. Combination is lazy: the result is a new time
//! function that evaluates its operands on demand, so expression trees of
//! any depth can be built before evaluating once at the root.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayD, ArrayView1, AsArray, Axis, Ix1, Zip};
use tracing::{debug, trace};

use crate::numeric::{recip0, squeeze};
use crate::window::Window;
use crate::{Result, TimeFnError};

/// Single-channel evaluation rule: time axis to one value per time point.
///
/// A rule may also return a length-1 array, which is broadcast across the
/// whole time axis.
pub type ChannelFn = Arc<dyn Fn(ArrayView1<'_, f64>) -> Array1<f64> + Send + Sync>;

/// Multi-channel evaluation rule: time axis to a `(channels, samples)` array.
pub type MultiChannelFn = Arc<dyn Fn(ArrayView1<'_, f64>) -> Array2<f64> + Send + Sync>;

/// Wrap an array-valued closure as a channel.
pub fn channel<F>(f: F) -> ChannelFn
where
    F: Fn(ArrayView1<'_, f64>) -> Array1<f64> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Lift a scalar function of time to a channel evaluated pointwise.
pub fn pointwise<F>(f: F) -> ChannelFn
where
    F: Fn(f64) -> f64 + Send + Sync + 'static,
{
    channel(move |time| time.mapv(|t| f(t)))
}

/// How a time function produces its channels.
#[derive(Clone)]
pub enum Rule {
    /// One function producing every channel at once.
    Single(MultiChannelFn),
    /// One function per channel, evaluated in order and stacked.
    PerChannel(Vec<ChannelFn>),
}

impl Rule {
    pub fn single<F>(f: F) -> Self
    where
        F: Fn(ArrayView1<'_, f64>) -> Array2<f64> + Send + Sync + 'static,
    {
        Rule::Single(Arc::new(f))
    }

    /// Single-output rule from one channel function.
    pub fn from_channel(f: ChannelFn) -> Self {
        Rule::single(move |time| {
            let mut out = Array2::zeros((1, time.len()));
            out.row_mut(0).assign(&f(time));
            out
        })
    }

    fn apply(&self, time: ArrayView1<'_, f64>, output_count: usize) -> Array2<f64> {
        match self {
            Rule::Single(f) => {
                let out = f(time);
                assert_eq!(
                    out.dim(),
                    (output_count, time.len()),
                    "evaluation rule returned the wrong shape"
                );
                out
            }
            Rule::PerChannel(fns) => {
                let mut out = Array2::zeros((fns.len(), time.len()));
                for (index, (mut row, f)) in out.outer_iter_mut().zip(fns).enumerate() {
                    let values = f(time);
                    assert!(
                        values.len() == 1 || values.len() == time.len(),
                        "channel {index} returned {} values for {} time points",
                        values.len(),
                        time.len()
                    );
                    row.assign(&values);
                }
                out
            }
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Single(_) => f.write_str("Single"),
            Rule::PerChannel(fns) => write!(f, "PerChannel({})", fns.len()),
        }
    }
}

struct Node {
    output_count: usize,
    rule: Rule,
    window: Option<Window>,
}

/// Multi-channel, windowable function of time.
///
/// Cloning is cheap and shares the underlying evaluation rule.
#[derive(Clone)]
pub struct TimeFunction {
    node: Arc<Node>,
}

impl TimeFunction {
    /// Create a time function from an explicit rule.
    ///
    /// A [`Rule::PerChannel`] must hold exactly `output_count` functions.
    pub fn new(output_count: usize, rule: Rule) -> Result<Self> {
        if output_count == 0 {
            return Err(TimeFnError::InvalidConfig(
                "a time function needs at least one output channel".to_string(),
            ));
        }
        if let Rule::PerChannel(fns) = &rule {
            if fns.len() != output_count {
                return Err(TimeFnError::ChannelMismatch {
                    expected: output_count,
                    got: fns.len(),
                });
            }
        }
        Ok(Self::from_parts(output_count, rule, None))
    }

    /// One channel per function, in order.
    pub fn from_channels(fns: Vec<ChannelFn>) -> Result<Self> {
        Self::new(fns.len(), Rule::PerChannel(fns))
    }

    pub(crate) fn from_parts(output_count: usize, rule: Rule, window: Option<Window>) -> Self {
        Self {
            node: Arc::new(Node {
                output_count,
                rule,
                window,
            }),
        }
    }

    /// Number of output channels.
    pub fn output_count(&self) -> usize {
        self.node.output_count
    }

    pub fn rule(&self) -> &Rule {
        &self.node.rule
    }

    pub fn is_windowed(&self) -> bool {
        self.node.window.is_some()
    }

    pub fn window(&self) -> Option<Window> {
        self.node.window
    }

    /// Same rule, masked to zero outside `(start, end]`.
    pub fn with_window(&self, start: f64, end: f64) -> Self {
        Self::from_parts(
            self.output_count(),
            self.rule().clone(),
            Some(Window::new(start, end)),
        )
    }

    /// Same rule, without a window.
    pub fn without_window(&self) -> Self {
        Self::from_parts(self.output_count(), self.rule().clone(), None)
    }

    /// Evaluate at every time point.
    ///
    /// Returns an array of shape `(output_count, time.len())`.
    pub fn evaluate<'a, T>(&self, time: T) -> Array2<f64>
    where
        T: AsArray<'a, f64>,
    {
        let time: ArrayView1<'a, f64> = time.into();
        trace!(
            output_count = self.output_count(),
            samples = time.len(),
            "evaluating time function"
        );

        let mut columns = self.node.rule.apply(time, self.output_count());
        if let Some(window) = &self.node.window {
            window.apply(&mut columns, time);
        }
        columns
    }

    /// Evaluate and drop every length-1 axis.
    ///
    /// A single-channel function yields a 1-D array over time, and a single
    /// time point yields one value per channel.
    pub fn evaluate_squeezed<'a, T>(&self, time: T) -> ArrayD<f64>
    where
        T: AsArray<'a, f64>,
    {
        squeeze(self.evaluate(time))
    }

    /// Evaluate at one time point, one value per channel.
    pub fn evaluate_at(&self, t: f64) -> Array1<f64> {
        let time = [t];
        self.evaluate(&time[..]).column(0).to_owned()
    }

    /// Project onto channel `index`.
    ///
    /// The selection evaluates this function on every call, so it reflects
    /// whatever this function computes, including live event trains.
    pub fn channel_select(&self, index: usize) -> Result<TimeFunction> {
        if index >= self.output_count() {
            return Err(TimeFnError::ChannelOutOfRange {
                index,
                channels: self.output_count(),
            });
        }

        let parent = self.clone();
        let rule = Rule::single(move |time| parent.evaluate(time).select(Axis(0), &[index]));
        Ok(Self::from_parts(1, rule, None))
    }

    pub fn try_mul(&self, other: impl Into<Operand>) -> Result<TimeFunction> {
        self.combine(other.into(), BinaryOp::Mul)
    }

    pub fn try_add(&self, other: impl Into<Operand>) -> Result<TimeFunction> {
        self.combine(other.into(), BinaryOp::Add)
    }

    pub fn try_sub(&self, other: impl Into<Operand>) -> Result<TimeFunction> {
        self.combine(other.into(), BinaryOp::Sub)
    }

    /// Zero-safe division: points where the divisor is exactly zero yield zero.
    pub fn try_div(&self, other: impl Into<Operand>) -> Result<TimeFunction> {
        self.combine(other.into(), BinaryOp::Div)
    }

    fn combine(&self, other: Operand, op: BinaryOp) -> Result<TimeFunction> {
        let output_count = self.output_count();

        match other.resolve()? {
            Resolved::Function(rhs) => {
                if rhs.output_count() != output_count {
                    return Err(TimeFnError::ChannelMismatch {
                        expected: output_count,
                        got: rhs.output_count(),
                    });
                }
                debug!(
                    output_count,
                    op = op.as_str(),
                    operand = "function",
                    "combining time functions"
                );

                let lhs = self.clone();
                let rule = Rule::single(move |time| {
                    let mut out = lhs.evaluate(time);
                    let other = rhs.evaluate(time);
                    Zip::from(&mut out)
                        .and(&other)
                        .for_each(|a, &b| *a = op.apply(*a, b));
                    out
                });
                Ok(Self::from_parts(output_count, rule, None))
            }
            Resolved::Scalar(value) => Ok(self.combine_scalar(value, op)),
            Resolved::Vector(values) => {
                if values.len() != output_count {
                    return Err(TimeFnError::ChannelMismatch {
                        expected: output_count,
                        got: values.len(),
                    });
                }
                debug!(
                    output_count,
                    op = op.as_str(),
                    operand = "vector",
                    "combining time functions"
                );

                let lhs = self.clone();
                let rule = Rule::single(move |time| {
                    let mut out = lhs.evaluate(time);
                    for (mut row, &value) in out.outer_iter_mut().zip(values.iter()) {
                        row.mapv_inplace(|a| op.apply(a, value));
                    }
                    out
                });
                Ok(Self::from_parts(output_count, rule, None))
            }
        }
    }

    fn combine_scalar(&self, value: f64, op: BinaryOp) -> TimeFunction {
        debug!(
            output_count = self.output_count(),
            op = op.as_str(),
            operand = "scalar",
            "combining time functions"
        );

        let lhs = self.clone();
        let rule = Rule::single(move |time| lhs.evaluate(time).mapv_into(|a| op.apply(a, value)));
        Self::from_parts(self.output_count(), rule, None)
    }
}

impl fmt::Debug for TimeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeFunction")
            .field("output_count", &self.node.output_count)
            .field("rule", &self.node.rule)
            .field("window", &self.node.window)
            .finish()
    }
}

/// Source of a time function: every signal generator implements this.
pub trait Generator {
    fn time_function(&self) -> TimeFunction;
}

impl Generator for TimeFunction {
    fn time_function(&self) -> TimeFunction {
        self.clone()
    }
}

/// Elementwise combination applied by the algebra.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Add,
    Sub,
    /// `a * recip0(b)`
    Div,
}

impl BinaryOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Mul => a * b,
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Div => a * recip0(b),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Mul => "mul",
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Div => "div",
        }
    }
}

/// Right-hand side of a time function combination.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Another time function with the same channel count.
    Function(TimeFunction),
    /// One number applied to every channel.
    Scalar(f64),
    /// One number per channel.
    Vector(Array1<f64>),
    /// Array of any dimensionality; only 1-D arrays are accepted, as vectors.
    Array(ArrayD<f64>),
}

enum Resolved {
    Function(TimeFunction),
    Scalar(f64),
    Vector(Array1<f64>),
}

impl Operand {
    fn resolve(self) -> Result<Resolved> {
        match self {
            Operand::Function(f) => Ok(Resolved::Function(f)),
            Operand::Scalar(value) => Ok(Resolved::Scalar(value)),
            Operand::Vector(values) => Ok(Resolved::Vector(values)),
            Operand::Array(values) => {
                let ndim = values.ndim();
                values
                    .into_dimensionality::<Ix1>()
                    .map(Resolved::Vector)
                    .map_err(|_| {
                        TimeFnError::UnsupportedOperand(format!("{ndim}-dimensional array"))
                    })
            }
        }
    }
}

impl From<TimeFunction> for Operand {
    fn from(f: TimeFunction) -> Self {
        Operand::Function(f)
    }
}

impl From<&TimeFunction> for Operand {
    fn from(f: &TimeFunction) -> Self {
        Operand::Function(f.clone())
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

macro_rules! integer_operand {
    ($($int:ty),*) => {$(
        impl From<$int> for Operand {
            fn from(value: $int) -> Self {
                Operand::Scalar(value as f64)
            }
        }
    )*};
}

integer_operand!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<Vec<f64>> for Operand {
    fn from(values: Vec<f64>) -> Self {
        Operand::Vector(Array1::from(values))
    }
}

impl From<&[f64]> for Operand {
    fn from(values: &[f64]) -> Self {
        Operand::Vector(Array1::from(values.to_vec()))
    }
}

impl<const N: usize> From<[f64; N]> for Operand {
    fn from(values: [f64; N]) -> Self {
        Operand::Vector(Array1::from(values.to_vec()))
    }
}

impl From<Array1<f64>> for Operand {
    fn from(values: Array1<f64>) -> Self {
        Operand::Vector(values)
    }
}

impl From<ArrayD<f64>> for Operand {
    fn from(values: ArrayD<f64>) -> Self {
        Operand::Array(values)
    }
}

macro_rules! scalar_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<f64> for &TimeFunction {
            type Output = TimeFunction;

            fn $method(self, rhs: f64) -> TimeFunction {
                self.combine_scalar(rhs, $op)
            }
        }

        impl $trait<f64> for TimeFunction {
            type Output = TimeFunction;

            fn $method(self, rhs: f64) -> TimeFunction {
                self.combine_scalar(rhs, $op)
            }
        }
    };
}

scalar_op!(Mul, mul, BinaryOp::Mul);
scalar_op!(Add, add, BinaryOp::Add);
scalar_op!(Sub, sub, BinaryOp::Sub);
scalar_op!(Div, div, BinaryOp::Div);

impl Neg for &TimeFunction {
    type Output = TimeFunction;

    fn neg(self) -> TimeFunction {
        self.combine_scalar(-1.0, BinaryOp::Mul)
    }
}

impl Neg for TimeFunction {
    type Output = TimeFunction;

    fn neg(self) -> TimeFunction {
        -&self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, ArrayD, IxDyn};

    fn ramp() -> TimeFunction {
        TimeFunction::new(1, Rule::from_channel(pointwise(|t| t))).unwrap()
    }

    fn two_channels() -> TimeFunction {
        TimeFunction::from_channels(vec![pointwise(|t| t), pointwise(|t| 2.0 * t + 1.0)]).unwrap()
    }

    #[test]
    fn test_evaluate_shape() {
        let time = array![0.0, 1.0, 2.0];
        assert_eq!(ramp().evaluate(&time).dim(), (1, 3));
        assert_eq!(two_channels().evaluate(&time).dim(), (2, 3));
        assert_eq!(two_channels().evaluate_squeezed(&time).shape(), &[2, 3]);
        assert_eq!(ramp().evaluate_squeezed(&time).shape(), &[3]);
    }

    #[test]
    fn test_single_and_per_channel_rules_agree() {
        let single = TimeFunction::new(
            2,
            Rule::single(|time| {
                let mut out = Array2::zeros((2, time.len()));
                out.row_mut(0).assign(&time);
                out.row_mut(1).assign(&time.mapv(|t| 2.0 * t + 1.0));
                out
            }),
        )
        .unwrap();
        let time = array![0.5, 1.5, 4.0];
        assert_eq!(single.evaluate(&time), two_channels().evaluate(&time));
    }

    #[test]
    fn test_per_channel_rule_count_must_match() {
        let err = TimeFunction::new(3, Rule::PerChannel(vec![pointwise(|t| t)])).unwrap_err();
        assert_eq!(err, TimeFnError::ChannelMismatch { expected: 3, got: 1 });
        assert!(TimeFunction::from_channels(Vec::new()).is_err());
    }

    #[test]
    fn test_scalar_channel_broadcasts() {
        let constant = TimeFunction::from_channels(vec![
            channel(|_| array![7.0]),
            pointwise(|t| t),
        ])
        .unwrap();
        let out = constant.evaluate(&[1.0, 2.0][..]);
        assert_eq!(out.row(0), array![7.0, 7.0]);
        assert_eq!(out.row(1), array![1.0, 2.0]);
    }

    #[test]
    fn test_function_combinations() {
        let f = two_channels();
        let g = two_channels();
        let time = array![1.0, 2.0];

        let sum = f.try_add(&g).unwrap().evaluate(&time);
        assert_eq!(sum, array![[2.0, 4.0], [6.0, 10.0]]);

        let product = f.try_mul(&g).unwrap().evaluate(&time);
        assert_eq!(product, array![[1.0, 4.0], [9.0, 25.0]]);

        let difference = f.try_sub(&g).unwrap().evaluate(&time);
        assert_eq!(difference, Array2::<f64>::zeros((2, 2)));

        let ratio = f.try_div(&g).unwrap().evaluate(&time);
        assert!(ratio.iter().all(|v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_division_by_zero_function_yields_zero() {
        let ratio = ramp().try_div(ramp()).unwrap();
        let out = ratio.evaluate(&[0.0, 2.0][..]);
        assert_eq!(out, array![[0.0, 1.0]]);
    }

    #[test]
    fn test_scalar_combinations() {
        let f = two_channels();
        let time = array![1.0, 2.0];
        assert_eq!((&f * 2.0).evaluate(&time), array![[2.0, 4.0], [6.0, 10.0]]);
        assert_eq!((&f + 1.0).evaluate(&time), array![[2.0, 3.0], [4.0, 6.0]]);
        assert_eq!((&f - 1.0).evaluate(&time), array![[0.0, 1.0], [2.0, 4.0]]);
        assert_eq!((&f / 2.0).evaluate(&time), array![[0.5, 1.0], [1.5, 2.5]]);
        assert_eq!((&f / 0.0).evaluate(&time), Array2::<f64>::zeros((2, 2)));
        assert_eq!((-&f).evaluate(&time), array![[-1.0, -2.0], [-3.0, -5.0]]);
        assert_eq!(f.try_mul(3).unwrap().evaluate(&time), array![[3.0, 6.0], [9.0, 15.0]]);
    }

    #[test]
    fn test_integer_scalars_of_any_width() {
        let f = two_channels();
        let time = array![1.0, 2.0];
        let expected = array![[2.0, 4.0], [6.0, 10.0]];
        assert_eq!(f.try_mul(2i64).unwrap().evaluate(&time), expected);
        assert_eq!(f.try_mul(2usize).unwrap().evaluate(&time), expected);
        assert_eq!(f.try_add(-1i8).unwrap().evaluate(&time), array![[0.0, 1.0], [2.0, 4.0]]);
        assert_eq!(f.try_div(0u32).unwrap().evaluate(&time), Array2::<f64>::zeros((2, 2)));
    }

    #[test]
    #[should_panic(expected = "channel 1 returned 2 values for 3 time points")]
    fn test_per_channel_wrong_length_reports_channel() {
        let f = TimeFunction::new(
            2,
            Rule::PerChannel(vec![
                pointwise(|t| t),
                channel(|_| Array1::from(vec![1.0, 2.0])),
            ]),
        )
        .unwrap();
        let _ = f.evaluate(&[0.0, 1.0, 2.0][..]);
    }

    #[test]
    fn test_vector_combinations_apply_per_channel() {
        let f = two_channels();
        let time = array![1.0, 2.0];

        let scaled = f.try_mul([10.0, 100.0]).unwrap().evaluate(&time);
        assert_eq!(scaled, array![[10.0, 20.0], [300.0, 500.0]]);

        let shifted = f.try_add(vec![1.0, -1.0]).unwrap().evaluate(&time);
        assert_eq!(shifted, array![[2.0, 3.0], [2.0, 4.0]]);

        let divided = f.try_div(array![0.0, 2.0]).unwrap().evaluate(&time);
        assert_eq!(divided, array![[0.0, 0.0], [1.5, 2.5]]);
    }

    #[test]
    fn test_shape_mismatch_fails_eagerly() {
        let f = two_channels();
        assert_eq!(
            f.try_mul([1.0, 2.0, 3.0]).unwrap_err(),
            TimeFnError::ChannelMismatch { expected: 2, got: 3 }
        );
        assert_eq!(
            f.try_add(ramp()).unwrap_err(),
            TimeFnError::ChannelMismatch { expected: 2, got: 1 }
        );
    }

    #[test]
    fn test_dynamic_arrays() {
        let f = two_channels();
        let vector = ArrayD::from_shape_vec(IxDyn(&[2]), vec![2.0, 3.0]).unwrap();
        let out = f.try_mul(vector).unwrap().evaluate(&[1.0][..]);
        assert_eq!(out, array![[2.0], [9.0]]);

        let matrix = ArrayD::<f64>::zeros(IxDyn(&[2, 2]));
        assert!(matches!(
            f.try_mul(matrix),
            Err(TimeFnError::UnsupportedOperand(_))
        ));
    }

    #[test]
    fn test_window_masks_output() {
        let windowed = ramp().with_window(2.0, 5.0);
        assert!(windowed.is_windowed());
        let out = windowed.evaluate(&[1.0, 2.0, 3.0, 5.0, 6.0][..]);
        assert_eq!(out, array![[0.0, 0.0, 3.0, 5.0, 0.0]]);
        assert!(!windowed.without_window().is_windowed());
    }

    #[test]
    fn test_channel_select() {
        let f = two_channels();
        let time = array![0.0, 1.5, 3.0];
        let full = f.evaluate(&time);
        for index in 0..2 {
            let selected = f.channel_select(index).unwrap();
            assert_eq!(selected.output_count(), 1);
            assert_eq!(selected.evaluate(&time).row(0), full.row(index));
        }
        assert_eq!(
            f.channel_select(2).unwrap_err(),
            TimeFnError::ChannelOutOfRange { index: 2, channels: 2 }
        );
    }

    #[test]
    fn test_channel_select_of_combination() {
        let combined = two_channels().try_mul([2.0, 0.5]).unwrap();
        let second = combined.channel_select(1).unwrap();
        assert_abs_diff_eq!(second.evaluate_at(2.0)[0], 2.5);
    }

    #[test]
    fn test_deep_expression_tree() {
        let mut expr = ramp();
        for _ in 0..50 {
            expr = expr.try_add(ramp()).unwrap();
        }
        assert_abs_diff_eq!(expr.evaluate_at(2.0)[0], 102.0);
    }
}
