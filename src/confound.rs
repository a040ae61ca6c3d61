//! Confound generators
//!
//! Nuisance regressors: confounds interpolated from sampled data, confounds
//! wrapping caller-supplied functions, and the polynomial plus truncated
//! cubic spline drift basis.

use ndarray::ArrayView2;
use tracing::debug;

use crate::config::{SampleValues, SplineConfoundConfig};
use crate::function::{channel, pointwise, ChannelFn, Generator, Rule, TimeFunction};
use crate::numeric::Interpolant;
use crate::window::Window;
use crate::{Result, TimeFnError};

/// Piecewise-linear confound built from sampled values.
///
/// Outside the sampled time range every channel evaluates to the fill value,
/// NaN unless overridden with [`InterpolatedConfound::with_fill_value`].
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedConfound {
    channels: Vec<Interpolant>,
}

impl InterpolatedConfound {
    /// One channel sampled at `times`.
    pub fn single(times: &[f64], values: &[f64]) -> Result<Self> {
        let interpolant = Interpolant::new(times, values, f64::NAN)?;
        debug!(samples = times.len(), output_count = 1, "built interpolated confound");
        Ok(Self {
            channels: vec![interpolant],
        })
    }

    /// One channel per column of `values`; rows are samples aligned with `times`.
    pub fn multi(times: &[f64], values: ArrayView2<'_, f64>) -> Result<Self> {
        if values.nrows() != times.len() {
            return Err(TimeFnError::LengthMismatch {
                context: "interpolated confound samples",
                expected: times.len(),
                got: values.nrows(),
            });
        }
        if values.ncols() == 0 {
            return Err(TimeFnError::InvalidConfig(
                "interpolated confound needs at least one channel".to_string(),
            ));
        }

        let channels = values
            .columns()
            .into_iter()
            .map(|column| Interpolant::new(times, &column.to_vec(), f64::NAN))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            samples = times.len(),
            output_count = channels.len(),
            "built interpolated confound"
        );
        Ok(Self { channels })
    }

    /// Build from configured samples, where every row must have the same width.
    pub fn from_samples(times: &[f64], values: &SampleValues) -> Result<Self> {
        match values {
            SampleValues::Single(values) => Self::single(times, values),
            SampleValues::Multi(rows) => {
                let width = rows.first().map_or(0, Vec::len);
                if let Some(row) = rows.iter().find(|row| row.len() != width) {
                    return Err(TimeFnError::LengthMismatch {
                        context: "interpolated confound row",
                        expected: width,
                        got: row.len(),
                    });
                }

                let flat: Vec<f64> = rows.iter().flatten().copied().collect();
                let values = ArrayView2::from_shape((rows.len(), width), &flat).map_err(|e| {
                    TimeFnError::InvalidConfig(format!("interpolated confound samples: {e}"))
                })?;
                Self::multi(times, values)
            }
        }
    }

    /// Value for queries outside the sampled range, on every channel.
    pub fn with_fill_value(self, fill_value: f64) -> Self {
        Self {
            channels: self
                .channels
                .into_iter()
                .map(|interpolant| interpolant.with_fill_value(fill_value))
                .collect(),
        }
    }

    pub fn output_count(&self) -> usize {
        self.channels.len()
    }
}

impl Generator for InterpolatedConfound {
    fn time_function(&self) -> TimeFunction {
        let fns: Vec<ChannelFn> = self
            .channels
            .iter()
            .cloned()
            .map(|interpolant| channel(move |time| interpolant.eval_array(time)))
            .collect();
        FunctionConfound { fns }.time_function()
    }
}

/// Confound wrapping caller-supplied channel functions, in order.
#[derive(Clone)]
pub struct FunctionConfound {
    fns: Vec<ChannelFn>,
}

impl FunctionConfound {
    pub fn new(fns: Vec<ChannelFn>) -> Result<Self> {
        if fns.is_empty() {
            return Err(TimeFnError::InvalidConfig(
                "function confound needs at least one function".to_string(),
            ));
        }
        Ok(Self { fns })
    }

    /// Channels from scalar functions of time.
    pub fn from_scalar_fns<F>(fns: Vec<F>) -> Result<Self>
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::new(fns.into_iter().map(pointwise).collect())
    }

    pub fn output_count(&self) -> usize {
        self.fns.len()
    }
}

impl Generator for FunctionConfound {
    fn time_function(&self) -> TimeFunction {
        // A lone function is the rule itself rather than a list of one.
        let rule = match self.fns.as_slice() {
            [only] => Rule::from_channel(only.clone()),
            fns => Rule::PerChannel(fns.to_vec()),
        };
        TimeFunction::from_parts(self.fns.len(), rule, None)
    }
}

/// Drift basis with `df` channels: monomials `t^0 .. t^3`, then `t^3`
/// restricted to each consecutive knot interval `(k_i, k_{i+1}]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineConfound {
    df: usize,
    window: Window,
    knots: Vec<f64>,
}

impl SplineConfound {
    pub fn new(config: SplineConfoundConfig) -> Result<Self> {
        config.validate()?;

        let SplineConfoundConfig { df, window, knots } = config;
        let mut knots = if knots.is_empty() && df >= 4 {
            let pieces = (df - 3) as f64;
            (1..=df - 3)
                .map(|i| window.range() * i as f64 / pieces + window.start)
                .collect()
        } else {
            knots
        };
        if let Some(last) = knots.last_mut() {
            *last = f64::INFINITY;
        }

        debug!(df, knots = knots.len(), "built spline confound");
        Ok(Self { df, window, knots })
    }

    pub fn df(&self) -> usize {
        self.df
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Knot sequence; the last knot is always `+inf`.
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn output_count(&self) -> usize {
        self.df
    }
}

impl Generator for SplineConfound {
    fn time_function(&self) -> TimeFunction {
        let mut fns: Vec<ChannelFn> = (0..self.df.min(4) as i32)
            .map(|power| pointwise(move |t| t.powi(power)))
            .collect();

        for pair in self.knots.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            fns.push(pointwise(move |t| {
                if t > lo && t <= hi {
                    t.powi(3)
                } else {
                    0.0
                }
            }));
        }

        TimeFunction::from_parts(self.df, Rule::PerChannel(fns), None)
    }
}
