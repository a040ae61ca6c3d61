//! Generator configuration
//!
//! Serializable parameter sets for every signal generator, each with its
//! documented defaults and a `validate()` check, plus [`GeneratorKind`] to
//! describe a regressor declaratively and build it in one call.

use serde::{Deserialize, Serialize};

use crate::confound::{InterpolatedConfound, SplineConfound};
use crate::function::{Generator, TimeFunction};
use crate::stimulus::{DeltaFunction, Events, PeriodicStimulus};
use crate::window::Window;
use crate::{Result, TimeFnError};

fn ensure_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(TimeFnError::InvalidConfig(format!("{name} must be finite")))
    }
}

/// Train of `n` identical pulses starting every `step` time units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicStimulusConfig {
    /// Number of pulses
    pub n: usize,
    /// Onset of the first pulse
    pub start: f64,
    /// Width of each pulse
    pub duration: f64,
    /// Onset-to-onset spacing
    pub step: f64,
    /// Level during a pulse
    pub height: f64,
}

impl Default for PeriodicStimulusConfig {
    fn default() -> Self {
        Self {
            n: 1,
            start: 0.0,
            duration: 3.0,
            step: 6.0,
            height: 1.0,
        }
    }
}

impl PeriodicStimulusConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_finite("start", self.start)?;
        ensure_finite("duration", self.duration)?;
        ensure_finite("step", self.step)?;
        ensure_finite("height", self.height)?;

        if self.duration < 0.0 {
            return Err(TimeFnError::InvalidConfig(
                "duration must be non-negative".to_string(),
            ));
        }

        if self.n > 1 && self.step < self.duration {
            return Err(TimeFnError::InvalidConfig(
                "step must be at least duration so pulses do not overlap".to_string(),
            ));
        }

        Ok(())
    }

    /// Onset of every pulse.
    pub fn onsets(&self) -> Vec<f64> {
        (0..self.n)
            .map(|i| self.step * i as f64 + self.start)
            .collect()
    }
}

/// Square approximation of a Dirac delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaFunctionConfig {
    /// Beginning of the approximation
    pub start: f64,
    /// Width of the approximation
    pub dt: f64,
}

impl Default for DeltaFunctionConfig {
    fn default() -> Self {
        Self {
            start: 0.0,
            dt: 0.02,
        }
    }
}

impl DeltaFunctionConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_finite("start", self.start)?;
        ensure_finite("dt", self.dt)?;

        if self.dt <= 0.0 {
            return Err(TimeFnError::InvalidConfig(
                "dt must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Polynomial plus truncated cubic spline drift basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplineConfoundConfig {
    /// Degrees of freedom, one output channel each
    pub df: usize,
    /// Range the computed knots are spread over
    pub window: Window,
    /// Explicit knots; computed from `window` when empty
    pub knots: Vec<f64>,
}

impl Default for SplineConfoundConfig {
    fn default() -> Self {
        Self {
            df: 4,
            window: Window::new(0.0, 0.0),
            knots: Vec::new(),
        }
    }
}

impl SplineConfoundConfig {
    pub fn validate(&self) -> Result<()> {
        if self.df == 0 {
            return Err(TimeFnError::InvalidConfig(
                "df must be greater than zero".to_string(),
            ));
        }

        ensure_finite("window start", self.window.start)?;
        ensure_finite("window end", self.window.end)?;

        if self.knots.is_empty() {
            if self.df > 4 && self.window.end <= self.window.start {
                return Err(TimeFnError::InvalidConfig(
                    "window end must exceed window start to place knots".to_string(),
                ));
            }
            return Ok(());
        }

        if self.df < 4 {
            return Err(TimeFnError::InvalidConfig(
                "explicit knots need df of at least 4".to_string(),
            ));
        }

        if self.knots.len() != self.df - 3 {
            return Err(TimeFnError::LengthMismatch {
                context: "spline knots",
                expected: self.df - 3,
                got: self.knots.len(),
            });
        }

        // The last knot is replaced by +inf, so only the leading ones matter.
        let leading = &self.knots[..self.knots.len() - 1];
        if leading.iter().any(|k| !k.is_finite()) || leading.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TimeFnError::InvalidConfig(
                "knots must be finite and strictly increasing".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_height() -> f64 {
    1.0
}

/// One on/off event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    pub start: f64,
    pub duration: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

/// Samples for an interpolated confound: one channel, or one row of
/// channel values per sample time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValues {
    Single(Vec<f64>),
    Multi(Vec<Vec<f64>>),
}

/// Declarative description of a signal generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorKind {
    Periodic(PeriodicStimulusConfig),
    Delta(DeltaFunctionConfig),
    Spline(SplineConfoundConfig),
    Events {
        events: Vec<EventSpec>,
    },
    Interpolated {
        times: Vec<f64>,
        values: SampleValues,
    },
}

impl GeneratorKind {
    pub fn kind_label(&self) -> &'static str {
        match self {
            GeneratorKind::Periodic(_) => "periodic",
            GeneratorKind::Delta(_) => "delta",
            GeneratorKind::Spline(_) => "spline",
            GeneratorKind::Events { .. } => "events",
            GeneratorKind::Interpolated { .. } => "interpolated",
        }
    }
}

/// Generator plus an optional output window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorConfig {
    pub generator: GeneratorKind,
    #[serde(default)]
    pub window: Option<Window>,
}

pub fn build_generator(kind: &GeneratorKind) -> Result<Box<dyn Generator>> {
    let generator: Box<dyn Generator> = match kind {
        GeneratorKind::Periodic(config) => Box::new(PeriodicStimulus::new(config.clone())?),
        GeneratorKind::Delta(config) => Box::new(DeltaFunction::new(config.clone())?),
        GeneratorKind::Spline(config) => Box::new(SplineConfound::new(config.clone())?),
        GeneratorKind::Events { events } => {
            let mut train = Events::new();
            for event in events {
                train.try_append(event.start, event.duration, event.height)?;
            }
            Box::new(train)
        }
        GeneratorKind::Interpolated { times, values } => {
            Box::new(InterpolatedConfound::from_samples(times, values)?)
        }
    };
    Ok(generator)
}

/// Build the time function a regressor config describes.
pub fn build_time_function(config: &RegressorConfig) -> Result<TimeFunction> {
    let function = build_generator(&config.generator)?.time_function();
    Ok(match config.window {
        Some(window) => function.with_window(window.start, window.end),
        None => function,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_defaults_match_documented_values() {
        let config = PeriodicStimulusConfig::default();
        assert_eq!(config.n, 1);
        assert_eq!(config.duration, 3.0);
        assert_eq!(config.step, 6.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn periodic_rejects_overlapping_pulses() {
        let config = PeriodicStimulusConfig {
            n: 3,
            duration: 4.0,
            step: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TimeFnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn periodic_onsets_follow_step() {
        let config = PeriodicStimulusConfig {
            n: 3,
            start: 1.0,
            duration: 1.0,
            step: 4.0,
            height: 1.0,
        };
        assert_eq!(config.onsets(), vec![1.0, 5.0, 9.0]);
    }

    #[test]
    fn delta_requires_positive_width() {
        assert!(DeltaFunctionConfig::default().validate().is_ok());
        let config = DeltaFunctionConfig { start: 0.0, dt: 0.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn spline_knot_count_must_match_df() {
        let config = SplineConfoundConfig {
            df: 6,
            window: Window::new(0.0, 10.0),
            knots: vec![2.0, 5.0],
        };
        assert_eq!(
            config.validate(),
            Err(TimeFnError::LengthMismatch {
                context: "spline knots",
                expected: 3,
                got: 2,
            })
        );
    }

    #[test]
    fn spline_needs_a_window_for_computed_knots() {
        let config = SplineConfoundConfig {
            df: 6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(SplineConfoundConfig::default().validate().is_ok());
    }

    #[test]
    fn generator_kind_deserializes_with_defaults() {
        let kind: GeneratorKind =
            serde_json::from_str(r#"{"kind": "periodic", "n": 4, "step": 10.0}"#).unwrap();
        assert_eq!(kind.kind_label(), "periodic");
        match kind {
            GeneratorKind::Periodic(config) => {
                assert_eq!(config.n, 4);
                assert_eq!(config.step, 10.0);
                assert_eq!(config.duration, 3.0);
            }
            other => panic!("unexpected generator {other:?}"),
        }
    }

    #[test]
    fn regressor_config_builds_windowed_function() {
        let config: RegressorConfig = serde_json::from_str(
            r#"{
                "generator": {"kind": "events", "events": [{"start": 1.0, "duration": 2.0}]},
                "window": {"start": 0.0, "end": 2.0}
            }"#,
        )
        .unwrap();
        let function = build_time_function(&config).unwrap();
        assert!(function.is_windowed());
        assert_eq!(function.evaluate_at(1.5)[0], 1.0);
        assert_eq!(function.evaluate_at(2.5)[0], 0.0);
    }

    #[test]
    fn interpolated_config_accepts_multi_channel_rows() {
        let kind: GeneratorKind = serde_json::from_str(
            r#"{
                "kind": "interpolated",
                "times": [0.0, 1.0],
                "values": [[0.0, 10.0], [1.0, 20.0]]
            }"#,
        )
        .unwrap();
        let function = build_generator(&kind).unwrap().time_function();
        assert_eq!(function.output_count(), 2);
        let out = function.evaluate_at(0.5);
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert!((out[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn overlapping_events_are_rejected_when_built_from_config() {
        let kind = GeneratorKind::Events {
            events: vec![
                EventSpec {
                    start: 0.0,
                    duration: 2.0,
                    height: 1.0,
                },
                EventSpec {
                    start: 1.0,
                    duration: 2.0,
                    height: 1.0,
                },
            ],
        };
        assert!(matches!(
            build_generator(&kind),
            Err(TimeFnError::OverlappingInterval { .. })
        ));
    }
}
