//! Stimulus generators
//!
//! Step-function stimuli, incrementally built event trains, periodic pulse
//! trains and square delta-function approximations.

use std::sync::{Arc, RwLock};

use ndarray::{Array1, ArrayView1};
use tracing::{debug, warn};

use crate::config::{DeltaFunctionConfig, PeriodicStimulusConfig};
use crate::function::{channel, pointwise, Generator, Rule, TimeFunction};
use crate::numeric::{Continuity, StepFunction};
use crate::{Result, TimeFnError};

/// Breakpoint placed just before time zero so a pulse train reads 0 before
/// its first pulse.
const SENTINEL_OFFSET: f64 = 1.0e-7;

/// Single-channel stimulus held at `values[k]` from `times[k]` until the
/// next breakpoint, and 0 before the first one.
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulus {
    step: StepFunction,
}

impl Stimulus {
    pub fn new(times: &[f64], values: &[f64]) -> Result<Self> {
        Self::with_continuity(times, values, Continuity::Right)
    }

    pub fn with_continuity(
        times: &[f64],
        values: &[f64],
        continuity: Continuity,
    ) -> Result<Self> {
        let step = StepFunction::new(times, values, continuity)?;
        debug!(breakpoints = times.len(), "built stimulus");
        Ok(Self { step })
    }

    /// Breakpoints, ascending.
    pub fn times(&self) -> &[f64] {
        self.step.breakpoints()
    }

    pub fn values(&self) -> &[f64] {
        self.step.values()
    }
}

impl Generator for Stimulus {
    fn time_function(&self) -> TimeFunction {
        let step = self.step.clone();
        let rule = Rule::from_channel(channel(move |time| step.eval_array(time)));
        TimeFunction::from_parts(1, rule, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pulse {
    start: f64,
    end: f64,
    height: f64,
}

/// Immutable snapshot of an event train.
#[derive(Debug, Clone, Default)]
struct EventTrain {
    times: Vec<f64>,
    values: Vec<f64>,
    pulses: Vec<Pulse>,
    step: Option<StepFunction>,
}

impl EventTrain {
    fn overlaps(&self, start: f64, end: f64) -> bool {
        self.pulses.iter().any(|p| start < p.end && p.start < end)
    }

    /// New train with the pulse `[start, start + duration)` inserted.
    fn rebuild(&self, start: f64, duration: f64, height: f64) -> Self {
        let mut pulses = self.pulses.clone();
        pulses.push(Pulse {
            start,
            end: start + duration,
            height,
        });

        // (time, is_start, level); empty pulses cover no time.
        let mut breakpoints: Vec<(f64, bool, f64)> = pulses
            .iter()
            .filter(|p| p.start < p.end)
            .flat_map(|p| [(p.start, true, p.height), (p.end, false, 0.0)])
            .collect();
        // Ends sort before starts at the same instant, ties keep append order.
        breakpoints.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut times: Vec<f64> = Vec::with_capacity(breakpoints.len());
        let mut values: Vec<f64> = Vec::with_capacity(breakpoints.len());
        for (time, _, level) in breakpoints {
            if times.last() == Some(&time) {
                if let Some(value) = values.last_mut() {
                    *value = level;
                }
            } else {
                times.push(time);
                values.push(level);
            }
        }

        let step = StepFunction::from_sorted(times.clone(), values.clone(), Continuity::Right);
        Self {
            times,
            values,
            pulses,
            step: Some(step),
        }
    }

    fn eval(&self, time: ArrayView1<'_, f64>) -> Array1<f64> {
        match &self.step {
            Some(step) => step.eval_array(time),
            None => Array1::zeros(time.len()),
        }
    }
}

type SharedTrain = Arc<RwLock<Arc<EventTrain>>>;

fn load(state: &RwLock<Arc<EventTrain>>) -> Arc<EventTrain> {
    match state.read() {
        Ok(guard) => Arc::clone(&*guard),
        Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
    }
}

fn store(state: &RwLock<Arc<EventTrain>>, train: EventTrain) {
    let train = Arc::new(train);
    match state.write() {
        Ok(mut guard) => *guard = train,
        Err(poisoned) => *poisoned.into_inner() = train,
    }
}

/// On/off event train built one pulse at a time.
///
/// Time functions obtained from [`Generator::time_function`] stay attached
/// to the train and see every later [`Events::append`].
#[derive(Debug, Default)]
pub struct Events {
    state: SharedTrain,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pulse of `height` over `[start, start + duration)`.
    ///
    /// The pulse is expected not to intersect earlier pulses. Overlap is
    /// logged and the pulse is still inserted; the level over the overlap is
    /// then decided by breakpoint order. Pulses with no duration are recorded
    /// but never change the level. Use [`Events::try_append`] to
    /// reject overlap instead.
    pub fn append(&mut self, start: f64, duration: f64, height: f64) {
        let current = load(&self.state);
        if current.overlaps(start, start + duration) {
            warn!(start, duration, "appended event overlaps an existing event");
        }
        self.commit(&current, start, duration, height);
    }

    /// Add a pulse, rejecting non-finite input, negative durations and
    /// overlap with earlier pulses.
    pub fn try_append(&mut self, start: f64, duration: f64, height: f64) -> Result<()> {
        if !(start.is_finite() && duration.is_finite() && height.is_finite()) {
            return Err(TimeFnError::InvalidConfig(
                "event start, duration and height must be finite".to_string(),
            ));
        }
        if duration < 0.0 {
            return Err(TimeFnError::InvalidConfig(
                "event duration must be non-negative".to_string(),
            ));
        }

        let current = load(&self.state);
        let end = start + duration;
        if current.overlaps(start, end) {
            return Err(TimeFnError::OverlappingInterval { start, end });
        }
        self.commit(&current, start, duration, height);
        Ok(())
    }

    fn commit(&self, current: &EventTrain, start: f64, duration: f64, height: f64) {
        let next = current.rebuild(start, duration, height);
        debug!(
            start,
            duration,
            height,
            breakpoints = next.times.len(),
            "rebuilt event train"
        );
        store(&self.state, next);
    }

    /// Breakpoints, strictly ascending. A pulse starting where another ends
    /// shares its breakpoint and takes over the level there.
    pub fn times(&self) -> Vec<f64> {
        load(&self.state).times.clone()
    }

    /// Levels aligned with [`Events::times`].
    pub fn values(&self) -> Vec<f64> {
        load(&self.state).values.clone()
    }

    /// Appended `(start, end)` intervals, in append order.
    pub fn intervals(&self) -> Vec<(f64, f64)> {
        load(&self.state)
            .pulses
            .iter()
            .map(|p| (p.start, p.end))
            .collect()
    }

    pub fn len(&self) -> usize {
        load(&self.state).pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Generator for Events {
    fn time_function(&self) -> TimeFunction {
        let state = Arc::clone(&self.state);
        let rule = Rule::from_channel(channel(move |time| load(&state).eval(time)));
        TimeFunction::from_parts(1, rule, None)
    }
}

/// `n` pulses of `height`, each `duration` long, starting at
/// `start + i * step`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicStimulus {
    config: PeriodicStimulusConfig,
    stimulus: Stimulus,
}

impl PeriodicStimulus {
    pub fn new(config: PeriodicStimulusConfig) -> Result<Self> {
        config.validate()?;

        let sentinel = config.start.min(0.0) - SENTINEL_OFFSET;
        let mut times = vec![sentinel];
        let mut values = vec![0.0];
        for onset in config.onsets() {
            times.extend([onset, onset + config.duration]);
            values.extend([config.height, 0.0]);
        }

        let stimulus = Stimulus::new(&times, &values)?;
        Ok(Self { config, stimulus })
    }

    pub fn config(&self) -> &PeriodicStimulusConfig {
        &self.config
    }

    pub fn stimulus(&self) -> &Stimulus {
        &self.stimulus
    }
}

impl Generator for PeriodicStimulus {
    fn time_function(&self) -> TimeFunction {
        self.stimulus.time_function()
    }
}

/// Square pulse of height `1 / dt` over `[start, start + dt)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaFunction {
    start: f64,
    dt: f64,
}

impl DeltaFunction {
    pub fn new(config: DeltaFunctionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            start: config.start,
            dt: config.dt,
        })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }
}

impl Generator for DeltaFunction {
    fn time_function(&self) -> TimeFunction {
        let (start, dt) = (self.start, self.dt);
        let rule = Rule::from_channel(pointwise(move |t| {
            if t >= start && t < start + dt {
                1.0 / dt
            } else {
                0.0
            }
        }));
        TimeFunction::from_parts(1, rule, None)
    }
}
