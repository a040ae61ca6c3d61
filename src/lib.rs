//! timefn - composable time functions for neuroimaging regressors
//!
//! Build stimuli (event trains, periodic pulses, delta approximations) and
//! confounds (interpolated samples, wrapped functions, spline drift bases),
//! combine them with ordinary arithmetic, then evaluate the result at any set
//! of time points to get one row per output channel.

pub mod config;
pub mod confound;
pub mod function;
pub mod numeric;
pub mod stimulus;
pub mod window;

use thiserror::Error;

// Re-export main types
pub use config::{
    build_generator, build_time_function, DeltaFunctionConfig, EventSpec, GeneratorKind,
    PeriodicStimulusConfig, RegressorConfig, SampleValues, SplineConfoundConfig,
};
pub use confound::{FunctionConfound, InterpolatedConfound, SplineConfound};
pub use function::{
    channel, pointwise, BinaryOp, ChannelFn, Generator, MultiChannelFn, Operand, Rule,
    TimeFunction,
};
pub use numeric::{recip0, Continuity, Interpolant, StepFunction};
pub use stimulus::{DeltaFunction, Events, PeriodicStimulus, Stimulus};
pub use window::Window;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeFnError {
    #[error("channel mismatch: expected {expected} channels, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
    #[error("unsupported operand: {0}")]
    UnsupportedOperand(String),
    #[error("channel {index} out of range for {channels} channels")]
    ChannelOutOfRange { index: usize, channels: usize },
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("event [{start}, {end}) overlaps an existing event")]
    OverlappingInterval { start: f64, end: f64 },
}

pub type Result<T> = std::result::Result<T, TimeFnError>;
