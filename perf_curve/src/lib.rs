//! Aircraft performance prediction from digitised certified charts.
//!
//! Each chart is stored as a [`SampleDataset`]: a family of sampled curves,
//! one per discrete parameter value. Predictions fit local polynomial
//! regressions to the two curves bracketing the query, extrapolate linearly
//! between them and clamp the result to the certified envelope.

use thiserror::Error;

pub mod chart;
pub mod dataset;
pub mod envelope;
pub mod interpolate;
pub mod predict;
pub mod registry;
pub mod regression;

pub use chart::{curve_polylines, scatter_points, Polylines};
pub use dataset::{
    Axis, AxisInfo, CurveDefinition, CurveKey, Direction, ParameterInfo, ParameterKind,
    QueryShape, Range, Rounding, SampleDataset, SamplePoint,
};
pub use envelope::{in_axis_limits, in_subrange, AxisLimits, LimitCode, LimitReason};
pub use interpolate::{bracket, extrapolate, Bracket};
pub use predict::{PredictionFailure, PredictionResult, PredictionService, NOT_AVAILABLE};
pub use registry::{PredictionInputs, Registry};
pub use regression::{FitError, Regression, RegressionFitter};

/// Configuration-level failures. User input never produces one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PerfError {
    #[error(
        "dataset '{dataset}' curve {curve_key}: {point_count} sample points cannot support a degree {degree} fit"
    )]
    DatasetConfiguration {
        dataset: String,
        curve_key: f64,
        point_count: usize,
        degree: usize,
    },
    #[error("dataset '{dataset}': {reason}")]
    InvalidDataset { dataset: String, reason: String },
    #[error("failed to parse dataset '{dataset}': {message}")]
    DatasetParse { dataset: String, message: String },
    #[error("dataset '{dataset}' curve {curve_key}: regression solve failed: {message}")]
    Solve {
        dataset: String,
        curve_key: f64,
        message: String,
    },
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
