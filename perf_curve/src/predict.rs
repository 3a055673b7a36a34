//! Prediction service: validates a query, brackets it, fits both curves and
//! produces a structured result.
//!
//! Stages run in a fixed order:
//! subrange check → bracket → axis limits → fit low/high → extrapolate →
//! clamp to absolute bounds → round. A failed check ends the run with an
//! "N/A" [`PredictionResult`]; only malformed dataset content surfaces as
//! [`PerfError`].

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::dataset::{CurveDefinition, Direction, QueryShape, Rounding, SampleDataset};
use crate::envelope::{in_axis_limits, in_subrange, LimitCode};
use crate::interpolate::{bracket, extrapolate};
use crate::regression::RegressionFitter;
use crate::PerfError;

/// Display text for unavailable values.
pub const NOT_AVAILABLE: &str = "N/A";

/// Recoverable, input-driven reasons a prediction is unavailable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionFailure {
    #[error("Outside defined {parameter} range")]
    OutOfSubrange {
        parameter: String,
        value: f64,
        valid_min: f64,
        valid_max: f64,
    },
    #[error("Outside defined {axis} range: {reason_text}")]
    OutOfAxisLimits {
        axis: String,
        bracket_low: f64,
        bracket_high: f64,
        code: LimitCode,
        reason_text: String,
        computed_min: f64,
        computed_max: f64,
    },
    #[error("Outside defined {axis} range: no {parameter} {curve_key} sample covers {value}")]
    NoApplicableRange {
        axis: String,
        parameter: String,
        curve_key: f64,
        value: f64,
    },
    #[error("Missing {0} input")]
    MissingInput(&'static str),
}

/// Either a value, or an error with display text "N/A".
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictionResult {
    pub value: Option<f64>,
    pub error: Option<String>,
    pub text: Option<String>,
}

impl PredictionResult {
    pub fn success(value: f64) -> Self {
        Self {
            value: Some(value),
            error: None,
            text: None,
        }
    }

    pub fn failure(failure: &PredictionFailure) -> Self {
        Self {
            value: None,
            error: Some(failure.to_string()),
            text: Some(NOT_AVAILABLE.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }

    /// Value formatted with `rounding`'s decimals, or the "N/A" text.
    pub fn display(&self, rounding: Rounding) -> String {
        match self.value {
            Some(v) => format!("{:.*}", rounding.decimals(), v),
            None => self.text.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }
}

impl From<PredictionFailure> for PredictionResult {
    fn from(failure: PredictionFailure) -> Self {
        Self::failure(&failure)
    }
}

/// Why a run stopped before producing a value.
enum Halt {
    Unavailable(PredictionFailure),
    Fatal(PerfError),
}

impl From<PredictionFailure> for Halt {
    fn from(value: PredictionFailure) -> Self {
        Halt::Unavailable(value)
    }
}

impl From<PerfError> for Halt {
    fn from(value: PerfError) -> Self {
        Halt::Fatal(value)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PredictionService<'a> {
    dataset: &'a SampleDataset,
    degree: Option<usize>,
}

impl<'a> PredictionService<'a> {
    pub fn new(dataset: &'a SampleDataset) -> Self {
        Self {
            dataset,
            degree: None,
        }
    }

    /// Force one fit degree on every curve, ignoring authored degrees.
    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = Some(degree);
        self
    }

    pub fn dataset(&self) -> &'a SampleDataset {
        self.dataset
    }

    /// Output weight for a discrete parameter and pressure altitude.
    pub fn predict_by_altitude(
        &self,
        discrete: f64,
        altitude: f64,
        rounding: Rounding,
    ) -> Result<PredictionResult, PerfError> {
        self.run(QueryShape::ByAltitude, discrete, altitude, rounding)
    }

    /// Output metric for a discrete parameter and weight.
    pub fn predict_by_weight(
        &self,
        discrete: f64,
        weight: f64,
        rounding: Rounding,
    ) -> Result<PredictionResult, PerfError> {
        self.run(QueryShape::ByWeight, discrete, weight, rounding)
    }

    /// Query in the dataset's own shape.
    pub fn predict(
        &self,
        discrete: f64,
        continuous: f64,
        rounding: Rounding,
    ) -> Result<PredictionResult, PerfError> {
        self.run(self.dataset.query, discrete, continuous, rounding)
    }

    fn run(
        &self,
        shape: QueryShape,
        discrete: f64,
        continuous: f64,
        rounding: Rounding,
    ) -> Result<PredictionResult, PerfError> {
        match self.evaluate(shape, discrete, continuous) {
            Ok(value) => Ok(PredictionResult::success(rounding.apply(value))),
            Err(Halt::Unavailable(failure)) => {
                debug!(dataset = %self.dataset.id, %failure, "prediction unavailable");
                Ok(PredictionResult::failure(&failure))
            }
            Err(Halt::Fatal(err)) => Err(err),
        }
    }

    fn evaluate(&self, shape: QueryShape, discrete: f64, continuous: f64) -> Result<f64, Halt> {
        let dataset = self.dataset;
        let (valid_min, valid_max) = match (dataset.min_key(), dataset.max_key()) {
            (Some(min), Some(max)) => (min, max),
            _ => {
                return Err(PerfError::InvalidDataset {
                    dataset: dataset.id.clone(),
                    reason: "dataset has no curves".into(),
                }
                .into())
            }
        };

        if !in_subrange(dataset, discrete) {
            return Err(PredictionFailure::OutOfSubrange {
                parameter: dataset.parameter.label.clone(),
                value: discrete,
                valid_min,
                valid_max,
            }
            .into());
        }

        let bracket = bracket(discrete, dataset.step, valid_max);
        debug!(dataset = %dataset.id, discrete, low = bracket.low, high = bracket.high, "bracket");

        let input_axis = shape.input_axis();
        let limits = in_axis_limits(dataset, bracket.low, bracket.high, continuous, input_axis)?;
        if let Some(reason) = limits.reason {
            return Err(PredictionFailure::OutOfAxisLimits {
                axis: dataset.axis(input_axis).label.clone(),
                bracket_low: bracket.low,
                bracket_high: bracket.high,
                code: reason.code,
                reason_text: reason.text,
                computed_min: limits.min,
                computed_max: limits.max,
            }
            .into());
        }

        let direction = shape.direction();
        let low_curve = dataset.require_curve(bracket.low)?;
        let high_curve = dataset.require_curve(bracket.high)?;
        let value_low = self.curve_value(low_curve, continuous, direction)?;
        let value_high = self.curve_value(high_curve, continuous, direction)?;
        let raw = extrapolate(discrete, bracket.low, value_low, bracket.high, value_high);

        let output_axis = shape.output_axis();
        let min = low_curve
            .absolute_min(output_axis)
            .min(high_curve.absolute_min(output_axis));
        let max = low_curve
            .absolute_max(output_axis)
            .max(high_curve.absolute_max(output_axis));
        let clamped = raw.clamp(min, max);
        debug!(
            dataset = %dataset.id,
            value_low,
            value_high,
            raw,
            clamped,
            "extrapolated"
        );
        Ok(clamped)
    }

    fn curve_value(
        &self,
        curve: &CurveDefinition,
        value: f64,
        direction: Direction,
    ) -> Result<f64, Halt> {
        let points = curve.points_applicable(value, direction);
        if points.is_empty() {
            return Err(PredictionFailure::NoApplicableRange {
                axis: self.dataset.axis(direction.abscissa()).label.clone(),
                parameter: self.dataset.parameter.label.clone(),
                curve_key: curve.key,
                value,
            }
            .into());
        }
        let degree = self
            .degree
            .unwrap_or_else(|| self.dataset.degree_for(curve));
        let fit = RegressionFitter::new(degree, direction)
            .fit(&points)
            .map_err(|e| e.in_curve(&self.dataset.id, curve.key))?;
        Ok(fit.predict(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::sample_json;

    fn dataset() -> SampleDataset {
        // y = 2x + key on x in [40, 80]
        SampleDataset::from_json(&sample_json(&[10.0, 20.0, 30.0, 40.0, 50.0])).unwrap()
    }

    #[test]
    fn test_out_of_subrange_is_structured() {
        let dataset = dataset();
        let result = PredictionService::new(&dataset)
            .predict_by_weight(61.0, 60.0, Rounding::Integer)
            .unwrap();
        assert_eq!(result.value, None);
        assert!(result.error.as_deref().unwrap().contains("Outside defined"));
        assert_eq!(result.error.as_deref(), Some("Outside defined wind range"));
        assert_eq!(result.text.as_deref(), Some("N/A"));
    }

    #[test]
    fn test_out_of_axis_limits_includes_reason() {
        let dataset = dataset();
        let result = PredictionService::new(&dataset)
            .predict_by_weight(23.0, 90.0, Rounding::Integer)
            .unwrap();
        assert!(!result.is_available());
        let error = result.error.unwrap();
        assert!(error.starts_with("Outside defined weight range: "), "{error}");
        assert!(error.contains("above the maximum of 80"), "{error}");
    }

    #[test]
    fn test_interpolates_between_curves() {
        let dataset = dataset();
        let result = PredictionService::new(&dataset)
            .predict_by_weight(23.0, 60.0, Rounding::Hundredths)
            .unwrap();
        // 2 * 60 + 23
        assert_eq!(result.value, Some(143.0));
        assert!(result.error.is_none());
        assert!(result.text.is_none());
    }

    #[test]
    fn test_top_key_uses_single_curve() {
        let dataset = dataset();
        let result = PredictionService::new(&dataset)
            .predict_by_weight(50.0, 50.0, Rounding::Integer)
            .unwrap();
        assert_eq!(result.value, Some(150.0));
    }

    #[test]
    fn test_reverse_shape_on_same_dataset() {
        let dataset = dataset();
        // x = (y - key) / 2
        let result = PredictionService::new(&dataset)
            .predict_by_altitude(30.0, 130.0, Rounding::Tenths)
            .unwrap();
        assert_eq!(result.value, Some(50.0));
    }

    #[test]
    fn test_degree_override_too_high_is_fatal() {
        let dataset = dataset();
        let err = PredictionService::new(&dataset)
            .with_degree(6)
            .predict_by_weight(23.0, 60.0, Rounding::Integer)
            .unwrap_err();
        assert!(matches!(
            err,
            PerfError::DatasetConfiguration {
                point_count: 5,
                degree: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_display_formats_by_rounding() {
        assert_eq!(PredictionResult::success(6.4).display(Rounding::Tenths), "6.4");
        assert_eq!(PredictionResult::success(4542.0).display(Rounding::Integer), "4542");
        let na = PredictionResult::from(PredictionFailure::MissingInput("weight"));
        assert_eq!(na.display(Rounding::Integer), "N/A");
        assert_eq!(na.error.as_deref(), Some("Missing weight input"));
    }
}
