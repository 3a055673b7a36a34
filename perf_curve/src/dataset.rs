//! Digitised chart storage: datasets, curves, ranges and sample points.
//!
//! A [`SampleDataset`] maps each discrete parameter value (temperature, wind,
//! ISA deviation or dropdown height) to one [`CurveDefinition`]. Datasets are
//! decoded from JSON once, validated eagerly and never mutated afterwards.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::PerfError;

/// Discrete parameter value used to address a curve.
pub type CurveKey = OrderedFloat<f64>;

const DEFAULT_DEGREE: usize = 3;
const BOUNDARY_EPS: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn coordinate(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }
}

impl From<[f64; 2]> for SamplePoint {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<SamplePoint> for [f64; 2] {
    fn from(value: SamplePoint) -> Self {
        [value.x, value.y]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

/// Regression direction: forward regresses y on x, reverse regresses x on y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Axis carrying the independent variable of the fit.
    pub fn abscissa(self) -> Axis {
        match self {
            Direction::Forward => Axis::X,
            Direction::Reverse => Axis::Y,
        }
    }

    /// Axis carrying the predicted value.
    pub fn ordinate(self) -> Axis {
        self.abscissa().other()
    }
}

/// Which continuous input drives a query against a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryShape {
    /// Pressure altitude (y) in, weight (x) out. Fitted in reverse.
    ByAltitude,
    /// Weight (x) in, metric (y) out. Fitted forward.
    ByWeight,
}

impl QueryShape {
    pub fn direction(self) -> Direction {
        match self {
            QueryShape::ByAltitude => Direction::Reverse,
            QueryShape::ByWeight => Direction::Forward,
        }
    }

    pub fn input_axis(self) -> Axis {
        self.direction().abscissa()
    }

    pub fn output_axis(self) -> Axis {
        self.direction().ordinate()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Temperature,
    Wind,
    IsaDeviation,
    Dropdown,
}

impl ParameterKind {
    pub fn input_name(self) -> &'static str {
        match self {
            ParameterKind::Temperature => "temperature",
            ParameterKind::Wind => "wind speed",
            ParameterKind::IsaDeviation => "ISA deviation",
            ParameterKind::Dropdown => "dropdown height",
        }
    }
}

/// Output rounding applied after clamping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Whole units, e.g. kilograms.
    Integer,
    /// One decimal, e.g. seconds.
    Tenths,
    /// Two decimals, e.g. dimensionless coefficients.
    Hundredths,
}

impl Rounding {
    pub fn decimals(self) -> usize {
        match self {
            Rounding::Integer => 0,
            Rounding::Tenths => 1,
            Rounding::Hundredths => 2,
        }
    }

    pub fn apply(self, value: f64) -> f64 {
        match self {
            Rounding::Integer => value.round(),
            Rounding::Tenths => (value * 10.0).round() / 10.0,
            Rounding::Hundredths => (value * 100.0).round() / 100.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisInfo {
    pub label: String,
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub kind: ParameterKind,
    pub label: String,
    pub unit: String,
}

/// Window of applicability inside a curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub range_x: [f64; 2],
    pub range_y: [f64; 2],
    pub values: Vec<SamplePoint>,
}

impl Range {
    pub fn interval(&self, axis: Axis) -> [f64; 2] {
        match axis {
            Axis::X => self.range_x,
            Axis::Y => self.range_y,
        }
    }

    /// Inclusive on both ends so stitching points belong to both neighbours.
    pub fn contains(&self, value: f64, direction: Direction) -> bool {
        let [lo, hi] = self.interval(direction.abscissa());
        lo <= value && value <= hi
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveDefinition {
    pub key: f64,
    pub absolute_min_x: f64,
    pub absolute_max_x: f64,
    pub absolute_min_y: f64,
    pub absolute_max_y: f64,
    /// Overrides the dataset fit degree for finely shaped curves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<usize>,
    pub ranges: Vec<Range>,
}

impl CurveDefinition {
    pub fn absolute_min(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.absolute_min_x,
            Axis::Y => self.absolute_min_y,
        }
    }

    pub fn absolute_max(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.absolute_max_x,
            Axis::Y => self.absolute_max_y,
        }
    }

    /// Indices of the ranges whose window on the fit axis contains `value`.
    pub fn applicable_ranges(&self, value: f64, direction: Direction) -> Vec<usize> {
        self.ranges
            .iter()
            .enumerate()
            .filter(|(_, range)| range.contains(value, direction))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Union of the sample points of every range applicable to `value`.
    ///
    /// Empty when no range matches; callers must treat that as a failed fit.
    pub fn points_applicable(&self, value: f64, direction: Direction) -> Vec<SamplePoint> {
        self.points_of(&self.applicable_ranges(value, direction))
    }

    pub fn points_of(&self, ranges: &[usize]) -> Vec<SamplePoint> {
        ranges
            .iter()
            .filter_map(|&idx| self.ranges.get(idx))
            .flat_map(|range| range.values.iter().copied())
            .collect()
    }

    /// Every authored sample in range order, duplicates included.
    pub fn sample_points(&self) -> impl Iterator<Item = &SamplePoint> {
        self.ranges.iter().flat_map(|range| range.values.iter())
    }
}

/// On-disk shape of a dataset before validation.
#[derive(Clone, Debug, Deserialize)]
struct DatasetDocument {
    id: String,
    title: String,
    parameter: ParameterInfo,
    x_axis: AxisInfo,
    y_axis: AxisInfo,
    query: QueryShape,
    step: f64,
    #[serde(default = "default_degree")]
    degree: usize,
    rounding: Rounding,
    #[serde(default)]
    chart_step: Option<f64>,
    curves: Vec<CurveDefinition>,
}

fn default_degree() -> usize {
    DEFAULT_DEGREE
}

#[derive(Clone, Debug, PartialEq)]
pub struct SampleDataset {
    pub id: String,
    pub title: String,
    pub parameter: ParameterInfo,
    pub x_axis: AxisInfo,
    pub y_axis: AxisInfo,
    pub query: QueryShape,
    /// Spacing between adjacent discrete keys.
    pub step: f64,
    pub degree: usize,
    pub rounding: Rounding,
    pub chart_step: Option<f64>,
    pub curves: BTreeMap<CurveKey, CurveDefinition>,
}

impl SampleDataset {
    /// Decode and validate a dataset document.
    pub fn from_json(text: &str) -> Result<Self, PerfError> {
        let doc: DatasetDocument =
            serde_json::from_str(text).map_err(|e| PerfError::DatasetParse {
                dataset: peek_id(text),
                message: e.to_string(),
            })?;
        let mut curves = BTreeMap::new();
        for curve in doc.curves {
            let key = OrderedFloat(curve.key);
            if curves.insert(key, curve).is_some() {
                return Err(PerfError::InvalidDataset {
                    dataset: doc.id,
                    reason: format!("duplicate curve key {}", key),
                });
            }
        }
        let dataset = Self {
            id: doc.id,
            title: doc.title,
            parameter: doc.parameter,
            x_axis: doc.x_axis,
            y_axis: doc.y_axis,
            query: doc.query,
            step: doc.step,
            degree: doc.degree,
            rounding: doc.rounding,
            chart_step: doc.chart_step,
            curves,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn direction(&self) -> Direction {
        self.query.direction()
    }

    pub fn axis(&self, axis: Axis) -> &AxisInfo {
        match axis {
            Axis::X => &self.x_axis,
            Axis::Y => &self.y_axis,
        }
    }

    pub fn min_key(&self) -> Option<f64> {
        self.curves.keys().next().map(|k| k.0)
    }

    pub fn max_key(&self) -> Option<f64> {
        self.curves.keys().next_back().map(|k| k.0)
    }

    /// Curve at `key`, tolerating float noise from bracket arithmetic.
    pub fn curve(&self, key: f64) -> Option<&CurveDefinition> {
        if let Some(curve) = self.curves.get(&OrderedFloat(key)) {
            return Some(curve);
        }
        let tol = self.step.abs() * BOUNDARY_EPS;
        self.curves
            .range(OrderedFloat(key - tol)..=OrderedFloat(key + tol))
            .map(|(_, curve)| curve)
            .next()
    }

    pub(crate) fn require_curve(&self, key: f64) -> Result<&CurveDefinition, PerfError> {
        self.curve(key).ok_or_else(|| PerfError::InvalidDataset {
            dataset: self.id.clone(),
            reason: format!("no curve at key {}", key),
        })
    }

    /// Fit degree for `curve`, honouring its override.
    pub fn degree_for(&self, curve: &CurveDefinition) -> usize {
        curve.degree.unwrap_or(self.degree)
    }

    /// Check every authoring invariant the engine relies on.
    pub fn validate(&self) -> Result<(), PerfError> {
        let invalid = |reason: String| PerfError::InvalidDataset {
            dataset: self.id.clone(),
            reason,
        };

        if self.curves.is_empty() {
            return Err(invalid("dataset has no curves".into()));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(invalid(format!("step must be positive, got {}", self.step)));
        }
        if let Some(step) = self.chart_step {
            if !(step.is_finite() && step > 0.0) {
                return Err(invalid(format!("chart_step must be positive, got {}", step)));
            }
        }

        // Keys must sit on the step grid with no holes, otherwise a bracket
        // could land on a key that has no curve.
        let tol = self.step * BOUNDARY_EPS;
        let keys: Vec<f64> = self.curves.keys().map(|k| k.0).collect();
        for &key in &keys {
            let aligned = (key / self.step).round() * self.step;
            if (aligned - key).abs() > tol.max(BOUNDARY_EPS) {
                return Err(invalid(format!(
                    "key {} is not a multiple of step {}",
                    key, self.step
                )));
            }
        }
        for pair in keys.windows(2) {
            if ((pair[1] - pair[0]) - self.step).abs() > tol.max(BOUNDARY_EPS) {
                return Err(invalid(format!(
                    "keys {} and {} are not one step ({}) apart",
                    pair[0], pair[1], self.step
                )));
            }
        }

        let direction = self.direction();
        let abscissa = direction.abscissa();
        for curve in self.curves.values() {
            let degree = self.degree_for(curve);
            if degree == 0 {
                return Err(invalid(format!("curve {}: degree must be at least 1", curve.key)));
            }
            for axis in [Axis::X, Axis::Y] {
                let (min, max) = (curve.absolute_min(axis), curve.absolute_max(axis));
                if !(min.is_finite() && max.is_finite() && min <= max) {
                    return Err(invalid(format!(
                        "curve {}: invalid absolute bounds [{}, {}] on {:?}",
                        curve.key, min, max, axis
                    )));
                }
            }
            if curve.ranges.is_empty() {
                return Err(invalid(format!("curve {} has no ranges", curve.key)));
            }

            for (idx, range) in curve.ranges.iter().enumerate() {
                for axis in [Axis::X, Axis::Y] {
                    let [lo, hi] = range.interval(axis);
                    if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                        return Err(invalid(format!(
                            "curve {} range {}: invalid {:?} window [{}, {}]",
                            curve.key, idx, axis, lo, hi
                        )));
                    }
                }
                if range.values.len() < degree + 1 {
                    return Err(PerfError::DatasetConfiguration {
                        dataset: self.id.clone(),
                        curve_key: curve.key,
                        point_count: range.values.len(),
                        degree,
                    });
                }
                let mut abscissas: Vec<f64> = range
                    .values
                    .iter()
                    .map(|p| p.coordinate(abscissa))
                    .collect();
                if abscissas.iter().any(|v| !v.is_finite())
                    || range.values.iter().any(|p| !p.coordinate(abscissa.other()).is_finite())
                {
                    return Err(invalid(format!(
                        "curve {} range {}: non-finite sample",
                        curve.key, idx
                    )));
                }
                abscissas.sort_by(f64::total_cmp);
                if abscissas.windows(2).any(|w| w[0] == w[1]) {
                    return Err(invalid(format!(
                        "curve {} range {}: duplicate {:?} sample",
                        curve.key, idx, abscissa
                    )));
                }
            }

            for (idx, pair) in curve.ranges.windows(2).enumerate() {
                let [_, prev_hi] = pair[0].interval(abscissa);
                let [next_lo, _] = pair[1].interval(abscissa);
                if (prev_hi - next_lo).abs() > BOUNDARY_EPS * prev_hi.abs().max(1.0) {
                    return Err(invalid(format!(
                        "curve {}: ranges {} and {} are not contiguous on {:?} ({} vs {})",
                        curve.key,
                        idx,
                        idx + 1,
                        abscissa,
                        prev_hi,
                        next_lo
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Best-effort id for parse errors, where the document never decoded.
fn peek_id(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_else(|| "<unknown>".to_string())
}
