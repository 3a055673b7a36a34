//! Read-only views over a dataset for chart backgrounds.

use std::collections::{BTreeMap, HashMap};

use crate::dataset::{Axis, CurveKey, SampleDataset, SamplePoint};
use crate::regression::{Regression, RegressionFitter};
use crate::PerfError;

/// Traced curve per discrete key.
pub type Polylines = BTreeMap<CurveKey, Vec<SamplePoint>>;

const MAX_POLYLINE_STEPS: usize = 100_000;
// Absorbs fit residual at curve endpoints that sit exactly on a bound.
const BOUND_TOL: f64 = 1e-9;

/// Every authored sample, keys ascending, ranges and values in authored order.
pub fn scatter_points(dataset: &SampleDataset) -> Vec<SamplePoint> {
    dataset
        .curves
        .values()
        .flat_map(|curve| curve.sample_points().copied())
        .collect()
}

/// Trace each curve from its absolute minimum to maximum on the fit axis.
///
/// Every step is predicted from a regression over the ranges applicable at
/// that step. Steps with no applicable range, or whose prediction falls
/// outside the curve's bounds on the other axis, are left out, so curves
/// may be partial near envelope edges.
pub fn curve_polylines(dataset: &SampleDataset, step: f64) -> Result<Polylines, PerfError> {
    if !(step.is_finite() && step > 0.0) {
        return Err(PerfError::InvalidParameter(format!(
            "chart step must be positive, got {}",
            step
        )));
    }

    let direction = dataset.direction();
    let abscissa = direction.abscissa();
    let ordinate = direction.ordinate();
    let mut out = Polylines::new();

    for (key, curve) in &dataset.curves {
        let start = curve.absolute_min(abscissa);
        let end = curve.absolute_max(abscissa);
        let steps = ((end - start) / step).floor();
        if steps > MAX_POLYLINE_STEPS as f64 {
            return Err(PerfError::InvalidParameter(format!(
                "chart step {} is too fine for curve {} of '{}'",
                step, curve.key, dataset.id
            )));
        }
        let fitter = RegressionFitter::new(dataset.degree_for(curve), direction);
        let (lo, hi) = (curve.absolute_min(ordinate), curve.absolute_max(ordinate));
        let tol = BOUND_TOL * lo.abs().max(hi.abs()).max(1.0);

        // Fits only depend on which ranges apply, so reuse them across steps.
        let mut fits: HashMap<Vec<usize>, Regression> = HashMap::new();
        let mut line = Vec::new();
        for i in 0..=steps as usize {
            let value = start + step * i as f64;
            let ranges = curve.applicable_ranges(value, direction);
            if ranges.is_empty() {
                continue;
            }
            if !fits.contains_key(&ranges) {
                let fit = fitter
                    .fit(&curve.points_of(&ranges))
                    .map_err(|e| e.in_curve(&dataset.id, curve.key))?;
                fits.insert(ranges.clone(), fit);
            }
            let predicted = fits[&ranges].predict(value);
            if lo - tol <= predicted && predicted <= hi + tol {
                line.push(match abscissa {
                    Axis::X => SamplePoint::new(value, predicted),
                    Axis::Y => SamplePoint::new(predicted, value),
                });
            }
        }
        out.insert(*key, line);
    }
    Ok(out)
}
