//! Envelope bound checks on the discrete parameter and the continuous input.

use serde::Serialize;

use crate::dataset::{Axis, SampleDataset};
use crate::PerfError;

/// True iff `query` lies within the dataset's key range, inclusive.
pub fn in_subrange(dataset: &SampleDataset, query: f64) -> bool {
    match (dataset.min_key(), dataset.max_key()) {
        (Some(min), Some(max)) => min <= query && query <= max,
        _ => false,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitCode {
    BelowLimits,
    AboveLimits,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LimitReason {
    pub code: LimitCode,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AxisLimits {
    pub in_limits: bool,
    pub min: f64,
    pub max: f64,
    pub reason: Option<LimitReason>,
}

/// Test `value` on `axis` against the union of both bracketing curves' bounds.
///
/// The looser of the two curves wins: the interpolation region between two
/// discrete curves is bounded by whichever is less restrictive.
pub fn in_axis_limits(
    dataset: &SampleDataset,
    low_key: f64,
    high_key: f64,
    value: f64,
    axis: Axis,
) -> Result<AxisLimits, PerfError> {
    let low = dataset.require_curve(low_key)?;
    let high = dataset.require_curve(high_key)?;
    let min = low.absolute_min(axis).min(high.absolute_min(axis));
    let max = low.absolute_max(axis).max(high.absolute_max(axis));

    let reason = if !(value >= min) {
        Some(LimitReason {
            code: LimitCode::BelowLimits,
            text: format!("{} is below the minimum of {}", value, min),
        })
    } else if value > max {
        Some(LimitReason {
            code: LimitCode::AboveLimits,
            text: format!("{} is above the maximum of {}", value, max),
        })
    } else {
        None
    };

    Ok(AxisLimits {
        in_limits: reason.is_none(),
        min,
        max,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::sample_json;

    fn dataset() -> SampleDataset {
        SampleDataset::from_json(&sample_json(&[10.0, 20.0, 30.0, 40.0, 50.0])).unwrap()
    }

    #[test]
    fn test_every_key_is_in_subrange() {
        let dataset = dataset();
        for key in dataset.curves.keys() {
            assert!(in_subrange(&dataset, key.0));
        }
    }

    #[test]
    fn test_subrange_rejects_outside_and_nan() {
        let dataset = dataset();
        assert!(!in_subrange(&dataset, 61.0));
        assert!(!in_subrange(&dataset, 9.99));
        assert!(!in_subrange(&dataset, f64::NAN));
        assert!(in_subrange(&dataset, 23.0));
    }

    #[test]
    fn test_axis_limits_use_union_of_bracketing_curves() {
        let dataset = dataset();
        // y bounds: key 20 -> [100, 180], key 30 -> [110, 190]
        let limits = in_axis_limits(&dataset, 20.0, 30.0, 185.0, Axis::Y).unwrap();
        assert!(limits.in_limits);
        assert_eq!(limits.min, 100.0);
        assert_eq!(limits.max, 190.0);
        assert!(limits.reason.is_none());
    }

    #[test]
    fn test_axis_limits_reason_codes() {
        let dataset = dataset();
        let below = in_axis_limits(&dataset, 20.0, 30.0, 99.0, Axis::Y).unwrap();
        assert!(!below.in_limits);
        assert_eq!(below.reason.unwrap().code, LimitCode::BelowLimits);

        let above = in_axis_limits(&dataset, 20.0, 30.0, 81.0, Axis::X).unwrap();
        let reason = above.reason.unwrap();
        assert_eq!(reason.code, LimitCode::AboveLimits);
        assert!(reason.text.contains("maximum of 80"));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let dataset = dataset();
        assert!(in_axis_limits(&dataset, 10.0, 20.0, 40.0, Axis::X).unwrap().in_limits);
        assert!(in_axis_limits(&dataset, 10.0, 20.0, 80.0, Axis::X).unwrap().in_limits);
    }

    #[test]
    fn test_missing_curve_is_configuration_error() {
        let dataset = dataset();
        let err = in_axis_limits(&dataset, 15.0, 25.0, 50.0, Axis::X).unwrap_err();
        assert!(matches!(err, PerfError::InvalidDataset { .. }));
    }
}
