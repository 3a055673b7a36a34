// Least-squares polynomial regression over digitised chart samples.
// Abscissas are normalised to [-1, 1] before building the Vandermonde matrix so
// altitude-sized inputs stay well conditioned up to degree 5.

use nalgebra::{DMatrix, DVector, SVD};
use thiserror::Error;

use crate::dataset::{Direction, SamplePoint};
use crate::PerfError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("{point_count} points cannot support a degree {degree} fit")]
    TooFewPoints { point_count: usize, degree: usize },
    #[error("{0}")]
    Solve(String),
}

impl FitError {
    /// Attach the dataset and curve the failed fit belongs to.
    pub fn in_curve(self, dataset: &str, curve_key: f64) -> PerfError {
        match self {
            FitError::TooFewPoints {
                point_count,
                degree,
            } => PerfError::DatasetConfiguration {
                dataset: dataset.to_string(),
                curve_key,
                point_count,
                degree,
            },
            FitError::Solve(message) => PerfError::Solve {
                dataset: dataset.to_string(),
                curve_key,
                message,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegressionFitter {
    pub degree: usize,
    pub direction: Direction,
}

impl RegressionFitter {
    pub fn new(degree: usize, direction: Direction) -> Self {
        Self { degree, direction }
    }

    pub fn forward(degree: usize) -> Self {
        Self::new(degree, Direction::Forward)
    }

    pub fn reverse(degree: usize) -> Self {
        Self::new(degree, Direction::Reverse)
    }

    /// Fit a polynomial through `points`; needs at least `degree + 1` of them.
    pub fn fit(&self, points: &[SamplePoint]) -> Result<Regression, FitError> {
        let n = points.len();
        let cols = self.degree + 1;
        if n < cols {
            return Err(FitError::TooFewPoints {
                point_count: n,
                degree: self.degree,
            });
        }

        let abscissa = self.direction.abscissa();
        let ordinate = self.direction.ordinate();
        let (lo, hi) = points
            .iter()
            .map(|p| p.coordinate(abscissa))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let center = (lo + hi) / 2.0;
        let half_span = if hi > lo { (hi - lo) / 2.0 } else { 1.0 };

        let mut matrix = DMatrix::<f64>::zeros(n, cols);
        for (i, point) in points.iter().enumerate() {
            let t = (point.coordinate(abscissa) - center) / half_span;
            let mut term = 1.0;
            for j in 0..cols {
                matrix[(i, j)] = term;
                term *= t;
            }
        }
        let b = DVector::from_iterator(n, points.iter().map(|p| p.coordinate(ordinate)));

        let decomp = SVD::new(matrix, true, true);
        let sigma_max = decomp.singular_values.max();
        let eps = f64::EPSILON * n.max(cols) as f64 * sigma_max;
        let solution = decomp
            .solve(&b, eps)
            .map_err(|e| FitError::Solve(e.to_string()))?;
        let coefficients: Vec<f64> = solution.iter().copied().collect();
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(FitError::Solve("non-finite coefficients".into()));
        }

        Ok(Regression {
            direction: self.direction,
            coefficients,
            center,
            half_span,
        })
    }
}

/// A fitted polynomial; `predict` maps the fit abscissa to its ordinate.
#[derive(Clone, Debug, PartialEq)]
pub struct Regression {
    direction: Direction,
    coefficients: Vec<f64>,
    center: f64,
    half_span: f64,
}

impl Regression {
    pub fn predict(&self, value: f64) -> f64 {
        let t = (value - self.center) / self.half_span;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * t + c)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Coefficients in ascending power order of the normalised abscissa.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_points() -> Vec<SamplePoint> {
        [(40.0, 319.0), (50.0, 434.0), (60.0, 573.0), (70.0, 736.0), (80.0, 923.0)]
            .iter()
            .map(|&(x, y)| SamplePoint::new(x, y))
            .collect()
    }

    #[test]
    fn test_forward_fit_hits_exact_sample() {
        for degree in 2..=4 {
            let fit = RegressionFitter::forward(degree)
                .fit(&scenario_points())
                .unwrap();
            let predicted = fit.predict(60.0);
            assert!((predicted - 573.0).abs() < 1.0, "degree {degree}: {predicted}");
        }
    }

    #[test]
    fn test_reverse_fit_swaps_axes() {
        let points: Vec<SamplePoint> = (0..6)
            .map(|i| {
                let y = i as f64 * 1000.0;
                SamplePoint::new(4700.0 - 0.05 * y, y)
            })
            .collect();
        let fit = RegressionFitter::reverse(3).fit(&points).unwrap();
        assert_eq!(fit.direction(), Direction::Reverse);
        assert!((fit.predict(2500.0) - 4575.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_ordinate_fits_vertical_edge() {
        let points: Vec<SamplePoint> = [-1000.0, 0.0, 1000.0, 2000.0]
            .iter()
            .map(|&y| SamplePoint::new(4700.0, y))
            .collect();
        let fit = RegressionFitter::reverse(3).fit(&points).unwrap();
        assert!((fit.predict(500.0) - 4700.0).abs() < 1e-6);
    }

    #[test]
    fn test_too_few_points_is_configuration_error() {
        let points = &scenario_points()[..3];
        let err = RegressionFitter::forward(3).fit(points).unwrap_err();
        assert_eq!(
            err,
            FitError::TooFewPoints {
                point_count: 3,
                degree: 3
            }
        );
        match err.in_curve("d1", 20.0) {
            PerfError::DatasetConfiguration {
                dataset,
                curve_key,
                point_count,
                degree,
            } => {
                assert_eq!(dataset, "d1");
                assert_eq!(curve_key, 20.0);
                assert_eq!(point_count, 3);
                assert_eq!(degree, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_degree_reports_coefficient_count() {
        let fit = RegressionFitter::forward(4).fit(&scenario_points()).unwrap();
        assert_eq!(fit.degree(), 4);
        assert_eq!(fit.coefficients().len(), 5);
    }
}
