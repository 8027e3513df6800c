//! Prediction error statistics of a selection run.
//!
//! Errors are absolute differences between predicted and true targets, computed over the
//! points which never entered the active set (classified or still undetermined).

use crate::errors::{LseError, Result};
use crate::pool::ClassificationState;
use linfa::Float;
use ndarray::{Array1, ArrayBase, ArrayView1, Data, Ix1, Zip};
use ndarray_stats::QuantileExt;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary of absolute prediction errors
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct PredictionError<F: Float> {
    /// Mean absolute error
    pub mean: F,
    /// Standard deviation of absolute errors
    pub std: F,
    /// Median absolute error
    pub median: F,
    /// Smallest absolute error
    pub min: F,
    /// Largest absolute error
    pub max: F,
    /// Number of evaluated points
    pub n_points: usize,
}

impl<F: Float> PredictionError<F> {
    /// Statistics of the given absolute errors, all zeros when there is none
    pub fn from_errors(errors: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Self> {
        if errors.is_empty() {
            return Ok(PredictionError {
                mean: F::zero(),
                std: F::zero(),
                median: F::zero(),
                min: F::zero(),
                max: F::zero(),
                n_points: 0,
            });
        }
        let n = errors.len();
        let mean = errors.sum() / F::cast(n);
        let std = errors.std(F::zero());
        let min = *errors.min()?;
        let max = *errors.max()?;

        let mut sorted = errors.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / F::cast(2.)
        };
        Ok(PredictionError {
            mean,
            std,
            median,
            min,
            max,
            n_points: n,
        })
    }
}

impl<F: Float> fmt::Display for PredictionError<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PredictionError(n={}, mean={}, std={}, median={}, min={}, max={})",
            self.n_points, self.mean, self.std, self.median, self.min, self.max
        )
    }
}

/// Absolute prediction errors over the never-activated points and their statistics.
pub fn prediction_error<F: Float>(
    predictions: &ArrayBase<impl Data<Elem = F>, Ix1>,
    targets: &ArrayBase<impl Data<Elem = F>, Ix1>,
    states: &[ClassificationState],
) -> Result<PredictionError<F>> {
    if predictions.len() != targets.len() || states.len() != targets.len() {
        return Err(LseError::DimensionError {
            expected: targets.len(),
            actual: if predictions.len() != targets.len() {
                predictions.len()
            } else {
                states.len()
            },
        });
    }
    let mut errors = Vec::with_capacity(targets.len());
    Zip::from(predictions)
        .and(targets)
        .and(ArrayView1::from(states))
        .for_each(|&p, &t, &s| {
            if s != ClassificationState::Active {
                errors.push(num_traits::Float::abs(p - t));
            }
        });
    PredictionError::from_errors(&Array1::from(errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_statistics() {
        let errors = array![3., 1., 4., 1., 5., 9.];
        let stats = PredictionError::from_errors(&errors).unwrap();
        assert_abs_diff_eq!(23. / 6., stats.mean, epsilon = 1e-12);
        assert_abs_diff_eq!(3.5, stats.median, epsilon = 1e-12);
        assert_eq!(1., stats.min);
        assert_eq!(9., stats.max);
        let var = errors.mapv(|e: f64| (e - 23. / 6.).powi(2)).sum() / 6.;
        assert_abs_diff_eq!(var.sqrt(), stats.std, epsilon = 1e-12);
        assert_eq!(6, stats.n_points);
    }

    #[test]
    fn test_active_points_are_skipped() {
        use ClassificationState::*;
        let predictions = array![1., 0.5, -1., 2.];
        let targets = array![1., 1., 0., 2.];
        let states = [Active, ClassifiedAbove, ClassifiedBelow, Undetermined];
        let stats = prediction_error(&predictions, &targets, &states).unwrap();
        assert_eq!(3, stats.n_points);
        assert_abs_diff_eq!(0.5, stats.mean, epsilon = 1e-12);
        assert_abs_diff_eq!(0.5, stats.median, epsilon = 1e-12);
        assert_eq!(0., stats.min);
        assert_eq!(1., stats.max);
    }

    #[test]
    fn test_no_evaluated_point() {
        let states = [ClassificationState::Active; 2];
        let stats = prediction_error(&array![1., 2.], &array![0., 0.], &states).unwrap();
        assert_eq!(PredictionError::default(), stats);
    }

    #[test]
    fn test_mismatched_lengths() {
        let states = [ClassificationState::Active; 3];
        let res = prediction_error(&array![1., 2.], &array![0., 0.], &states);
        assert!(matches!(res, Err(LseError::DimensionError { .. })));
    }
}
