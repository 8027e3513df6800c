//! A module for covariance kernels used by the active-set gaussian process.
//!
//! The following kernel is implemented:
//! * squared exponential,
//!
//! A kernel is evaluated from the squared euclidean distance between two points,
//! so that single values, kernel vectors against the active set and batches of
//! kernel vectors all go through the same scalar formula.

use crate::hyperparameters::GpHyperParams;
use crate::utils::squared_distance;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trait for covariance kernels k(x, x') of a stationary gaussian process
pub trait CovarianceKernel<F: Float>: Clone + Copy + Default + fmt::Display + Sync + Send {
    /// Kernel value given the squared distance between two points
    fn value(&self, sq_dist: F, hyper: &GpHyperParams<F>) -> F;

    /// Covariance between two points without noise term.
    ///
    /// *Panics* if dimensions of `x` and `y` differ.
    fn covariance(&self, x: &ArrayView1<F>, y: &ArrayView1<F>, hyper: &GpHyperParams<F>) -> F {
        self.value(squared_distance(x, y), hyper)
    }

    /// Write covariances between `x` and each row of `points` in `out`.
    ///
    /// *Panics* if `out` length is not `points.nrows()` or if dimensions differ.
    fn vector_into(
        &self,
        x: &ArrayView1<F>,
        points: &ArrayView2<F>,
        hyper: &GpHyperParams<F>,
        mut out: ArrayViewMut1<F>,
    ) {
        assert_eq!(
            out.len(),
            points.nrows(),
            "Kernel vector length should match active point count"
        );
        Zip::from(&mut out)
            .and(points.rows())
            .for_each(|k, p| *k = self.covariance(x, &p, hyper));
    }

    /// Kernel vector between `x` and each row of `points`
    fn vector(
        &self,
        x: &ArrayView1<F>,
        points: &ArrayView2<F>,
        hyper: &GpHyperParams<F>,
    ) -> Array1<F> {
        let mut out = Array1::zeros(points.nrows());
        self.vector_into(x, points, hyper, out.view_mut());
        out
    }

    /// Batch of kernel vectors: column `j` of `out` (points.nrows(), queries.nrows())
    /// receives the kernel vector of the j-th query. Columns are computed in parallel.
    fn cross_covariance_into(
        &self,
        queries: &ArrayView2<F>,
        points: &ArrayView2<F>,
        hyper: &GpHyperParams<F>,
        mut out: ArrayViewMut2<F>,
    ) {
        assert_eq!(out.dim(), (points.nrows(), queries.nrows()));
        Zip::from(out.columns_mut())
            .and(queries.rows())
            .par_for_each(|col, q| self.vector_into(&q, points, hyper, col));
    }

    /// Gram matrix of `points` with the noise variance added on the diagonal
    fn gram(&self, points: &ArrayView2<F>, hyper: &GpHyperParams<F>) -> Array2<F> {
        let n = points.nrows();
        let mut gram = Array2::zeros((n, n));
        self.cross_covariance_into(points, points, hyper, gram.view_mut());
        gram.diag_mut().mapv_inplace(|v| v + hyper.noise_variance());
        gram
    }
}

/// Squared exponential kernel
/// k(x, x') = signal_variance * exp(-|x - x'|^2 / (2 * length_scale))
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct SquaredExponentialKernel();

impl<F: Float> CovarianceKernel<F> for SquaredExponentialKernel {
    fn value(&self, sq_dist: F, hyper: &GpHyperParams<F>) -> F {
        hyper.signal_variance * (-sq_dist / (F::cast(2.) * hyper.length_scale)).exp()
    }
}

impl fmt::Display for SquaredExponentialKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}
