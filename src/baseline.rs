//! Full-inversion GP regression over a whole point set.
//!
//! No active learning here: the Gram matrix of every given point is factored at once.
//! It serves as a reference for the active-set selection, both being expected to agree
//! when the selection ends up activating every point.

use crate::errors::{LseError, Result};
use crate::hyperparameters::GpHyperParams;
use crate::kernels::CovarianceKernel;
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Full-inversion regression parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FullInversion<F: Float, K: CovarianceKernel<F>> {
    kernel: K,
    hyper: GpHyperParams<F>,
}

impl<F: Float, K: CovarianceKernel<F>> FullInversion<F, K> {
    /// Constructor
    pub fn new(kernel: K, hyper: GpHyperParams<F>) -> Self {
        FullInversion { kernel, hyper }
    }

    /// Factor the Gram matrix of all inputs (one row per point) and solve for the GP coefficients
    pub fn fit(
        &self,
        inputs: &ArrayBase<impl Data<Elem = F>, Ix2>,
        targets: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<FullPosterior<F, K>> {
        if inputs.nrows() != targets.len() {
            return Err(LseError::DimensionError {
                expected: inputs.nrows(),
                actual: targets.len(),
            });
        }
        if inputs.nrows() == 0 {
            return Err(LseError::InvalidValueError(
                "Cannot regress an empty point set".to_string(),
            ));
        }
        self.hyper.check()?;

        let gram = self.kernel.gram(&inputs.view(), &self.hyper);
        let lower = gram.cholesky()?;
        let t = targets.to_owned().insert_axis(Axis(1));
        let z = lower.solve_triangular(&t, UPLO::Lower)?;
        let alpha = lower.t().solve_triangular(&z, UPLO::Upper)?;
        debug!("Full inversion of {} points", inputs.nrows());

        Ok(FullPosterior {
            kernel: self.kernel,
            hyper: self.hyper,
            inputs: inputs.to_owned(),
            lower,
            alpha: alpha.column(0).to_owned(),
        })
    }
}

/// GP posterior conditioned on every point of a set
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct FullPosterior<F: Float, K: CovarianceKernel<F>> {
    kernel: K,
    hyper: GpHyperParams<F>,
    inputs: Array2<F>,
    /// Lower Cholesky factor of the Gram matrix
    lower: Array2<F>,
    alpha: Array1<F>,
}

impl<F: Float, K: CovarianceKernel<F>> FullPosterior<F, K> {
    /// GP coefficients, aligned with the fitted inputs
    pub fn alpha(&self) -> ArrayView1<F> {
        self.alpha.view()
    }

    /// Posterior mean at n points given as a (n, dim) matrix
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let kv = self.kernel_vectors(x)?;
        Ok(kv.t().dot(&self.alpha))
    }

    /// Posterior variance at n points given as a (n, dim) matrix
    pub fn predict_variance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let kv = self.kernel_vectors(x)?;
        let w = self.lower.solve_triangular(&kv, UPLO::Lower)?;
        let sv = self.hyper.signal_variance;
        Ok(w.map_axis(Axis(0), |c| (sv - c.dot(&c)).max(F::zero())))
    }

    fn kernel_vectors(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        if x.ncols() != self.inputs.ncols() {
            return Err(LseError::DimensionError {
                expected: self.inputs.ncols(),
                actual: x.ncols(),
            });
        }
        let mut kv = Array2::zeros((self.inputs.nrows(), x.nrows()));
        self.kernel
            .cross_covariance_into(&x.view(), &self.inputs.view(), &self.hyper, kv.view_mut());
        Ok(kv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{LevelSetSelector, Termination};
    use crate::kernels::SquaredExponentialKernel;
    use crate::pool::ClassificationState;
    use crate::solvers::SolverStrategy;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::*;
    use ndarray::{array, Array};

    #[test]
    fn test_interpolation() {
        let xt = array![[0.], [1.], [2.5], [4.]];
        let yt = array![0., 1., -0.5, 2.];
        let hyper = GpHyperParams::new(1., 1., 1e-10);
        let posterior = FullInversion::new(SquaredExponentialKernel(), hyper)
            .fit(&xt, &yt)
            .expect("full inversion");
        assert_abs_diff_eq!(posterior.predict(&xt).unwrap(), yt, epsilon = 1e-6);
        let var = posterior.predict_variance(&xt).unwrap();
        assert!(var.iter().all(|&v| v < 1e-6));
        let far = posterior.predict_variance(&array![[50.]]).unwrap();
        assert_abs_diff_eq!(1., far[0], epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        let fi = FullInversion::new(SquaredExponentialKernel(), GpHyperParams::<f64>::default());
        assert!(matches!(
            fi.fit(&array![[0.], [1.]], &array![1.]),
            Err(LseError::DimensionError { .. })
        ));
        let posterior = fi.fit(&array![[0.], [1.]], &array![1., 2.]).unwrap();
        assert!(posterior.predict(&array![[0., 1.]]).is_err());
    }

    #[test]
    fn test_agrees_with_full_active_set() {
        // targets small enough for every candidate to straddle the level until activated
        let xt = Array::linspace(0., 11., 12).insert_axis(Axis(1));
        let yt = xt.column(0).mapv(|x: f64| 1e-3 * x.sin());
        let hyper = GpHyperParams::new(1., 1., 1e-1);
        let ds = Dataset::new(xt.clone(), yt.clone());

        let posterior = FullInversion::new(SquaredExponentialKernel(), hyper)
            .fit(&xt, &yt)
            .expect("full inversion");
        let expected = posterior.predict(&xt).unwrap();

        for solver in [
            SolverStrategy::default(),
            SolverStrategy::ConjugateGradient { tol: 1e-24 },
        ] {
            let selection = LevelSetSelector::params()
                .hyper(hyper)
                .start_index(Some(5))
                .solver(solver)
                .fit(&ds)
                .expect("selection");
            assert_eq!(Termination::MaxSize, selection.termination());
            assert_eq!(12, selection.count(ClassificationState::Active));
            assert_abs_diff_eq!(
                expected.view(),
                selection.predictions().unwrap(),
                epsilon = 1e-8
            );
        }
    }
}
