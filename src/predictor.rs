use crate::active_set::ActiveSet;
use crate::errors::{LseError, Result};
use crate::hyperparameters::GpHyperParams;
use crate::kernels::CovarianceKernel;
use crate::pool::CandidatePool;
use crate::solvers::LinearSolver;
use linfa::Float;
use ndarray::{s, Array1, Array2, Axis, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Posterior mean and variance reduction of a set of points, aligned with the requested indices.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Prediction<F: Float> {
    /// Posterior mean `alpha . k`
    pub mean: Array1<F>,
    /// Prior variance explained by the active set `k^T (K + noise I)^-1 k`
    pub variance_reduction: Array1<F>,
}

impl<F: Float> Prediction<F> {
    /// Number of predicted points
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    /// True when no point was predicted
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Posterior variance `max(signal_variance - variance_reduction, 0)`
    pub fn posterior_variance(&self, signal_variance: F) -> Array1<F> {
        self.variance_reduction
            .mapv(|vr| (signal_variance - vr).max(F::zero()))
    }

    /// Posterior standard deviation
    pub fn posterior_std(&self, signal_variance: F) -> Array1<F> {
        self.posterior_variance(signal_variance)
            .mapv(|v| v.sqrt())
    }
}

/// Batched GP predictor against the current active set.
///
/// Kernel vectors of up to `batch_size` candidates are written into a buffer allocated
/// once at (active capacity, batch_size), then each batch gets its means from the GP
/// coefficients and its variance reductions from the solver.
#[derive(Clone, Debug)]
pub struct BatchPredictor<F: Float, K: CovarianceKernel<F>> {
    kernel: K,
    hyper: GpHyperParams<F>,
    batch_size: usize,
    kernel_vectors: Array2<F>,
}

impl<F: Float, K: CovarianceKernel<F>> BatchPredictor<F, K> {
    /// Constructor for an active set of the given capacity
    pub fn new(kernel: K, hyper: GpHyperParams<F>, capacity: usize, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        BatchPredictor {
            kernel,
            hyper,
            batch_size,
            kernel_vectors: Array2::zeros((capacity, batch_size)),
        }
    }

    /// Batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Predict the candidate points of given indices, batch after batch.
    ///
    /// The GP coefficients of `active` have to be up to date. With an empty active set
    /// the prior is returned (zero mean, no variance reduction).
    pub fn predict(
        &mut self,
        pool: &CandidatePool<F>,
        active: &ActiveSet<F>,
        solver: &dyn LinearSolver<F>,
        indices: &[usize],
    ) -> Result<Prediction<F>> {
        if let Some(&index) = indices.iter().find(|&&i| i >= pool.len()) {
            return Err(LseError::IndexOutOfRangeError {
                index,
                size: pool.len(),
            });
        }
        if !active.is_solved() {
            return Err(LseError::InvalidValueError(
                "GP coefficients are not up to date with the active set".to_string(),
            ));
        }
        if active.len() > self.kernel_vectors.nrows() {
            return Err(LseError::CapacityError(self.kernel_vectors.nrows()));
        }
        let mut mean = Array1::zeros(indices.len());
        let mut variance_reduction = Array1::zeros(indices.len());
        let n = active.len();
        if n == 0 {
            return Ok(Prediction {
                mean,
                variance_reduction,
            });
        }

        let alpha = active.alpha();
        let active_inputs = active.inputs();
        for (chunk_no, chunk) in indices.chunks(self.batch_size).enumerate() {
            let start = chunk_no * self.batch_size;
            let end = start + chunk.len();
            let queries = pool.inputs().select(Axis(0), chunk);

            let mut kv = self.kernel_vectors.slice_mut(s![..n, ..chunk.len()]);
            self.kernel.cross_covariance_into(
                &queries.view(),
                &active_inputs,
                &self.hyper,
                kv.view_mut(),
            );
            let kv = kv.view();

            Zip::from(mean.slice_mut(s![start..end]))
                .and(kv.columns())
                .for_each(|m, k| *m = k.dot(&alpha));
            variance_reduction
                .slice_mut(s![start..end])
                .assign(&solver.variance_reduction(active, &kv)?);
        }
        Ok(Prediction {
            mean,
            variance_reduction,
        })
    }

    /// Predict a single candidate point, returns (mean, variance reduction)
    pub fn predict_one(
        &mut self,
        pool: &CandidatePool<F>,
        active: &ActiveSet<F>,
        solver: &dyn LinearSolver<F>,
        index: usize,
    ) -> Result<(F, F)> {
        let pred = self.predict(pool, active, solver, &[index])?;
        Ok((pred.mean[0], pred.variance_reduction[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::SquaredExponentialKernel;
    use crate::solvers::{Factorization, SolverStrategy};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    type Setup = (CandidatePool<f64>, ActiveSet<f64>, Box<dyn LinearSolver<f64>>);

    fn setup(strategy: SolverStrategy) -> Setup {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array::<f64, _>::random_using((40, 2), Uniform::new(0., 6.), &mut rng);
        let y = x.map_axis(Axis(1), |r| r[0].sin() + r[1].cos());
        let mut pool = CandidatePool::new(&x, &y).unwrap();
        let hyper = GpHyperParams::new(1., 1., 1e-1);
        let mut active = ActiveSet::with_capacity(8, 2);
        let mut solver = strategy.build::<f64>();
        for i in [0, 5, 10, 15, 20, 25, 30, 35] {
            pool.activate(i).unwrap();
            active
                .push(i, &pool.input(i).unwrap(), y[i], &SquaredExponentialKernel(), &hyper)
                .unwrap();
            solver.refresh(&mut active).unwrap();
        }
        (pool, active, solver)
    }

    #[test]
    fn test_single_and_batch_predictions_agree() {
        let (pool, active, solver) = setup(SolverStrategy::default());
        let hyper = GpHyperParams::new(1., 1., 1e-1);
        let mut predictor = BatchPredictor::new(SquaredExponentialKernel(), hyper, 8, 7);
        let indices: Vec<usize> = pool.candidate_indices().collect();
        let batch = predictor
            .predict(&pool, &active, solver.as_ref(), &indices)
            .unwrap();
        assert_eq!(32, batch.len());
        for (j, &i) in indices.iter().enumerate() {
            let (mean, vr) = predictor
                .predict_one(&pool, &active, solver.as_ref(), i)
                .unwrap();
            assert_abs_diff_eq!(mean, batch.mean[j], epsilon = 1e-12);
            assert_abs_diff_eq!(vr, batch.variance_reduction[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_predictions_of_solver_strategies_agree() {
        let (pool, active, chol) = setup(SolverStrategy::Cholesky(Factorization::Full));
        let (_, cg_active, cg) = setup(SolverStrategy::ConjugateGradient { tol: 1e-24 });
        let hyper = GpHyperParams::new(1., 1., 1e-1);
        let mut predictor = BatchPredictor::new(SquaredExponentialKernel(), hyper, 8, 16);
        let indices: Vec<usize> = (0..40).collect();
        let p1 = predictor
            .predict(&pool, &active, chol.as_ref(), &indices)
            .unwrap();
        let p2 = predictor
            .predict(&pool, &cg_active, cg.as_ref(), &indices)
            .unwrap();
        assert_abs_diff_eq!(p1.mean, p2.mean, epsilon = 1e-6);
        assert_abs_diff_eq!(p1.variance_reduction, p2.variance_reduction, epsilon = 1e-6);
        let var = p1.posterior_variance(1.);
        assert!(var.iter().all(|&v| (0. ..=1.).contains(&v)));
    }

    #[test]
    fn test_empty_active_set_gives_prior() {
        let pool = CandidatePool::new(&array![[0.], [1.]], &array![1., 2.]).unwrap();
        let active = ActiveSet::with_capacity(2, 1);
        let solver = SolverStrategy::default().build::<f64>();
        let mut predictor =
            BatchPredictor::new(SquaredExponentialKernel(), GpHyperParams::default(), 2, 4);
        let pred = predictor
            .predict(&pool, &active, solver.as_ref(), &[0, 1])
            .unwrap();
        assert_eq!(array![0., 0.], pred.mean);
        assert_eq!(array![1., 1.], pred.posterior_std(1.));
        let res = predictor.predict(&pool, &active, solver.as_ref(), &[2]);
        assert!(matches!(res, Err(LseError::IndexOutOfRangeError { .. })));
    }
}
