use crate::errors::{LseError, Result};
use crate::hyperparameters::GpHyperParams;
use crate::kernels::CovarianceKernel;
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// The growing set of active points of a selection run.
///
/// All buffers (inputs, targets, Gram matrix, upper Cholesky factor and GP coefficients)
/// are allocated once at `capacity` and filled in place: adding a point only advances
/// the active count. The Gram matrix includes the noise variance on its diagonal.
///
/// The factor `U` (with `K = U^T U`) and the coefficients carry their own fill count,
/// so a stale factor or stale coefficients can always be detected.
#[derive(Clone, Debug)]
pub struct ActiveSet<F: Float> {
    indices: Vec<usize>,
    inputs: Array2<F>,
    targets: Array1<F>,
    gram: Array2<F>,
    factor: Array2<F>,
    alpha: Array1<F>,
    factor_len: usize,
    alpha_len: usize,
}

impl<F: Float> ActiveSet<F> {
    /// Allocate an empty active set able to hold `capacity` points of dimension `dim`
    pub fn with_capacity(capacity: usize, dim: usize) -> Self {
        ActiveSet {
            indices: Vec::with_capacity(capacity),
            inputs: Array2::zeros((capacity, dim)),
            targets: Array1::zeros(capacity),
            gram: Array2::zeros((capacity, capacity)),
            factor: Array2::zeros((capacity, capacity)),
            alpha: Array1::zeros(capacity),
            factor_len: 0,
            alpha_len: 0,
        }
    }

    /// Maximum number of active points
    pub fn capacity(&self) -> usize {
        self.targets.len()
    }

    /// Current number of active points
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True when no point is active
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// True when no more point can be added
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Input dimension
    pub fn dim(&self) -> usize {
        self.inputs.ncols()
    }

    /// Candidate pool indices of active points in selection order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Active inputs (len, dim)
    pub fn inputs(&self) -> ArrayView2<F> {
        self.inputs.slice(s![..self.len(), ..])
    }

    /// Active targets
    pub fn targets(&self) -> ArrayView1<F> {
        self.targets.slice(s![..self.len()])
    }

    /// Active Gram matrix (len, len), noise included
    pub fn gram(&self) -> ArrayView2<F> {
        let n = self.len();
        self.gram.slice(s![..n, ..n])
    }

    /// Upper Cholesky factor of the Gram matrix over the factored points
    pub fn factor(&self) -> ArrayView2<F> {
        let n = self.factor_len;
        self.factor.slice(s![..n, ..n])
    }

    /// GP coefficients `(K + noise I)^-1 t` over the solved points
    pub fn alpha(&self) -> ArrayView1<F> {
        self.alpha.slice(s![..self.alpha_len])
    }

    /// True when the factor covers every active point
    pub fn is_factor_current(&self) -> bool {
        self.factor_len == self.len()
    }

    /// True when the coefficients cover every active point
    pub fn is_solved(&self) -> bool {
        self.alpha_len == self.len()
    }

    /// Append a point: copy its input and target and write its Gram row and column.
    ///
    /// Factor and coefficients are left untouched and become stale.
    pub fn push<K: CovarianceKernel<F>>(
        &mut self,
        index: usize,
        x: &ArrayView1<F>,
        target: F,
        kernel: &K,
        hyper: &GpHyperParams<F>,
    ) -> Result<()> {
        if self.is_full() {
            return Err(LseError::CapacityError(self.capacity()));
        }
        if x.len() != self.dim() {
            return Err(LseError::DimensionError {
                expected: self.dim(),
                actual: x.len(),
            });
        }
        let k = self.len();
        self.inputs.row_mut(k).assign(x);
        self.targets[k] = target;

        let previous = self.inputs.slice(s![..k, ..]);
        let kv = kernel.vector(x, &previous, hyper);
        self.gram.slice_mut(s![..k, k]).assign(&kv);
        self.gram.slice_mut(s![k, ..k]).assign(&kv);
        self.gram[[k, k]] = kernel.covariance(x, x, hyper) + hyper.noise_variance();

        self.indices.push(index);
        Ok(())
    }

    /// Recompute the factor of the whole active Gram matrix from scratch.
    pub fn factorize(&mut self) -> Result<()> {
        let n = self.len();
        if n > 0 {
            let lower = self.gram.slice(s![..n, ..n]).cholesky()?;
            self.factor.slice_mut(s![..n, ..n]).assign(&lower.t());
        }
        self.factor_len = n;
        Ok(())
    }

    /// Extend the factor with one new column per active point not yet factored.
    ///
    /// For the new column `j`, `g` solves `U[..j, ..j]^T g = K[..j, j]` and the new
    /// diagonal entry is `sqrt(K[j, j] - g.g)`. A non positive pivot means the point is
    /// numerically dependent on the current active set and fails.
    pub fn extend_factor(&mut self) -> Result<()> {
        for j in self.factor_len..self.len() {
            let pivot = if j == 0 {
                self.gram[[0, 0]]
            } else {
                let rhs = self.gram.slice(s![..j, j..j + 1]);
                let u = self.factor.slice(s![..j, ..j]);
                let g = u.t().solve_triangular(&rhs, UPLO::Lower)?;
                let g = g.column(0);
                let pivot = self.gram[[j, j]] - g.dot(&g);
                self.factor.slice_mut(s![..j, j]).assign(&g);
                self.factor.slice_mut(s![j, ..j]).fill(F::zero());
                pivot
            };
            if !(pivot > F::zero()) {
                return Err(LseError::NotPositiveDefiniteError(format!(
                    "pivot {} for active point {} (candidate {})",
                    pivot, j, self.indices[j]
                )));
            }
            self.factor[[j, j]] = pivot.sqrt();
            self.factor_len = j + 1;
        }
        Ok(())
    }

    /// Solve `U^T U alpha = t` with the current factor.
    pub fn solve_with_factor(&mut self) -> Result<()> {
        if !self.is_factor_current() {
            return Err(LseError::InvalidValueError(format!(
                "Cholesky factor covers {} of {} active points",
                self.factor_len,
                self.len()
            )));
        }
        let n = self.len();
        if n > 0 {
            let u = self.factor.slice(s![..n, ..n]);
            let t = self.targets.slice(s![..n]).insert_axis(Axis(1));
            let z = u.t().solve_triangular(&t, UPLO::Lower)?;
            let a = u.solve_triangular(&z, UPLO::Upper)?;
            self.alpha.slice_mut(s![..n]).assign(&a.column(0));
        }
        self.alpha_len = n;
        Ok(())
    }

    /// Set coefficients computed elsewhere for the whole active set
    pub fn set_alpha(&mut self, alpha: &ArrayView1<F>) -> Result<()> {
        if alpha.len() != self.len() {
            return Err(LseError::DimensionError {
                expected: self.len(),
                actual: alpha.len(),
            });
        }
        self.alpha.slice_mut(s![..alpha.len()]).assign(alpha);
        self.alpha_len = alpha.len();
        Ok(())
    }

    /// Solve `U^T w = k` for each column `k` of the (len, m) kernel vectors.
    pub fn whiten(&self, kernel_vectors: &ArrayView2<F>) -> Result<Array2<F>> {
        if !self.is_factor_current() {
            return Err(LseError::InvalidValueError(format!(
                "Cholesky factor covers {} of {} active points",
                self.factor_len,
                self.len()
            )));
        }
        let n = self.len();
        if n == 0 {
            return Ok(Array2::zeros((0, kernel_vectors.ncols())));
        }
        let u = self.factor.slice(s![..n, ..n]);
        Ok(u.t().solve_triangular(kernel_vectors, UPLO::Lower)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::SquaredExponentialKernel;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    fn fill(points: &Array2<f64>, hyper: &GpHyperParams<f64>) -> ActiveSet<f64> {
        let mut active = ActiveSet::with_capacity(points.nrows(), points.ncols());
        for (i, x) in points.rows().into_iter().enumerate() {
            active
                .push(i, &x, i as f64, &SquaredExponentialKernel(), hyper)
                .expect("push");
        }
        active
    }

    #[test]
    fn test_gram_stays_positive_definite() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let points = Array::random_using((12, 2), Uniform::new(0., 3.), &mut rng);
        let hyper = GpHyperParams::new(0.5, 1., 1e-3);
        let mut active = ActiveSet::with_capacity(12, 2);
        for (i, x) in points.rows().into_iter().enumerate() {
            active
                .push(i, &x, 0., &SquaredExponentialKernel(), &hyper)
                .expect("push");
            let gram = active.gram().to_owned();
            assert_abs_diff_eq!(gram, gram.t().to_owned(), epsilon = 1e-15);
            assert!(gram.cholesky().is_ok());
            active.extend_factor().expect("factor");
            assert!(active.is_factor_current());
        }
    }

    #[test]
    fn test_incremental_and_full_factors_agree() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let points = Array::random_using((10, 3), Uniform::new(-1., 1.), &mut rng);
        let hyper = GpHyperParams::new(1., 1.5, 1e-2);

        let mut incremental = ActiveSet::with_capacity(10, 3);
        let mut full = ActiveSet::with_capacity(10, 3);
        for (i, x) in points.rows().into_iter().enumerate() {
            incremental
                .push(i, &x, 0., &SquaredExponentialKernel(), &hyper)
                .unwrap();
            full.push(i, &x, 0., &SquaredExponentialKernel(), &hyper)
                .unwrap();
            incremental.extend_factor().unwrap();
            full.factorize().unwrap();
            assert_abs_diff_eq!(incremental.factor(), full.factor(), epsilon = 1e-10);
        }
        let u = full.factor();
        assert_abs_diff_eq!(u.t().dot(&u), full.gram(), epsilon = 1e-10);
    }

    #[test]
    fn test_extend_after_several_pushes() {
        let points = array![[0.], [0.5], [1.5], [3.]];
        let hyper = GpHyperParams::default();
        let mut active = fill(&points, &hyper);
        assert!(!active.is_factor_current());
        active.extend_factor().unwrap();
        let mut reference = fill(&points, &hyper);
        reference.factorize().unwrap();
        assert_abs_diff_eq!(active.factor(), reference.factor(), epsilon = 1e-12);
    }

    #[test]
    fn test_solve_with_factor() {
        let points = array![[0.], [0.5], [1.5], [3.]];
        let hyper = GpHyperParams::default();
        let mut active = fill(&points, &hyper);
        assert!(active.solve_with_factor().is_err());
        active.factorize().unwrap();
        active.solve_with_factor().unwrap();
        assert!(active.is_solved());
        let residual = active.gram().dot(&active.alpha()) - active.targets();
        assert_abs_diff_eq!(residual, Array1::<f64>::zeros(4), epsilon = 1e-10);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let points = array![[0.], [1.]];
        let hyper = GpHyperParams::default();
        let mut active = fill(&points, &hyper);
        let x = array![2.];
        let res = active.push(2, &x.view(), 0., &SquaredExponentialKernel(), &hyper);
        assert!(matches!(res, Err(LseError::CapacityError(2))));
        let mut active = ActiveSet::<f64>::with_capacity(2, 2);
        let res = active.push(0, &x.view(), 0., &SquaredExponentialKernel(), &hyper);
        assert!(matches!(res, Err(LseError::DimensionError { .. })));
    }

    #[test]
    fn test_duplicate_point_without_noise_is_not_positive_definite() {
        let hyper = GpHyperParams::new(1., 1., 1e-300);
        let mut active = ActiveSet::with_capacity(2, 1);
        let x = array![0.5];
        active
            .push(0, &x.view(), 1., &SquaredExponentialKernel(), &hyper)
            .unwrap();
        active
            .push(7, &x.view(), 1., &SquaredExponentialKernel(), &hyper)
            .unwrap();
        let res = active.extend_factor();
        assert!(matches!(res, Err(LseError::NotPositiveDefiniteError(_))));
        assert_eq!(1, active.factor().nrows());
    }
}
