use crate::errors::{LseError, Result};
use crate::hyperparameters::GpHyperParams;
use crate::kernels::CovarianceKernel;
use crate::solvers::SolverStrategy;
use linfa::{Float, ParamGuard};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of candidates predicted in one batch
pub const LSE_DEFAULT_BATCH_SIZE: usize = 512;

/// Default maximum active set size, clamped to the candidate count
pub const LSE_DEFAULT_MAX_SIZE: usize = 1000;

/// Largest allowed active set: its Gram matrix and factor are allocated up front at this size
pub const LSE_MAX_ACTIVE_SIZE: usize = 10_000;

/// Score used to pick the next active point among the candidates straddling the level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum AcquisitionCriterion {
    /// Width of the confidence interval `ucb - lcb`
    #[default]
    Width,
    /// Level set ambiguity `min(ucb - level, level - lcb)`
    Ambiguity,
}

impl AcquisitionCriterion {
    /// Score of a candidate given its confidence bounds
    pub fn score<F: Float>(&self, lcb: F, ucb: F, level: F) -> F {
        match self {
            AcquisitionCriterion::Width => ucb - lcb,
            AcquisitionCriterion::Ambiguity => (ucb - level).min(level - lcb),
        }
    }
}

/// A set of validated active-set selection parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct SelectionValidParams<F: Float, K: CovarianceKernel<F>> {
    /// Covariance kernel k(x, x')
    pub(crate) kernel: K,
    /// GP hyperparameters
    pub(crate) hyper: GpHyperParams<F>,
    /// Maximum active set size, the whole pool when None
    pub(crate) max_size: Option<usize>,
    /// Threshold defining the level set
    pub(crate) level: F,
    /// Allowed cumulative misclassification probability driving the confidence schedule
    pub(crate) tolerance: F,
    /// Margin required to classify a point on one side of the level
    pub(crate) accuracy: F,
    /// Number of candidates predicted in one batch
    pub(crate) batch_size: usize,
    /// First active point, drawn at random when None
    pub(crate) start_index: Option<usize>,
    /// Linear system solver strategy
    pub(crate) solver: SolverStrategy,
    /// Selection score among straddling candidates
    pub(crate) criterion: AcquisitionCriterion,
    /// Maximum number of selection iterations
    pub(crate) max_iters: Option<usize>,
    /// Wall clock budget, checked between iterations
    pub(crate) time_budget: Option<Duration>,
    /// Predict every point at the end and compute errors against targets
    pub(crate) evaluate: bool,
    /// Seed of the random start point draw
    pub(crate) seed: Option<u64>,
    /// Size of a dedicated thread pool, the global rayon pool is used when None
    pub(crate) n_threads: Option<usize>,
}

impl<F: Float, K: CovarianceKernel<F>> Default for SelectionValidParams<F, K> {
    fn default() -> SelectionValidParams<F, K> {
        SelectionValidParams {
            kernel: K::default(),
            hyper: GpHyperParams::default(),
            max_size: Some(LSE_DEFAULT_MAX_SIZE),
            level: F::zero(),
            tolerance: F::cast(1e-2),
            accuracy: F::zero(),
            batch_size: LSE_DEFAULT_BATCH_SIZE,
            start_index: None,
            solver: SolverStrategy::default(),
            criterion: AcquisitionCriterion::default(),
            max_iters: None,
            time_budget: None,
            evaluate: true,
            seed: None,
            n_threads: None,
        }
    }
}

impl<F: Float, K: CovarianceKernel<F>> SelectionValidParams<F, K> {
    /// Get kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Get GP hyperparameters
    pub fn hyper(&self) -> &GpHyperParams<F> {
        &self.hyper
    }

    /// Get maximum active set size
    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Get level
    pub fn level(&self) -> F {
        self.level
    }

    /// Get tolerance
    pub fn tolerance(&self) -> F {
        self.tolerance
    }

    /// Get classification accuracy margin
    pub fn accuracy(&self) -> F {
        self.accuracy
    }

    /// Get batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get start index
    pub fn start_index(&self) -> Option<usize> {
        self.start_index
    }

    /// Get solver strategy
    pub fn solver(&self) -> SolverStrategy {
        self.solver
    }

    /// Get acquisition criterion
    pub fn criterion(&self) -> AcquisitionCriterion {
        self.criterion
    }

    /// Get maximum number of iterations
    pub fn max_iters(&self) -> Option<usize> {
        self.max_iters
    }

    /// Get time budget
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget
    }

    /// Whether final evaluation is performed
    pub fn evaluate(&self) -> bool {
        self.evaluate
    }

    /// Get seed
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Get thread count
    pub fn n_threads(&self) -> Option<usize> {
        self.n_threads
    }
}

#[derive(Clone, Debug)]
/// The set of parameters that can be specified for the execution of
/// the [active-set selection](crate::ActiveSetSelection).
pub struct SelectionParams<F: Float, K: CovarianceKernel<F>>(SelectionValidParams<F, K>);

impl<F: Float, K: CovarianceKernel<F>> SelectionParams<F, K> {
    /// A constructor for selection parameters given a kernel
    pub fn new(kernel: K) -> SelectionParams<F, K> {
        Self(SelectionValidParams {
            kernel,
            ..Default::default()
        })
    }

    /// A constructor for selection parameters from validated parameters
    pub fn new_from_valid(params: &SelectionValidParams<F, K>) -> Self {
        Self(params.clone())
    }

    /// Set kernel.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set GP hyperparameters.
    pub fn hyper(mut self, hyper: GpHyperParams<F>) -> Self {
        self.0.hyper = hyper;
        self
    }

    /// Set the maximum active set size.
    ///
    /// Values above the candidate count are clamped to it, None means the whole pool.
    /// The clamped size cannot exceed [`LSE_MAX_ACTIVE_SIZE`]. Defaults to [`LSE_DEFAULT_MAX_SIZE`].
    pub fn max_size(mut self, max_size: Option<usize>) -> Self {
        self.0.max_size = max_size;
        self
    }

    /// Set the level defining the level set, zero for an implicit surface
    pub fn level(mut self, level: F) -> Self {
        self.0.level = level;
        self
    }

    /// Set the tolerance of the confidence schedule, a misclassification probability in (0, 1).
    ///
    /// Smaller values widen the confidence intervals.
    pub fn tolerance(mut self, tolerance: F) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    /// Set the classification accuracy margin
    pub fn accuracy(mut self, accuracy: F) -> Self {
        self.0.accuracy = accuracy;
        self
    }

    /// Set the prediction batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.0.batch_size = batch_size;
        self
    }

    /// Set the first active point, drawn at random when None
    pub fn start_index(mut self, start_index: Option<usize>) -> Self {
        self.0.start_index = start_index;
        self
    }

    /// Set the solver strategy
    pub fn solver(mut self, solver: SolverStrategy) -> Self {
        self.0.solver = solver;
        self
    }

    /// Set the acquisition criterion
    pub fn criterion(mut self, criterion: AcquisitionCriterion) -> Self {
        self.0.criterion = criterion;
        self
    }

    /// Set the maximum number of selection iterations
    pub fn max_iters(mut self, max_iters: Option<usize>) -> Self {
        self.0.max_iters = max_iters;
        self
    }

    /// Set the wall clock budget
    pub fn time_budget(mut self, time_budget: Option<Duration>) -> Self {
        self.0.time_budget = time_budget;
        self
    }

    /// Enable (offline mode) or disable (online mode) the final evaluation
    pub fn evaluate(mut self, evaluate: bool) -> Self {
        self.0.evaluate = evaluate;
        self
    }

    /// Set the seed of the random start point draw
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.0.seed = seed;
        self
    }

    /// Set the size of a dedicated thread pool
    pub fn n_threads(mut self, n_threads: Option<usize>) -> Self {
        self.0.n_threads = n_threads;
        self
    }
}

impl<F: Float, K: CovarianceKernel<F>> From<SelectionValidParams<F, K>> for SelectionParams<F, K> {
    fn from(valid: SelectionValidParams<F, K>) -> Self {
        SelectionParams(valid)
    }
}

impl<F: Float, K: CovarianceKernel<F>> ParamGuard for SelectionParams<F, K> {
    type Checked = SelectionValidParams<F, K>;
    type Error = LseError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        self.0.hyper.check()?;
        if !(self.0.tolerance > F::zero() && self.0.tolerance < F::one()) {
            return Err(LseError::InvalidValueError(format!(
                "`tolerance` should be a probability in (0, 1), got {}",
                self.0.tolerance
            )));
        }
        if !(self.0.accuracy >= F::zero()) {
            return Err(LseError::InvalidValueError(format!(
                "`accuracy` should be positive, got {}",
                self.0.accuracy
            )));
        }
        if !self.0.level.is_finite() {
            return Err(LseError::InvalidValueError(format!(
                "`level` should be finite, got {}",
                self.0.level
            )));
        }
        if self.0.batch_size == 0 {
            return Err(LseError::InvalidValueError(
                "`batch_size` cannot be 0!".to_string(),
            ));
        }
        if self.0.max_size == Some(0) {
            return Err(LseError::InvalidValueError(
                "`max_size` cannot be 0!".to_string(),
            ));
        }
        if let Some(max_size) = self.0.max_size {
            if max_size > LSE_MAX_ACTIVE_SIZE {
                return Err(LseError::InvalidValueError(format!(
                    "`max_size` should not exceed {LSE_MAX_ACTIVE_SIZE}, got {max_size}"
                )));
            }
        }
        if self.0.n_threads == Some(0) {
            return Err(LseError::InvalidValueError(
                "`n_threads` cannot be 0!".to_string(),
            ));
        }
        if let SolverStrategy::ConjugateGradient { tol } = self.0.solver {
            if !(tol > 0.) {
                return Err(LseError::InvalidValueError(format!(
                    "Conjugate gradient tolerance should be strictly positive, got {tol}"
                )));
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::SquaredExponentialKernel;

    fn params() -> SelectionParams<f64, SquaredExponentialKernel> {
        SelectionParams::new(SquaredExponentialKernel())
    }

    #[test]
    fn test_default_params_are_valid() {
        let valid = params().check().expect("valid");
        assert_eq!(LSE_DEFAULT_BATCH_SIZE, valid.batch_size());
        assert_eq!(SolverStrategy::default(), valid.solver());
        assert_eq!(AcquisitionCriterion::Width, valid.criterion());
        assert_eq!(Some(LSE_DEFAULT_MAX_SIZE), valid.max_size());
        assert!(valid.evaluate());
    }

    #[test]
    fn test_tolerance_is_a_probability() {
        assert!(params().tolerance(0.5).check().is_ok());
        for tolerance in [1., 5., f64::INFINITY, f64::NAN] {
            assert!(matches!(
                params().tolerance(tolerance).check(),
                Err(LseError::InvalidValueError(_))
            ));
        }
        // any accepted tolerance yields a positive confidence multiplier, even for one point
        let beta: f64 = crate::algorithm::confidence_beta(1, 1, 0.999);
        assert!(beta > 0.);
    }

    #[test]
    fn test_max_size_is_bounded() {
        assert!(params().max_size(Some(LSE_MAX_ACTIVE_SIZE)).check().is_ok());
        assert!(params().max_size(None).check().is_ok());
        assert!(matches!(
            params().max_size(Some(LSE_MAX_ACTIVE_SIZE + 1)).check(),
            Err(LseError::InvalidValueError(_))
        ));
    }

    #[test]
    fn test_params_from_valid() {
        let valid = params()
            .level(0.5)
            .max_size(Some(30))
            .solver(SolverStrategy::ConjugateGradient { tol: 1e-8 })
            .check()
            .unwrap();
        let rebuilt = SelectionParams::new_from_valid(&valid)
            .check()
            .unwrap();
        assert_eq!(valid, rebuilt);
        let converted: SelectionParams<f64, SquaredExponentialKernel> = valid.clone().into();
        assert_eq!(valid, converted.check().unwrap());
    }

    #[test]
    fn test_invalid_params() {
        assert!(params().tolerance(0.).check().is_err());
        assert!(params().accuracy(-1.).check().is_err());
        assert!(params().batch_size(0).check().is_err());
        assert!(params().max_size(Some(0)).check().is_err());
        assert!(params().n_threads(Some(0)).check().is_err());
        assert!(params()
            .hyper(GpHyperParams::new(1., 1., 0.))
            .check()
            .is_err());
        assert!(params()
            .solver(SolverStrategy::ConjugateGradient { tol: 0. })
            .check()
            .is_err());
    }

    #[test]
    fn test_acquisition_scores() {
        assert_eq!(3., AcquisitionCriterion::Width.score(-1., 2., 0.));
        assert_eq!(1., AcquisitionCriterion::Ambiguity.score(-1., 2., 0.));
        assert_eq!(-0.5, AcquisitionCriterion::Ambiguity.score(0.5, 2., 0.));
    }
}
