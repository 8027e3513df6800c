use crate::active_set::ActiveSet;
use crate::context::ComputeContext;
use crate::errors::{LseError, Result};
use crate::hyperparameters::GpHyperParams;
use crate::kernels::{CovarianceKernel, SquaredExponentialKernel};
use crate::metrics::{prediction_error, PredictionError};
use crate::parameters::{SelectionParams, SelectionValidParams, LSE_MAX_ACTIVE_SIZE};
use crate::pool::{CandidatePool, ClassificationState};
use crate::predictor::BatchPredictor;
use crate::solvers::LinearSolver;

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2};
use ndarray_npy::write_npy;
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

use log::{debug, info};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

/// Confidence multiplier `beta_k = 2 ln(N pi^2 k^2 / (6 tolerance))` at iteration `k` (starting at 1)
/// for a pool of `n_points` candidates.
///
/// With this schedule the probability that any point is misclassified over the whole run
/// stays below `tolerance`. It grows with `k`, tightening the requirements as more points are queried.
pub fn confidence_beta<F: Float>(n_points: usize, iteration: usize, tolerance: F) -> F {
    let pi = F::cast(std::f64::consts::PI);
    let k = F::cast(iteration);
    F::cast(2.) * (F::cast(n_points) * pi * pi * k * k / (F::cast(6.) * tolerance)).ln()
}

/// Record of one selection step
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct SelectionStep<F: Float> {
    /// Candidate pool index of the selected point
    pub index: usize,
    /// Acquisition score of the selected point, zero for the start point
    pub score: F,
    /// Confidence multiplier used at this step, zero for the start point
    pub beta: F,
    /// Number of undetermined candidates left after this step
    pub n_undetermined: usize,
}

/// Why a selection run stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Termination {
    /// Active set reached its maximum size
    MaxSize,
    /// No candidate straddles the level anymore
    NoAmbiguousCandidate,
    /// Maximum number of iterations reached
    IterationBudget,
    /// Wall clock budget exhausted
    TimeBudget,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Termination::MaxSize => "max active set size reached",
            Termination::NoAmbiguousCandidate => "no ambiguous candidate left",
            Termination::IterationBudget => "iteration budget exhausted",
            Termination::TimeBudget => "time budget exhausted",
        };
        write!(f, "{s}")
    }
}

/// Active-set selection for GP regression driven by level set estimation.
///
/// Starting from a single point, each iteration predicts every undetermined candidate of the pool,
/// builds its confidence interval `mean +/- sqrt(beta_k) * std` and
/// * classifies it above the level when `lcb + accuracy > level`,
/// * classifies it below the level when `ucb - accuracy < level`,
/// * otherwise keeps it as a straddling candidate.
///
/// The straddling candidate of best [acquisition score](crate::AcquisitionCriterion) (lowest index
/// on ties) joins the active set, whose Gram matrix and linear system are updated by the chosen
/// [solver strategy](crate::SolverStrategy). The run stops when the active set is full, when no
/// candidate straddles the level or when an iteration or time budget is exhausted.
///
/// The result holds the selection trajectory, the final classification of every point and the
/// active inputs, targets and GP coefficients from which the posterior mean can be rebuilt.
///
/// # Example
///
/// ```no_run
/// use lsegp::{LevelSetSelector, GpHyperParams};
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// let xt = array![[0.0], [0.1], [3.0], [3.1]];
/// let yt = array![-1.0, -1.0, 1.0, 1.0];
///
/// let selection = LevelSetSelector::params()
///     .hyper(GpHyperParams::new(1.0, 1.0, 0.01))
///     .tolerance(0.1)
///     .start_index(Some(0))
///     .fit(&Dataset::new(xt, yt))
///     .expect("selection");
/// println!("selected {:?}", selection.indices());
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct ActiveSetSelection<F: Float, K: CovarianceKernel<F>> {
    /// Covariance kernel
    kernel: K,
    /// GP hyperparameters
    hyper: GpHyperParams<F>,
    /// Level threshold
    level: F,
    /// Selected points in selection order
    steps: Vec<SelectionStep<F>>,
    /// Final state of every candidate point
    states: Vec<ClassificationState>,
    /// Active inputs (n_active, dim)
    inputs: Array2<F>,
    /// Active targets
    targets: Array1<F>,
    /// GP coefficients
    alpha: Array1<F>,
    /// Stop reason
    termination: Termination,
    /// Number of selection iterations after the start point
    n_iters: usize,
    /// Wall clock time of the selection loop
    elapsed: Duration,
    /// Posterior mean of every candidate point (offline mode)
    predictions: Option<Array1<F>>,
    /// Prediction errors over never-activated points (offline mode)
    error: Option<PredictionError<F>>,
}

/// Level set selection with the squared exponential kernel
pub type LevelSetSelector<F> = SelectionParams<F, SquaredExponentialKernel>;

impl<F: Float> LevelSetSelector<F> {
    /// Selection parameters constructor
    pub fn params() -> SelectionParams<F, SquaredExponentialKernel> {
        SelectionParams::new(SquaredExponentialKernel())
    }
}

impl<F: Float, K: CovarianceKernel<F>> fmt::Display for ActiveSetSelection<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ActiveSetSelection(kernel={}, n_active={}, n_iters={}, termination={})",
            self.kernel,
            self.steps.len(),
            self.n_iters,
            self.termination
        )
    }
}

impl<F: Float, K: CovarianceKernel<F>> ActiveSetSelection<F, K> {
    /// Selection parameters constructor given a kernel.
    ///
    /// The result type is not involved in the call, so both type parameters are spelled out:
    ///
    /// ```
    /// use linfa::ParamGuard;
    /// use lsegp::kernels::SquaredExponentialKernel;
    /// use lsegp::ActiveSetSelection;
    ///
    /// let params =
    ///     ActiveSetSelection::<f64, SquaredExponentialKernel>::params(SquaredExponentialKernel())
    ///         .max_size(Some(50));
    /// assert!(params.check_ref().is_ok());
    /// ```
    pub fn params<NewK: CovarianceKernel<F>>(kernel: NewK) -> SelectionParams<F, NewK> {
        SelectionParams::new(kernel)
    }

    /// Candidate pool indices of the active points in selection order
    pub fn indices(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.index).collect()
    }

    /// Selection trajectory
    pub fn steps(&self) -> &[SelectionStep<F>] {
        &self.steps
    }

    /// Final classification state of every candidate point
    pub fn states(&self) -> &[ClassificationState] {
        &self.states
    }

    /// Number of points in the given state
    pub fn count(&self, state: ClassificationState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }

    /// Active inputs in selection order
    pub fn active_inputs(&self) -> ArrayView2<F> {
        self.inputs.view()
    }

    /// Active targets in selection order
    pub fn active_targets(&self) -> ArrayView1<F> {
        self.targets.view()
    }

    /// GP coefficients of the active points
    pub fn alpha(&self) -> ArrayView1<F> {
        self.alpha.view()
    }

    /// Kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// GP hyperparameters
    pub fn hyper(&self) -> &GpHyperParams<F> {
        &self.hyper
    }

    /// Level threshold
    pub fn level(&self) -> F {
        self.level
    }

    /// Stop reason
    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Number of selection iterations after the start point
    pub fn n_iters(&self) -> usize {
        self.n_iters
    }

    /// Wall clock time of the selection loop
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Posterior mean of every candidate point, available in offline mode
    pub fn predictions(&self) -> Option<ArrayView1<F>> {
        self.predictions.as_ref().map(|p| p.view())
    }

    /// Prediction errors over never-activated points, available in offline mode
    pub fn prediction_error(&self) -> Option<&PredictionError<F>> {
        self.error.as_ref()
    }

    /// Posterior mean at n points given as a (n, dim) matrix
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let kv = self.kernel_vectors(x)?;
        Ok(kv.t().dot(&self.alpha))
    }

    /// Posterior variance at n points given as a (n, dim) matrix
    pub fn predict_variance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let kv = self.kernel_vectors(x)?;
        let gram = self.kernel.gram(&self.inputs.view(), &self.hyper);
        let lower = gram.cholesky()?;
        let w = lower.solve_triangular(&kv, UPLO::Lower)?;
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

    /// Active set as records: one row per active point with columns (input..., target, alpha)
    pub fn active_records(&self) -> Array2<F> {
        let n = self.targets.len();
        let mut records = Array2::zeros((n, self.inputs.ncols() + 2));
        let dim = self.inputs.ncols();
        records.slice_mut(s![.., ..dim]).assign(&self.inputs);
        records.column_mut(dim).assign(&self.targets);
        records.column_mut(dim + 1).assign(&self.alpha);
        records
    }

    /// Trajectory as records: one row per step with columns (index, score, beta, n_undetermined)
    pub fn trajectory_records(&self) -> Array2<F> {
        Array2::from_shape_fn((self.steps.len(), 4), |(i, j)| {
            let step = &self.steps[i];
            match j {
                0 => F::cast(step.index),
                1 => step.score,
                2 => step.beta,
                _ => F::cast(step.n_undetermined),
            }
        })
    }

    /// Write `active.npy`, `trajectory.npy` and, in offline mode, `predictions.npy`
    /// records into the given directory.
    pub fn export_npy<P: AsRef<Path>>(&self, dir: P) -> Result<()>
    where
        F: ndarray_npy::WritableElement,
    {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        write_npy(dir.join("active.npy"), &self.active_records())?;
        write_npy(dir.join("trajectory.npy"), &self.trajectory_records())?;
        if let Some(predictions) = &self.predictions {
            write_npy(dir.join("predictions.npy"), predictions)?;
        }
        Ok(())
    }
}

#[cfg(feature = "persistent")]
impl<F, K> ActiveSetSelection<F, K>
where
    F: Float + Serialize + serde::de::DeserializeOwned,
    K: CovarianceKernel<F> + Serialize + serde::de::DeserializeOwned,
{
    /// Save the selection result in a json file
    pub fn save(&self, path: &str) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        let bytes = serde_json::to_vec(self)?;
        std::io::Write::write_all(&mut file, &bytes)?;
        Ok(())
    }

    /// Load a selection result from a json file
    pub fn load(path: &str) -> Result<Box<Self>> {
        let data = std::fs::read(path)?;
        let selection: Self = serde_json::from_slice(&data)?;
        Ok(Box::new(selection))
    }
}

impl<F, D, K> PredictInplace<ArrayBase<D, Ix2>, Array1<F>> for ActiveSetSelection<F, K>
where
    F: Float,
    D: Data<Elem = F>,
    K: CovarianceKernel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("Active set prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros((x.nrows(),))
    }
}

impl<F: Float, K: CovarianceKernel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, LseError> for SelectionValidParams<F, K>
{
    type Object = ActiveSetSelection<F, K>;

    /// Select the active set among the dataset points, records being the candidate
    /// inputs (one row per point) and targets their values.
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let pool = CandidatePool::new(dataset.records(), dataset.targets())?;
        let context = ComputeContext::new(self.n_threads())?;
        debug!(
            "Active set selection over {} points of dim {} with {} threads",
            pool.len(),
            pool.dim(),
            context.n_threads()
        );
        context.install(|| self.select(pool))
    }
}

impl<F: Float, K: CovarianceKernel<F>> SelectionValidParams<F, K> {
    fn start_point(&self, n_points: usize) -> Result<usize> {
        match self.start_index() {
            Some(index) if index >= n_points => Err(LseError::IndexOutOfRangeError {
                index,
                size: n_points,
            }),
            Some(index) => Ok(index),
            None => {
                let mut rng = match self.seed() {
                    Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
                    None => Xoshiro256Plus::from_entropy(),
                };
                Ok(rng.gen_range(0..n_points))
            }
        }
    }

    /// Activate the point, grow the Gram matrix and re-solve
    fn grow(
        &self,
        index: usize,
        pool: &mut CandidatePool<F>,
        active: &mut ActiveSet<F>,
        solver: &mut dyn LinearSolver<F>,
    ) -> Result<()> {
        pool.activate(index)?;
        active.push(
            index,
            &pool.input(index)?,
            pool.target(index)?,
            self.kernel(),
            self.hyper(),
        )?;
        solver.refresh(active)
    }

    fn select(&self, mut pool: CandidatePool<F>) -> Result<ActiveSetSelection<F, K>> {
        let start = Instant::now();
        let n_points = pool.len();
        let max_size = self.max_size().unwrap_or(n_points).min(n_points);
        if max_size > LSE_MAX_ACTIVE_SIZE {
            return Err(LseError::InvalidValueError(format!(
                "Active set of {max_size} points exceeds the {LSE_MAX_ACTIVE_SIZE} points limit, set `max_size`"
            )));
        }
        let mut active = ActiveSet::with_capacity(max_size, pool.dim());
        let mut solver = self.solver().build::<F>();
        let mut predictor =
            BatchPredictor::new(*self.kernel(), *self.hyper(), max_size, self.batch_size());
        debug!(
            "Selection up to {} active points, {} solver, level {}",
            max_size,
            solver.name(),
            self.level()
        );

        let first = self.start_point(n_points)?;
        self.grow(first, &mut pool, &mut active, solver.as_mut())?;
        let mut steps = vec![SelectionStep {
            index: first,
            score: F::zero(),
            beta: F::zero(),
            n_undetermined: pool.count(ClassificationState::Undetermined),
        }];

        let mut iteration = 0;
        let termination = loop {
            if active.is_full() {
                break Termination::MaxSize;
            }
            if let Some(max_iters) = self.max_iters() {
                if iteration >= max_iters {
                    break Termination::IterationBudget;
                }
            }
            if let Some(budget) = self.time_budget() {
                if start.elapsed() >= budget {
                    break Termination::TimeBudget;
                }
            }
            let candidates: Vec<usize> = pool.candidate_indices().collect();
            if candidates.is_empty() {
                break Termination::NoAmbiguousCandidate;
            }
            iteration += 1;
            let beta = confidence_beta(n_points, iteration, self.tolerance());

            let t_pred = Instant::now();
            let pred = predictor.predict(&pool, &active, solver.as_ref(), &candidates)?;
            let half_widths = pred.posterior_std(self.hyper().signal_variance()) * beta.sqrt();
            let pred_time = t_pred.elapsed();

            let mut best: Option<(usize, F)> = None;
            for (j, &index) in candidates.iter().enumerate() {
                let lcb = pred.mean[j] - half_widths[j];
                let ucb = pred.mean[j] + half_widths[j];
                if lcb + self.accuracy() > self.level() {
                    pool.classify(index, ClassificationState::ClassifiedAbove)?;
                } else if ucb - self.accuracy() < self.level() {
                    pool.classify(index, ClassificationState::ClassifiedBelow)?;
                } else {
                    let score = self.criterion().score(lcb, ucb, self.level());
                    if best.map_or(true, |(_, best_score)| score > best_score) {
                        best = Some((index, score));
                    }
                }
            }

            let (index, score) = match best {
                Some(best) => best,
                None => break Termination::NoAmbiguousCandidate,
            };
            let t_grow = Instant::now();
            self.grow(index, &mut pool, &mut active, solver.as_mut())?;
            let n_undetermined = pool.count(ClassificationState::Undetermined);
            debug!(
                "Iteration {}: beta={} selected {} (score={}), {} undetermined left, predict {:?}, grow {:?}",
                iteration,
                beta,
                index,
                score,
                n_undetermined,
                pred_time,
                t_grow.elapsed()
            );
            steps.push(SelectionStep {
                index,
                score,
                beta,
                n_undetermined,
            });
        };
        let elapsed = start.elapsed();
        info!(
            "Selected {} active points out of {} in {} iterations ({:?}): {}",
            active.len(),
            n_points,
            iteration,
            elapsed,
            termination
        );

        let (predictions, error) = if self.evaluate() {
            let all: Vec<usize> = (0..n_points).collect();
            let pred = predictor.predict(&pool, &active, solver.as_ref(), &all)?;
            let error = prediction_error(&pred.mean, &pool.targets(), pool.states())?;
            info!("{}", error);
            (Some(pred.mean), Some(error))
        } else {
            (None, None)
        };

        Ok(ActiveSetSelection {
            kernel: *self.kernel(),
            hyper: *self.hyper(),
            level: self.level(),
            steps,
            states: pool.states().to_vec(),
            inputs: active.inputs().to_owned(),
            targets: active.targets().to_owned(),
            alpha: active.alpha().to_owned(),
            termination,
            n_iters: iteration,
            elapsed,
            predictions,
            error,
        })
    }
}
