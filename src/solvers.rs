//! Linear-system solver strategies for the active-set GP coefficients.
//!
//! Both strategies solve `(K + noise I) alpha = t` over the current active set and
//! compute the variance reduction `k^T (K + noise I)^-1 k` of candidate kernel vectors:
//! * [`CholeskySolver`] maintains an upper Cholesky factor, either refactored from scratch
//!   or extended column by column,
//! * [`ConjugateGradientSolver`] runs conjugate gradient iterations from zero.

use crate::active_set::ActiveSet;
use crate::errors::Result;
use linfa::Float;
use log::trace;
use ndarray::{Array1, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Cholesky factor maintenance discipline
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Factorization {
    /// Extend the existing factor with the new column only, O(k^2) per added point
    #[default]
    Incremental,
    /// Refactor the whole Gram matrix after each growth, O(k^3) per added point
    Full,
}

/// Solver strategy used by a selection run
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum SolverStrategy {
    /// Direct triangular solves against a maintained Cholesky factor
    Cholesky(Factorization),
    /// Conjugate gradient iterations until the squared residual norm drops below `tol`
    ConjugateGradient {
        /// Squared residual norm tolerance
        tol: f64,
    },
}

impl Default for SolverStrategy {
    fn default() -> Self {
        SolverStrategy::Cholesky(Factorization::default())
    }
}

impl SolverStrategy {
    /// Default squared residual tolerance of conjugate gradient
    pub const DEFAULT_CG_TOLERANCE: f64 = 1e-10;

    /// Instantiate the solver implementing this strategy
    pub fn build<F: Float>(&self) -> Box<dyn LinearSolver<F>> {
        match self {
            SolverStrategy::Cholesky(factorization) => Box::new(CholeskySolver {
                factorization: *factorization,
            }),
            SolverStrategy::ConjugateGradient { tol } => {
                Box::new(ConjugateGradientSolver { tol: F::cast(*tol) })
            }
        }
    }
}

/// A strategy solving the active-set linear system
pub trait LinearSolver<F: Float> {
    /// Bring the solver state and the GP coefficients of `active` up to date
    /// after the active set has grown.
    fn refresh(&mut self, active: &mut ActiveSet<F>) -> Result<()>;

    /// Variance reduction `k^T (K + noise I)^-1 k` of each column `k` of the
    /// (active.len(), m) kernel vectors.
    fn variance_reduction(
        &self,
        active: &ActiveSet<F>,
        kernel_vectors: &ArrayView2<F>,
    ) -> Result<Array1<F>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Direct solver using the upper Cholesky factor stored in the active set
#[derive(Clone, Copy, Debug, Default)]
pub struct CholeskySolver {
    factorization: Factorization,
}

impl CholeskySolver {
    /// Constructor
    pub fn new(factorization: Factorization) -> Self {
        CholeskySolver { factorization }
    }
}

impl<F: Float> LinearSolver<F> for CholeskySolver {
    fn refresh(&mut self, active: &mut ActiveSet<F>) -> Result<()> {
        match self.factorization {
            Factorization::Incremental => active.extend_factor()?,
            Factorization::Full => active.factorize()?,
        };
        active.solve_with_factor()
    }

    fn variance_reduction(
        &self,
        active: &ActiveSet<F>,
        kernel_vectors: &ArrayView2<F>,
    ) -> Result<Array1<F>> {
        let w = active.whiten(kernel_vectors)?;
        Ok(w.map_axis(Axis(0), |c| c.dot(&c)))
    }

    fn name(&self) -> &'static str {
        match self.factorization {
            Factorization::Incremental => "incremental cholesky",
            Factorization::Full => "full cholesky",
        }
    }
}

/// Iterative solver, no factor is maintained
#[derive(Clone, Copy, Debug)]
pub struct ConjugateGradientSolver<F: Float> {
    tol: F,
}

impl<F: Float> ConjugateGradientSolver<F> {
    /// Constructor given the squared residual norm tolerance
    pub fn new(tol: F) -> Self {
        ConjugateGradientSolver { tol }
    }
}

impl<F: Float> LinearSolver<F> for ConjugateGradientSolver<F> {
    fn refresh(&mut self, active: &mut ActiveSet<F>) -> Result<()> {
        let (alpha, report) = conjugate_gradient(&active.gram(), &active.targets(), self.tol);
        trace!(
            "CG solve of size {}: {} iterations, residual {}, converged {}",
            active.len(),
            report.iterations,
            report.residual,
            report.converged
        );
        active.set_alpha(&alpha.view())
    }

    fn variance_reduction(
        &self,
        active: &ActiveSet<F>,
        kernel_vectors: &ArrayView2<F>,
    ) -> Result<Array1<F>> {
        let gram = active.gram();
        let mut reduction = Array1::zeros(kernel_vectors.ncols());
        Zip::from(&mut reduction)
            .and(kernel_vectors.columns())
            .par_for_each(|v, k| {
                let (gamma, _) = conjugate_gradient(&gram, &k, self.tol);
                *v = k.dot(&gamma);
            });
        Ok(reduction)
    }

    fn name(&self) -> &'static str {
        "conjugate gradient"
    }
}

/// Outcome of a conjugate gradient solve
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CgReport<F: Float> {
    /// Number of iterations performed
    pub iterations: usize,
    /// Final squared residual norm
    pub residual: F,
    /// Whether the residual dropped below the tolerance
    pub converged: bool,
}

/// Solve `a x = b` for a symmetric positive definite `a` by conjugate gradient started at zero.
///
/// Iterates until the squared residual norm is below `tol` or the iteration count reaches
/// the system size. Reaching the bound without meeting the tolerance is not an error,
/// the current iterate is returned.
///
/// *Panics* if `a` is not square or does not match `b` length.
pub fn conjugate_gradient<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix2>,
    b: &ArrayBase<impl Data<Elem = F>, Ix1>,
    tol: F,
) -> (Array1<F>, CgReport<F>) {
    let n = b.len();
    assert!(
        a.dim() == (n, n),
        "CG system should be square of size {}, got {:?}",
        n,
        a.dim()
    );
    let mut x = Array1::zeros(n);
    let mut r = b.to_owned();
    let mut p = r.clone();
    let mut delta = r.dot(&r);
    let mut k = 0;
    while delta > tol && k < n {
        let q = a.dot(&p);
        let s = p.dot(&q);
        if !(s > F::zero()) {
            break;
        }
        let t = delta / s;
        x.scaled_add(t, &p);
        r.scaled_add(-t, &q);
        let delta_old = delta;
        delta = r.dot(&r);
        p *= delta / delta_old;
        p += &r;
        k += 1;
    }
    let report = CgReport {
        iterations: k,
        residual: delta,
        converged: delta <= tol,
    };
    (x, report)
}
