//! This library implements active-set selection for [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! regression driven by level set estimation.
//!
//! Given a large pool of candidate points with known target values (typically samples of a signed distance
//! field over a regular grid), it incrementally picks a small subset of points, the active set, such that a GP
//! conditioned on it classifies every other point as lying above or below a level (zero for an implicit surface)
//! with high confidence. Points are selected where the GP is the most uncertain about the side of the level
//! they lie on, so the active set concentrates around the level set.
//!
//! Selection is parameterized by [SelectionParams] (see [LevelSetSelector] for the squared exponential kernel
//! shortcut) and produces an [ActiveSetSelection] through the linfa [Fit](linfa::traits::Fit) trait.
//!
//! Linear systems over the growing active set are solved either against an upper Cholesky factor, extended
//! column by column or fully refactored, or by conjugate gradient, see [SolverStrategy].
//!
//! Logging uses the [log](https://docs.rs/log) facade, set the `LSEGP_LOG` environment variable
//! (e.g. `LSEGP_LOG=debug`) with an [env_logger](https://docs.rs/env_logger) initialized from it to trace
//! selection iterations.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod active_set;
mod algorithm;
pub mod baseline;
mod context;
mod errors;
mod hyperparameters;
pub mod kernels;
pub mod metrics;
mod parameters;
mod pool;
mod predictor;
pub mod solvers;
pub mod utils;

pub use active_set::ActiveSet;
pub use algorithm::*;
pub use context::ComputeContext;
pub use errors::*;
pub use hyperparameters::GpHyperParams;
pub use parameters::*;
pub use pool::{CandidatePool, ClassificationState};
pub use predictor::{BatchPredictor, Prediction};
pub use solvers::{Factorization, SolverStrategy};

/// Environment variable name used to set the log level of the library
pub const LSEGP_LOG: &str = "LSEGP_LOG";
