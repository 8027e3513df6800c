use crate::errors::{LseError, Result};
use linfa::Float;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Gaussian process hyperparameters, read-only for the duration of a selection run.
///
/// The covariance between two points is
/// `signal_variance * exp(-|x - y|^2 / (2 * length_scale))`
/// and `noise_variance` is added on the diagonal of the active Gram matrix only.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GpHyperParams<F: Float> {
    /// Length scale term of the kernel, applied to the squared distance as is
    pub(crate) length_scale: F,
    /// Prior variance of the latent function
    pub(crate) signal_variance: F,
    /// Observation noise floor
    pub(crate) noise_variance: F,
}

impl<F: Float> Default for GpHyperParams<F> {
    fn default() -> GpHyperParams<F> {
        GpHyperParams {
            length_scale: F::one(),
            signal_variance: F::one(),
            noise_variance: F::cast(1e-2),
        }
    }
}

impl<F: Float> GpHyperParams<F> {
    /// Constructor
    pub fn new(length_scale: F, signal_variance: F, noise_variance: F) -> Self {
        GpHyperParams {
            length_scale,
            signal_variance,
            noise_variance,
        }
    }

    /// Get length scale
    pub fn length_scale(&self) -> F {
        self.length_scale
    }

    /// Get signal variance
    pub fn signal_variance(&self) -> F {
        self.signal_variance
    }

    /// Get noise variance
    pub fn noise_variance(&self) -> F {
        self.noise_variance
    }

    /// Set length scale
    pub fn with_length_scale(mut self, length_scale: F) -> Self {
        self.length_scale = length_scale;
        self
    }

    /// Set signal variance
    pub fn with_signal_variance(mut self, signal_variance: F) -> Self {
        self.signal_variance = signal_variance;
        self
    }

    /// Set noise variance
    pub fn with_noise_variance(mut self, noise_variance: F) -> Self {
        self.noise_variance = noise_variance;
        self
    }

    /// Check all values are finite and strictly positive.
    ///
    /// A strictly positive noise keeps the active Gram matrix positive definite.
    pub fn check(&self) -> Result<()> {
        for (name, value) in [
            ("length_scale", self.length_scale),
            ("signal_variance", self.signal_variance),
            ("noise_variance", self.noise_variance),
        ] {
            if !(value.is_finite() && value > F::zero()) {
                return Err(LseError::InvalidValueError(format!(
                    "`{name}` should be finite and strictly positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}
