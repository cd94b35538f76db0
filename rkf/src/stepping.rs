use serde::{Deserialize, Serialize};

/// Adaptive step size controller.
///
/// A step of size `h` over an interval of length `span` is allowed an error of
/// `tol * h / span`, so that the accepted errors sum to at most `tol`. First
/// order tableaus are allowed the full `tol` on every step instead.
///
/// With `ratio = allowed / estimated`, an accepted step grows the next one by
/// `min(expansion_factor, ratio^(1 / (order + 1)))` and a rejected step is
/// retried with `h * max(max_reduction, ratio^(1 / order)) * reduction_safety`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveStepControl {
    /// Upper bound on the growth of the step after an accepted step.
    pub expansion_factor: f64,
    /// Lower bound on the shrink factor after a rejected step.
    pub max_reduction: f64,
    /// Safety factor applied to every shrink.
    pub reduction_safety: f64,
}

impl Default for AdaptiveStepControl {
    fn default() -> Self {
        Self {
            expansion_factor: 4.0,
            max_reduction: 0.1,
            reduction_safety: 0.98,
        }
    }
}

impl AdaptiveStepControl {
    pub fn with_expansion_factor(mut self, expansion_factor: f64) -> Self {
        self.expansion_factor = expansion_factor;
        self
    }

    pub fn with_max_reduction(mut self, max_reduction: f64) -> Self {
        self.max_reduction = max_reduction;
        self
    }

    pub fn with_reduction_safety(mut self, reduction_safety: f64) -> Self {
        self.reduction_safety = reduction_safety;
        self
    }

    /// Error allowed for a step of size `h`.
    pub fn error_per_step(&self, tol: f64, h: f64, span: f64, order: u32) -> f64 {
        if order == 1 { tol } else { tol * h / span }
    }

    /// `allowed / error`, infinite when the error vanishes.
    pub fn ratio(&self, allowed: f64, error: f64) -> f64 {
        if error <= f64::EPSILON {
            f64::INFINITY
        } else {
            allowed / error
        }
    }

    /// Factor applied to `h` after an accepted step.
    pub fn expansion(&self, ratio: f64, order: u32) -> f64 {
        self.expansion_factor
            .min(ratio.powf(1.0 / (order as f64 + 1.0)))
    }

    /// Factor applied to `h` after a rejected step.
    pub fn contraction(&self, ratio: f64, order: u32) -> f64 {
        self.max_reduction.max(ratio.powf(1.0 / order as f64)) * self.reduction_safety
    }
}

/// Smallest step the adaptive driver will take on `[t0, t_end]`.
pub fn minimum_step(t0: f64, t_end: f64) -> f64 {
    100.0 * (t_end - t0) * f64::EPSILON
}
