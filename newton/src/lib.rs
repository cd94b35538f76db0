//! Newton iteration for square nonlinear systems `F(x) = 0`.
//!
//! The solver is used by the `rkf` crate to resolve the stages of diagonally
//! implicit tableaus, but knows nothing about ODEs: it takes a residual
//! function and an initial guess and returns the last iterate together with
//! convergence information.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

pub mod jacobian;

pub use jacobian::{
    BroydenJacobian, DiscreteJacobian, Jacobian, JacobianKind, NonlinearSystem,
};

#[derive(Debug, Error)]
pub enum NewtonErrors {
    #[error("residual has length {found}, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("jacobian is singular at iteration {iteration}")]
    SingularJacobian { iteration: usize },
}

/// Options for the Newton iteration.
///
/// All tolerances are absolute.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonOptions {
    /// The iteration may stop when `||x_new - x_old|| <= tolerance`.
    pub tolerance: f64,
    /// The iteration may stop when `||F(x)|| <= min_res`.
    pub min_res: f64,
    /// Maximum number of iterations, backtracking steps excluded.
    pub max_iter: usize,
    /// Enables the backtracking line search.
    pub backtrack: bool,
    /// Stops when the residual did not decrease for two consecutive iterations.
    pub stop_on_stagnation: bool,
    /// Sufficient decrease parameter of the backtracking test.
    pub alpha: f64,
    /// Factor applied to the step length at each backtracking step.
    pub backstep_reduction: f64,
    /// Maximum number of backtracking steps per iteration.
    pub max_back_steps: usize,
    /// Initial step length. Must be 1 to keep quadratic convergence.
    pub lambda_init: f64,
}

impl Default for NewtonOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            min_res: 1e-6,
            max_iter: 50,
            backtrack: false,
            stop_on_stagnation: false,
            alpha: 1e-4,
            backstep_reduction: 0.5,
            max_back_steps: 4,
            lambda_init: 1.0,
        }
    }
}

impl NewtonOptions {
    /// Settings used to resolve the stages of implicit Runge-Kutta tableaus.
    pub fn implicit_stage() -> Self {
        Self {
            tolerance: 1e-10,
            min_res: 1e-10,
            max_iter: 100,
            backtrack: true,
            stop_on_stagnation: false,
            ..Default::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_min_res(mut self, min_res: f64) -> Self {
        self.min_res = min_res;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_backtracking(mut self, backtrack: bool) -> Self {
        self.backtrack = backtrack;
        self
    }
}

/// Outcome of a Newton solve.
///
/// Convergence requires both the residual and the last increment to be below
/// their tolerances. When `converged` is false, `solution` is the iterate with
/// the smallest residual and `residual_norm` is its residual.
#[derive(Clone, Debug)]
pub struct NewtonResult {
    pub solution: DVector<f64>,
    pub residual_norm: f64,
    pub step_length: f64,
    pub iterations: usize,
    pub converged: bool,
    pub stagnation: bool,
    /// The Jacobian became singular after at least one update.
    pub singular: bool,
}

/// Newton solver with a pluggable Jacobian approximation.
///
/// The solver can be reused for many systems. Each call to [`Newton::solve`]
/// starts from a clean Jacobian state.
#[derive(Debug)]
pub struct Newton {
    jacobian: Box<dyn Jacobian>,
    options: NewtonOptions,
}

impl Default for Newton {
    fn default() -> Self {
        Self::new(JacobianKind::default(), NewtonOptions::default())
    }
}

impl Newton {
    pub fn new(kind: JacobianKind, options: NewtonOptions) -> Self {
        Self {
            jacobian: kind.build(),
            options,
        }
    }

    /// Uses a custom Jacobian approximation.
    pub fn with_jacobian(jacobian: Box<dyn Jacobian>, options: NewtonOptions) -> Self {
        Self { jacobian, options }
    }

    pub fn options(&self) -> &NewtonOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: NewtonOptions) {
        self.options = options;
        self.jacobian.reset();
    }

    /// Clears the state of the Jacobian approximation.
    pub fn reset(&mut self) {
        self.jacobian.reset();
    }

    /// Solves `system(x) = 0` starting from `x0`.
    ///
    /// Running out of iterations is not an error, and neither is a Jacobian
    /// that turns singular once the iteration has moved: the returned result
    /// has `converged == false` and holds the best iterate. A Jacobian that is
    /// singular at `x0` is reported as [`NewtonErrors::SingularJacobian`].
    pub fn solve<F>(
        &mut self,
        mut system: F,
        x0: &DVector<f64>,
    ) -> Result<NewtonResult, NewtonErrors>
    where
        F: FnMut(&DVector<f64>) -> DVector<f64>,
    {
        let NewtonOptions {
            tolerance,
            min_res,
            max_iter,
            backtrack,
            stop_on_stagnation,
            alpha,
            backstep_reduction,
            max_back_steps,
            lambda_init,
        } = self.options;

        self.jacobian.reset();

        let mut x = x0.clone();
        let mut residual = system(&x);
        if residual.len() != x.len() {
            return Err(NewtonErrors::DimensionMismatch {
                expected: x.len(),
                found: residual.len(),
            });
        }
        let mut residual_norm = residual.norm();
        let mut step_length = f64::MAX;
        let mut iterations = 0;
        let mut converged = false;
        let mut stagnation = false;
        let mut singular = false;
        let mut previous_no_decrease = false;
        let mut best = (x.clone(), residual_norm);

        while iterations < max_iter.max(1) {
            let previous = x.clone();
            let previous_norm = residual_norm;
            let mut lambda = lambda_init;

            let Some(delta) = self.jacobian.solve(&mut system, &x, &residual) else {
                if iterations == 0 {
                    return Err(NewtonErrors::SingularJacobian { iteration: 1 });
                }
                trace!(iterations, residual_norm, "singular jacobian, keeping the best iterate");
                singular = true;
                break;
            };
            iterations += 1;
            step_length = delta.norm();

            x = &previous - &delta * lambda;
            residual = system(&x);
            residual_norm = residual.norm();

            if backtrack {
                let mut back_steps = 0;
                while back_steps < max_back_steps
                    && residual_norm > (1.0 - lambda * alpha) * previous_norm
                {
                    back_steps += 1;
                    lambda *= backstep_reduction;
                    x = &previous - &delta * lambda;
                    residual = system(&x);
                    residual_norm = residual.norm();
                }
            }

            let no_decrease = residual_norm >= previous_norm;
            stagnation = previous_no_decrease && no_decrease;
            previous_no_decrease = no_decrease;
            converged = residual_norm <= min_res && step_length <= tolerance;
            if residual_norm < best.1 {
                best = (x.clone(), residual_norm);
            }

            trace!(iterations, residual_norm, step_length, "newton iteration");

            if converged || (stagnation && stop_on_stagnation) {
                break;
            }
        }

        let (solution, residual_norm) = if converged {
            (x, residual_norm)
        } else {
            best
        };
        Ok(NewtonResult {
            solution,
            residual_norm,
            step_length,
            iterations,
            converged,
            stagnation,
            singular,
        })
    }
}
