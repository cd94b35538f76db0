use std::fmt::Debug;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Residual function of a square nonlinear system, `F: R^n -> R^n`.
pub type NonlinearSystem<'a> = dyn FnMut(&DVector<f64>) -> DVector<f64> + 'a;

/// Selects how the Jacobian of the nonlinear system is approximated.
///
/// - `Discrete`: forward finite differences, rebuilt at every iteration.
/// - `Broyden`: Broyden's "good" rank-one update, starting from the identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JacobianKind {
    #[default]
    Discrete,
    Broyden,
}

impl JacobianKind {
    /// Builds a fresh Jacobian approximation of this kind.
    pub fn build(self) -> Box<dyn Jacobian> {
        match self {
            JacobianKind::Discrete => Box::new(DiscreteJacobian::default()),
            JacobianKind::Broyden => Box::new(BroydenJacobian::default()),
        }
    }
}

/// Approximation of the Jacobian used to compute Newton increments.
pub trait Jacobian: Debug {
    /// Solves `J(x) d = r` for the increment `d`.
    ///
    /// Returns `None` when the (approximate) Jacobian is singular.
    fn solve(
        &mut self,
        system: &mut NonlinearSystem<'_>,
        x: &DVector<f64>,
        r: &DVector<f64>,
    ) -> Option<DVector<f64>>;

    /// Forgets anything accumulated from previous iterations.
    fn reset(&mut self) {}
}

/// Forward finite-difference Jacobian.
///
/// Column `k` is `(F(x + h e_k) - F(x)) / h` with `h = step * max(|x_k|, 1)`.
#[derive(Clone, Copy, Debug)]
pub struct DiscreteJacobian {
    /// Relative perturbation applied to each unknown.
    pub step: f64,
}

impl Default for DiscreteJacobian {
    fn default() -> Self {
        Self {
            step: f64::EPSILON.sqrt(),
        }
    }
}

impl DiscreteJacobian {
    pub fn new(step: f64) -> Self {
        Self { step }
    }

    /// Assembles the finite-difference matrix at `x`, given `r = F(x)`.
    pub fn matrix(
        &self,
        system: &mut NonlinearSystem<'_>,
        x: &DVector<f64>,
        r: &DVector<f64>,
    ) -> DMatrix<f64> {
        let n = x.len();
        let mut jacobian = DMatrix::zeros(r.len(), n);
        let mut perturbed = x.clone();
        for k in 0..n {
            let h = self.step * x[k].abs().max(1.0);
            perturbed[k] = x[k] + h;
            let column = (system(&perturbed) - r) / h;
            jacobian.set_column(k, &column);
            perturbed[k] = x[k];
        }
        jacobian
    }
}

impl Jacobian for DiscreteJacobian {
    fn solve(
        &mut self,
        system: &mut NonlinearSystem<'_>,
        x: &DVector<f64>,
        r: &DVector<f64>,
    ) -> Option<DVector<f64>> {
        self.matrix(system, x, r).lu().solve(r)
    }
}

/// Broyden's "good" method.
///
/// The approximation `B` starts from the identity the first time it is used
/// and is corrected with
/// `B += (dr - B dx) dx^T / (dx^T dx)` between successive calls.
#[derive(Clone, Debug, Default)]
pub struct BroydenJacobian {
    b: Option<DMatrix<f64>>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl BroydenJacobian {
    /// Starts the iteration from a user supplied approximation instead of the identity.
    pub fn with_initial(b: DMatrix<f64>) -> Self {
        Self {
            b: Some(b),
            previous: None,
        }
    }
}

impl Jacobian for BroydenJacobian {
    fn solve(
        &mut self,
        _system: &mut NonlinearSystem<'_>,
        x: &DVector<f64>,
        r: &DVector<f64>,
    ) -> Option<DVector<f64>> {
        let n = x.len();
        let b = match self.b.take() {
            Some(b) if b.nrows() == n && b.ncols() == n => b,
            _ => DMatrix::identity(n, n),
        };

        let b = match self.previous.take() {
            Some((x_prev, r_prev)) => {
                let dx = x - x_prev;
                let dr = r - r_prev;
                let dx_norm_squared = dx.dot(&dx);
                if dx_norm_squared > 0.0 {
                    let correction = (&dr - &b * &dx) * dx.transpose() / dx_norm_squared;
                    b + correction
                } else {
                    b
                }
            }
            None => b,
        };

        let increment = b.clone().lu().solve(r);
        self.b = Some(b);
        self.previous = Some((x.clone(), r.clone()));
        increment
    }

    fn reset(&mut self) {
        self.b = None;
        self.previous = None;
    }
}
