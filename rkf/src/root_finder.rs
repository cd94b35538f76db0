use nalgebra::DVector;
use newton::{Newton, NewtonErrors};

use crate::{OdeState, RkfErrors, StateArray};

/// Result of solving one implicit stage equation.
#[derive(Clone, Debug)]
pub struct RootFindOutcome<S> {
    /// Root if `converged`, otherwise the best iterate found.
    pub solution: S,
    pub converged: bool,
    pub residual_norm: f64,
}

/// Solves the nonlinear stage equations of diagonally implicit tableaus.
///
/// The stage derivative `k` of an implicit stage satisfies
/// `k - f(t + c h, y + h a_ii k + ...) = 0`. The integrator hands the residual
/// of that equation to the root finder together with an explicit guess.
pub trait RootFinder<S: OdeState> {
    /// Whether [`RootFinder::find_root`] can be called at all.
    fn supports_implicit(&self) -> bool {
        true
    }

    /// Solves `residual(x) = 0` starting from `guess`.
    ///
    /// Failing to converge is not an error: report it in the outcome and
    /// return the best iterate.
    fn find_root(
        &mut self,
        residual: &mut dyn FnMut(&S) -> S,
        guess: S,
    ) -> Result<RootFindOutcome<S>, RkfErrors>;

    /// Called at the start of every integration.
    fn reset(&mut self) {}
}

impl<S: OdeState, R: RootFinder<S> + ?Sized> RootFinder<S> for &mut R {
    fn supports_implicit(&self) -> bool {
        (**self).supports_implicit()
    }

    fn find_root(
        &mut self,
        residual: &mut dyn FnMut(&S) -> S,
        guess: S,
    ) -> Result<RootFindOutcome<S>, RkfErrors> {
        (**self).find_root(residual, guess)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Root finder for integrators that only run explicit tableaus.
///
/// Any state kind can be integrated with it, including scalars and matrices.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExplicitOnly;

impl<S: OdeState> RootFinder<S> for ExplicitOnly {
    fn supports_implicit(&self) -> bool {
        false
    }

    fn find_root(
        &mut self,
        _residual: &mut dyn FnMut(&S) -> S,
        _guess: S,
    ) -> Result<RootFindOutcome<S>, RkfErrors> {
        Err(RkfErrors::ImplicitUnsupported)
    }
}

// Newton hands back its best iterate when it stops early. Only a Jacobian that
// is singular at the guess leaves the guess itself.
fn newton_outcome(
    newton: &mut Newton,
    residual: &mut dyn FnMut(&DVector<f64>) -> DVector<f64>,
    guess: DVector<f64>,
) -> Result<RootFindOutcome<DVector<f64>>, RkfErrors> {
    match newton.solve(&mut *residual, &guess) {
        Ok(result) => Ok(RootFindOutcome {
            solution: result.solution,
            converged: result.converged,
            residual_norm: result.residual_norm,
        }),
        Err(NewtonErrors::SingularJacobian { .. }) => {
            let residual_norm = residual(&guess).norm();
            Ok(RootFindOutcome {
                solution: guess,
                converged: false,
                residual_norm,
            })
        }
        Err(e) => Err(e.into()),
    }
}

impl RootFinder<DVector<f64>> for Newton {
    fn find_root(
        &mut self,
        residual: &mut dyn FnMut(&DVector<f64>) -> DVector<f64>,
        guess: DVector<f64>,
    ) -> Result<RootFindOutcome<DVector<f64>>, RkfErrors> {
        newton_outcome(self, residual, guess)
    }

    fn reset(&mut self) {
        Newton::reset(self)
    }
}

impl<const N: usize> RootFinder<StateArray<N>> for Newton {
    fn find_root(
        &mut self,
        residual: &mut dyn FnMut(&StateArray<N>) -> StateArray<N>,
        guess: StateArray<N>,
    ) -> Result<RootFindOutcome<StateArray<N>>, RkfErrors> {
        let mut state = StateArray::<N>::default();
        let mut vector_residual = |x: &DVector<f64>| {
            state.copy_from_slice(x.as_slice());
            DVector::from_column_slice(&residual(&state)[..])
        };
        let outcome = newton_outcome(
            self,
            &mut vector_residual,
            DVector::from_column_slice(&guess[..]),
        )?;

        let mut solution = StateArray::<N>::default();
        solution.copy_from_slice(outcome.solution.as_slice());
        Ok(RootFindOutcome {
            solution,
            converged: outcome.converged,
            residual_norm: outcome.residual_norm,
        })
    }

    fn reset(&mut self) {
        Newton::reset(self)
    }
}
