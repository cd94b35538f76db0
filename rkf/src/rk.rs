use tracing::warn;

use crate::{OdeModel, OdeState, RkfErrors, root_finder::RootFinder, tableau::ButcherTableau};

/// The two estimates produced by one step of an embedded pair.
#[derive(Clone, Debug)]
pub struct StepEstimate<S> {
    /// Estimate built from the carried weights.
    pub low: S,
    /// Companion estimate, only used to measure the local error.
    pub high: S,
    /// Implicit stages whose root find did not converge.
    pub nonlinear_failures: usize,
    /// Right-hand side evaluations spent on the step.
    pub fn_evals: usize,
}

/// Evaluates single steps of a tableau.
///
/// Holds no state besides the tableau: the stage derivatives live for the
/// duration of one call to [`RungeKutta::step`].
#[derive(Clone, Copy, Debug)]
pub struct RungeKutta<'a, const STAGES: usize> {
    tableau: &'a ButcherTableau<STAGES>,
}

impl<'a, const STAGES: usize> RungeKutta<'a, STAGES> {
    pub fn new(tableau: &'a ButcherTableau<STAGES>) -> Self {
        Self { tableau }
    }

    pub fn tableau(&self) -> &'a ButcherTableau<STAGES> {
        self.tableau
    }

    /// Advances `y0` from `t0` by `h` and returns both estimates.
    ///
    /// Stage `i` is evaluated at `t0 + c[i] h` on `y0 + h sum_j a[i][j] k_j`.
    /// When `a[i][i]` is nonzero, `k_i` solves
    /// `k_i = f(t0 + c[i] h, y0 + h sum_{j<i} a[i][j] k_j + h a[i][i] k_i)`
    /// through `root_finder`, starting from the explicit guess `f` evaluated
    /// on the known part of the stage.
    pub fn step<S, M, R>(
        &self,
        model: &M,
        root_finder: &mut R,
        t0: f64,
        y0: &S,
        h: f64,
    ) -> Result<StepEstimate<S>, RkfErrors>
    where
        S: OdeState,
        M: OdeModel<S> + ?Sized,
        R: RootFinder<S> + ?Sized,
    {
        let a = self.tableau.a();
        let c = self.tableau.c();

        // stage derivatives, already scaled by h
        let mut k: Vec<S> = Vec::with_capacity(STAGES);
        let mut fn_evals = 0;
        let mut nonlinear_failures = 0;

        for i in 0..STAGES {
            let t = t0 + c[i] * h;
            let mut stage = y0.clone();
            for (j, kj) in k.iter().enumerate() {
                accumulate(&mut stage, kj, a[i][j]);
            }

            let mut derivative = model.f(t, &stage);
            fn_evals += 1;

            let diagonal = h * a[i][i];
            if diagonal != 0.0 {
                let mut residual_evals = 0;
                let outcome = {
                    let mut residual = |x: &S| {
                        residual_evals += 1;
                        let mut implicit_stage = x.clone();
                        implicit_stage *= diagonal;
                        implicit_stage += &stage;
                        let mut r = model.f(t, &implicit_stage);
                        let mut negated = x.clone();
                        negated *= -1.0;
                        r += &negated;
                        r
                    };
                    root_finder.find_root(&mut residual, derivative)?
                };
                fn_evals += residual_evals;

                if !outcome.converged {
                    nonlinear_failures += 1;
                    warn!(
                        stage = i,
                        t,
                        residual_norm = outcome.residual_norm,
                        "implicit stage did not converge, continuing with the last iterate"
                    );
                }
                derivative = outcome.solution;
            }

            derivative *= h;
            k.push(derivative);
        }

        let mut low = y0.clone();
        let mut high = y0.clone();
        for (i, ki) in k.iter().enumerate() {
            accumulate(&mut low, ki, self.tableau.low()[i]);
            accumulate(&mut high, ki, self.tableau.high()[i]);
        }

        Ok(StepEstimate {
            low,
            high,
            nonlinear_failures,
            fn_evals,
        })
    }
}

// target += weight * k, skipping structural zeros of the tableau
fn accumulate<S: OdeState>(target: &mut S, k: &S, weight: f64) {
    if weight != 0.0 {
        let mut term = k.clone();
        term *= weight;
        *target += &term;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExplicitOnly, StateArray};
    use approx::assert_abs_diff_eq;
    use nalgebra::DVector;
    use newton::{JacobianKind, Newton, NewtonOptions};

    const TOL: f64 = 1e-12;

    #[test]
    fn test_euler_heun_pair() {
        let f = |_t: f64, y: &f64| -2.0 * y;
        let rk = RungeKutta::new(&ButcherTableau::<2>::RK12);
        let estimate = rk.step(&f, &mut ExplicitOnly, 0.0, &1.0, 0.1).unwrap();

        // Euler: 1 - 0.2, Heun: 1 - 0.2 + 0.02
        assert_abs_diff_eq!(estimate.low, 0.8, epsilon = TOL);
        assert_abs_diff_eq!(estimate.high, 0.82, epsilon = TOL);
        assert_eq!(estimate.fn_evals, 2);
        assert_eq!(estimate.nonlinear_failures, 0);
    }

    #[test]
    fn test_constant_derivative_is_exact() {
        let f = |_t: f64, _y: &StateArray<2>| StateArray::new([1.0, -3.0]);
        let rk = RungeKutta::new(&ButcherTableau::<6>::RK45);
        let estimate = rk
            .step(&f, &mut ExplicitOnly, 2.0, &StateArray::new([0.0, 1.0]), 0.5)
            .unwrap();

        assert_abs_diff_eq!(estimate.low[0], 0.5, epsilon = TOL);
        assert_abs_diff_eq!(estimate.low[1], -0.5, epsilon = TOL);
        assert_abs_diff_eq!(estimate.high[0], 0.5, epsilon = TOL);
        assert_abs_diff_eq!(estimate.high[1], -0.5, epsilon = TOL);
        assert_eq!(estimate.fn_evals, 6);
    }

    #[test]
    fn test_time_dependence_uses_stage_offsets() {
        // the carried weights of RK45 integrate polynomials in t exactly
        let f = |t: f64, _y: &f64| t;
        let rk = RungeKutta::new(&ButcherTableau::<6>::RK45);
        let estimate = rk.step(&f, &mut ExplicitOnly, 1.0, &0.0, 0.5).unwrap();
        assert_abs_diff_eq!(estimate.low, (1.5_f64.powi(2) - 1.0) / 2.0, epsilon = TOL);
    }

    #[test]
    fn test_backward_euler_stage() {
        // y' = -y: backward Euler gives y1 = y0 / (1 + h)
        let f = |_t: f64, y: &DVector<f64>| -y;
        let mut newton = Newton::new(JacobianKind::Discrete, NewtonOptions::implicit_stage());
        let rk = RungeKutta::new(&ButcherTableau::<2>::ESDIRK12);
        let y0 = DVector::from_vec(vec![1.0]);
        let estimate = rk.step(&f, &mut newton, 0.0, &y0, 0.5).unwrap();

        assert_abs_diff_eq!(estimate.low[0], 1.0 / 1.5, epsilon = 1e-9);
        // trapezoidal companion: (k1 + k2) / 2 with k1 = -h, k2 = -h / (1 + h)
        assert_abs_diff_eq!(estimate.high[0], 1.0 - 0.25 - 0.25 / 1.5, epsilon = 1e-9);
        assert_eq!(estimate.nonlinear_failures, 0);
        assert!(estimate.fn_evals > 2);
    }

    #[test]
    fn test_implicit_tableau_needs_root_finder() {
        let f = |_t: f64, y: &f64| -y;
        let rk = RungeKutta::new(&ButcherTableau::<2>::ESDIRK12);
        let result = rk.step(&f, &mut ExplicitOnly, 0.0, &1.0, 0.1);
        assert!(matches!(result, Err(RkfErrors::ImplicitUnsupported)));
    }

    #[test]
    fn test_failed_stage_is_counted() {
        let f = |_t: f64, y: &DVector<f64>| y.map(|v| -v.powi(3));
        let options = NewtonOptions::implicit_stage().with_max_iter(1);
        let mut newton = Newton::new(JacobianKind::Discrete, options);
        let rk = RungeKutta::new(&ButcherTableau::<2>::ESDIRK12);
        let estimate = rk
            .step(&f, &mut newton, 0.0, &DVector::from_vec(vec![2.0]), 1.0)
            .unwrap();

        assert_eq!(estimate.nonlinear_failures, 1);
        assert!(estimate.low[0].is_finite());
    }
}
