use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    DEFAULT_MAX_STEPS, IntegrationOptions, OdeModel, OdeState, RkfErrors,
    result::Trajectory,
    rk::RungeKutta,
    root_finder::{ExplicitOnly, RootFinder},
    state::distance,
    stepping::{AdaptiveStepControl, minimum_step},
    tableau::ButcherTableau,
};

/// Adaptive Runge-Kutta-Fehlberg integrator over a borrowed tableau.
///
/// The integrator owns its root finder, which is only used by implicit
/// tableaus. Explicit tableaus run with the default [`ExplicitOnly`].
///
/// ```no_run
/// use nalgebra::DVector;
/// use newton::{JacobianKind, Newton, NewtonOptions};
/// use rkf::{ButcherTableau, Rkf};
///
/// let stiff = |_t: f64, y: &DVector<f64>| -1000.0 * y;
/// let newton = Newton::new(JacobianKind::Discrete, NewtonOptions::implicit_stage());
/// let mut rkf = Rkf::new(&ButcherTableau::<4>::ESDIRK34).with_root_finder(newton);
/// let trajectory = rkf
///     .integrate(&stiff, 0.0, 1.0, &DVector::from_element(1, 1.0), 0.01, 1e-4, 2000)
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct Rkf<'a, const STAGES: usize, R = ExplicitOnly> {
    tableau: &'a ButcherTableau<STAGES>,
    control: AdaptiveStepControl,
    root_finder: R,
}

impl<'a, const STAGES: usize> Rkf<'a, STAGES, ExplicitOnly> {
    pub fn new(tableau: &'a ButcherTableau<STAGES>) -> Self {
        Self {
            tableau,
            control: AdaptiveStepControl::default(),
            root_finder: ExplicitOnly,
        }
    }
}

impl<'a, const STAGES: usize, R> Rkf<'a, STAGES, R> {
    /// Replaces the root finder used for implicit stages.
    pub fn with_root_finder<F>(self, root_finder: F) -> Rkf<'a, STAGES, F> {
        Rkf {
            tableau: self.tableau,
            control: self.control,
            root_finder,
        }
    }

    pub fn with_step_control(mut self, control: AdaptiveStepControl) -> Self {
        self.control = control;
        self
    }

    pub fn tableau(&self) -> &'a ButcherTableau<STAGES> {
        self.tableau
    }

    pub fn step_control(&self) -> &AdaptiveStepControl {
        &self.control
    }

    pub fn root_finder(&self) -> &R {
        &self.root_finder
    }

    pub fn root_finder_mut(&mut self) -> &mut R {
        &mut self.root_finder
    }

    fn check_inputs<S: OdeState>(&self, t0: f64, t_end: f64, h: f64) -> Result<(), RkfErrors>
    where
        R: RootFinder<S>,
    {
        if !(t_end > t0) || !t0.is_finite() || !t_end.is_finite() {
            warn!(t0, t_end, "invalid integration interval");
            return Err(RkfErrors::InvalidInterval { t0, t_end });
        }
        if !(h > 0.0) || !h.is_finite() {
            warn!(h, "invalid step size");
            return Err(RkfErrors::InvalidStep(h));
        }
        if self.tableau.is_implicit() && !self.root_finder.supports_implicit() {
            warn!("implicit tableau used without a root finder");
            return Err(RkfErrors::ImplicitUnsupported);
        }
        Ok(())
    }

    /// Integrates `model` from `(t0, y0)` to `t_end` with adaptive steps.
    ///
    /// The step starts at `h_init` (raised to the minimum step and capped to
    /// the interval) and is adjusted so that the summed local error estimates
    /// stay below `tol`. At most `max_steps` steps are attempted, rejected
    /// ones included.
    ///
    /// Invalid arguments are reported as errors. Running out of attempts,
    /// forcing steps through at the minimum step size or failing to converge
    /// an implicit stage are not: they are flagged on the returned
    /// [`Trajectory`], which always holds every accepted point.
    #[allow(clippy::too_many_arguments)]
    pub fn integrate<S, M>(
        &mut self,
        model: &M,
        t0: f64,
        t_end: f64,
        y0: &S,
        h_init: f64,
        tol: f64,
        max_steps: usize,
    ) -> Result<Trajectory<S>, RkfErrors>
    where
        S: OdeState,
        M: OdeModel<S> + ?Sized,
        R: RootFinder<S>,
    {
        self.check_inputs::<S>(t0, t_end, h_init)?;
        if !(tol > 0.0) || !tol.is_finite() {
            warn!(tol, "invalid tolerance");
            return Err(RkfErrors::InvalidTolerance(tol));
        }

        let span = t_end - t0;
        let h_min = minimum_step(t0, t_end);
        let order = self.tableau.order();
        let stepper = RungeKutta::new(self.tableau);
        self.root_finder.reset();

        let mut h = h_init.max(h_min).min(span);
        let capacity = ((span / h).ceil() as usize)
            .min(max_steps)
            .min(DEFAULT_MAX_STEPS)
            .saturating_add(1);
        let mut trajectory = Trajectory::new(t0, y0.clone(), capacity);
        let mut t = t0;
        let mut y = y0.clone();
        let mut rejected = false;

        debug!(t0, t_end, h, tol, order, "starting adaptive integration");

        while t < t_end {
            if trajectory.attempts >= max_steps {
                trajectory.failed = true;
                warn!(
                    t,
                    t_end,
                    attempts = trajectory.attempts,
                    "step budget exhausted before the end of the interval"
                );
                break;
            }
            trajectory.attempts += 1;

            let estimate = stepper.step(model, &mut self.root_finder, t, &y, h)?;
            trajectory.fn_evals += estimate.fn_evals;
            trajectory.nonlinear_failures += estimate.nonlinear_failures;

            let error = distance(&estimate.low, &estimate.high);
            let allowed = self.control.error_per_step(tol, h, span, order);
            let ratio = self.control.ratio(allowed, error);

            if ratio >= 1.0 || h <= h_min {
                if !estimate.low.is_finite() {
                    trajectory.failed = true;
                    warn!(t, h, "state is no longer finite, stopping");
                    break;
                }
                if ratio < 1.0 && !trajectory.minimal_step {
                    trajectory.minimal_step = true;
                    warn!(
                        t,
                        h,
                        error,
                        allowed,
                        "minimum step size reached, accepting steps above tolerance"
                    );
                }

                t += h;
                if t_end - t <= h_min {
                    t = t_end;
                }
                y = estimate.low;
                trajectory.push(t, y.clone());
                trajectory.estimated_error += error;
                trace!(t, h, error, "step accepted");

                h = h.min(t_end - t);
                if ratio >= 1.0 && !rejected && t < t_end {
                    h = (h * self.control.expansion(ratio, order)).min(t_end - t);
                    trajectory.expansions += 1;
                }
                rejected = false;
            } else {
                trace!(t, h, error, "step rejected");
                rejected = true;
                trajectory.contractions += 1;
                h = (h * self.control.contraction(ratio, order)).max(h_min);
            }
        }

        debug!(
            steps = trajectory.steps(),
            attempts = trajectory.attempts,
            estimated_error = trajectory.estimated_error,
            "adaptive integration finished"
        );
        Ok(trajectory)
    }

    /// Integrates with a constant step `h`, the last step shortened to land on
    /// `t_end`. The error estimate is accumulated but never acted on.
    ///
    /// Steps below the minimum step size of the interval are rejected as
    /// [`RkfErrors::InvalidStep`].
    pub fn integrate_fixed<S, M>(
        &mut self,
        model: &M,
        t0: f64,
        t_end: f64,
        y0: &S,
        h: f64,
    ) -> Result<Trajectory<S>, RkfErrors>
    where
        S: OdeState,
        M: OdeModel<S> + ?Sized,
        R: RootFinder<S>,
    {
        self.check_inputs::<S>(t0, t_end, h)?;
        if h < minimum_step(t0, t_end) {
            warn!(h, "fixed step is below the minimum step size");
            return Err(RkfErrors::InvalidStep(h));
        }

        let steps = (((t_end - t0) / h - 1e-9).ceil() as usize).max(1);
        let stepper = RungeKutta::new(self.tableau);
        self.root_finder.reset();

        let capacity = steps.min(DEFAULT_MAX_STEPS).saturating_add(1);
        let mut trajectory = Trajectory::new(t0, y0.clone(), capacity);
        let mut t = t0;
        let mut y = y0.clone();

        debug!(t0, t_end, h, steps, "starting fixed step integration");

        for i in 0..steps {
            let dt = h.min(t_end - t);
            trajectory.attempts += 1;
            let estimate = stepper.step(model, &mut self.root_finder, t, &y, dt)?;
            trajectory.fn_evals += estimate.fn_evals;
            trajectory.nonlinear_failures += estimate.nonlinear_failures;

            if !estimate.low.is_finite() {
                trajectory.failed = true;
                warn!(t, "state is no longer finite, stopping");
                break;
            }

            trajectory.estimated_error += distance(&estimate.low, &estimate.high);
            t = if i + 1 == steps {
                t_end
            } else {
                t0 + (i + 1) as f64 * h
            };
            y = estimate.low;
            trajectory.push(t, y.clone());
        }

        Ok(trajectory)
    }
}

/// The preset tableaus, selectable by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scheme {
    Rk12,
    Rkf12,
    Rk23,
    #[default]
    Rk45,
    DormandPrince45,
    Esdirk12,
    Esdirk34,
}

impl Scheme {
    pub const ALL: [Scheme; 7] = [
        Scheme::Rk12,
        Scheme::Rkf12,
        Scheme::Rk23,
        Scheme::Rk45,
        Scheme::DormandPrince45,
        Scheme::Esdirk12,
        Scheme::Esdirk34,
    ];

    pub fn order(&self) -> u32 {
        match self {
            Scheme::Rk12 => ButcherTableau::<2>::RK12.order(),
            Scheme::Rkf12 => ButcherTableau::<3>::RKF12.order(),
            Scheme::Rk23 => ButcherTableau::<4>::RK23.order(),
            Scheme::Rk45 => ButcherTableau::<6>::RK45.order(),
            Scheme::DormandPrince45 => ButcherTableau::<7>::DORMAND_PRINCE45.order(),
            Scheme::Esdirk12 => ButcherTableau::<2>::ESDIRK12.order(),
            Scheme::Esdirk34 => ButcherTableau::<4>::ESDIRK34.order(),
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, Scheme::Esdirk12 | Scheme::Esdirk34)
    }

    /// Runs the adaptive driver with this scheme on the interval, initial
    /// step, tolerance and budget given by `options`.
    pub fn integrate<S, M, R>(
        self,
        model: &M,
        y0: &S,
        options: &IntegrationOptions,
        root_finder: R,
    ) -> Result<Trajectory<S>, RkfErrors>
    where
        S: OdeState,
        M: OdeModel<S> + ?Sized,
        R: RootFinder<S>,
    {
        match self {
            Scheme::Rk12 => adaptive(&ButcherTableau::<2>::RK12, model, y0, options, root_finder),
            Scheme::Rkf12 => adaptive(&ButcherTableau::<3>::RKF12, model, y0, options, root_finder),
            Scheme::Rk23 => adaptive(&ButcherTableau::<4>::RK23, model, y0, options, root_finder),
            Scheme::Rk45 => adaptive(&ButcherTableau::<6>::RK45, model, y0, options, root_finder),
            Scheme::DormandPrince45 => adaptive(
                &ButcherTableau::<7>::DORMAND_PRINCE45,
                model,
                y0,
                options,
                root_finder,
            ),
            Scheme::Esdirk12 => {
                adaptive(&ButcherTableau::<2>::ESDIRK12, model, y0, options, root_finder)
            }
            Scheme::Esdirk34 => {
                adaptive(&ButcherTableau::<4>::ESDIRK34, model, y0, options, root_finder)
            }
        }
    }

    /// Runs the fixed step driver with `options.h_init` as the step.
    pub fn integrate_fixed<S, M, R>(
        self,
        model: &M,
        y0: &S,
        options: &IntegrationOptions,
        root_finder: R,
    ) -> Result<Trajectory<S>, RkfErrors>
    where
        S: OdeState,
        M: OdeModel<S> + ?Sized,
        R: RootFinder<S>,
    {
        match self {
            Scheme::Rk12 => fixed(&ButcherTableau::<2>::RK12, model, y0, options, root_finder),
            Scheme::Rkf12 => fixed(&ButcherTableau::<3>::RKF12, model, y0, options, root_finder),
            Scheme::Rk23 => fixed(&ButcherTableau::<4>::RK23, model, y0, options, root_finder),
            Scheme::Rk45 => fixed(&ButcherTableau::<6>::RK45, model, y0, options, root_finder),
            Scheme::DormandPrince45 => fixed(
                &ButcherTableau::<7>::DORMAND_PRINCE45,
                model,
                y0,
                options,
                root_finder,
            ),
            Scheme::Esdirk12 => {
                fixed(&ButcherTableau::<2>::ESDIRK12, model, y0, options, root_finder)
            }
            Scheme::Esdirk34 => {
                fixed(&ButcherTableau::<4>::ESDIRK34, model, y0, options, root_finder)
            }
        }
    }
}

fn adaptive<const STAGES: usize, S, M, R>(
    tableau: &ButcherTableau<STAGES>,
    model: &M,
    y0: &S,
    options: &IntegrationOptions,
    root_finder: R,
) -> Result<Trajectory<S>, RkfErrors>
where
    S: OdeState,
    M: OdeModel<S> + ?Sized,
    R: RootFinder<S>,
{
    Rkf::new(tableau)
        .with_step_control(options.step_control)
        .with_root_finder(root_finder)
        .integrate(
            model,
            options.t0,
            options.t_end,
            y0,
            options.h_init,
            options.tolerance,
            options.max_steps,
        )
}

fn fixed<const STAGES: usize, S, M, R>(
    tableau: &ButcherTableau<STAGES>,
    model: &M,
    y0: &S,
    options: &IntegrationOptions,
    root_finder: R,
) -> Result<Trajectory<S>, RkfErrors>
where
    S: OdeState,
    M: OdeModel<S> + ?Sized,
    R: RootFinder<S>,
{
    Rkf::new(tableau)
        .with_root_finder(root_finder)
        .integrate_fixed(model, options.t0, options.t_end, y0, options.h_init)
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scheme::Rk12 => "RK12",
            Scheme::Rkf12 => "RKF12",
            Scheme::Rk23 => "RK23",
            Scheme::Rk45 => "RK45",
            Scheme::DormandPrince45 => "DORMAND_PRINCE45",
            Scheme::Esdirk12 => "ESDIRK12",
            Scheme::Esdirk34 => "ESDIRK34",
        };
        f.write_str(name)
    }
}

impl FromStr for Scheme {
    type Err = RkfErrors;

    /// Case insensitive, `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase().replace('-', "_");
        match name.as_str() {
            "RK12" => Ok(Scheme::Rk12),
            "RKF12" => Ok(Scheme::Rkf12),
            "RK23" => Ok(Scheme::Rk23),
            "RK45" | "RKF45" => Ok(Scheme::Rk45),
            "DORMAND_PRINCE45" | "DOPRI45" => Ok(Scheme::DormandPrince45),
            "ESDIRK12" => Ok(Scheme::Esdirk12),
            "ESDIRK34" => Ok(Scheme::Esdirk34),
            _ => Err(RkfErrors::UnknownScheme(s.to_string())),
        }
    }
}
