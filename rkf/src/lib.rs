//! Embedded Runge-Kutta-Fehlberg integration of `y' = f(t, y)`.
//!
//! A [`ButcherTableau`] describes an embedded pair: two weight rows sharing the
//! same stages, one carried forward and one used only to estimate the local
//! error. [`Rkf`] drives the pair over an interval, growing and shrinking the
//! step so that the accumulated error estimate stays within a tolerance
//! budget. Diagonally implicit tableaus resolve their stages through a
//! [`RootFinder`], by default the `newton` crate.
//!
//! ```no_run
//! use rkf::{ButcherTableau, Rkf};
//!
//! let decay = |_t: f64, y: &f64| -10.0 * y;
//! let trajectory = Rkf::new(&ButcherTableau::<6>::RK45)
//!     .integrate(&decay, 0.0, 10.0, &1.0, 0.2, 1e-4, 2000)
//!     .unwrap();
//! println!("{trajectory}");
//! ```

use thiserror::Error;

pub mod options;
pub mod result;
pub mod rk;
pub mod root_finder;
pub mod saving;
pub mod solvers;
pub mod state;
pub mod stepping;
pub mod tableau;

pub use options::IntegrationOptions;
pub use result::{Outcome, Trajectory};
pub use rk::{RungeKutta, StepEstimate};
pub use root_finder::{ExplicitOnly, RootFindOutcome, RootFinder};
pub use solvers::{Rkf, Scheme};
pub use state::{OdeState, state_array::StateArray};
pub use stepping::AdaptiveStepControl;
pub use tableau::ButcherTableau;

/// Step budget used when none is given.
pub const DEFAULT_MAX_STEPS: usize = 2000;

#[derive(Debug, Error)]
pub enum RkfErrors {
    #[error("integration interval is empty or reversed: t0 = {t0}, t_end = {t_end}")]
    InvalidInterval { t0: f64, t_end: f64 },
    #[error("step size must be positive and finite, got {0}")]
    InvalidStep(f64),
    #[error("tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),
    #[error("tableau has implicit stages but the root finder cannot solve them")]
    ImplicitUnsupported,
    #[error("unknown scheme '{0}'")]
    UnknownScheme(String),
    #[error("{0}")]
    Newton(#[from] newton::NewtonErrors),
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("{0}")]
    RonSerialize(#[from] ron::Error),
}

/// Right-hand side of a first order system `y' = f(t, y)`.
///
/// Any `Fn(f64, &S) -> S` closure is a model.
pub trait OdeModel<S> {
    fn f(&self, t: f64, y: &S) -> S;
}

impl<S, F> OdeModel<S> for F
where
    F: Fn(f64, &S) -> S,
{
    fn f(&self, t: f64, y: &S) -> S {
        self(t, y)
    }
}
