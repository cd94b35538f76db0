use std::{fs, path::Path};

use newton::{JacobianKind, Newton, NewtonOptions};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{DEFAULT_MAX_STEPS, RkfErrors, solvers::Scheme, stepping::AdaptiveStepControl};

/// Everything needed to run an integration besides the model and the
/// initial state.
///
/// Every field has a default, so a RON file only needs to list what differs:
///
/// ```ron
/// (
///     t_end: 10.0,
///     tolerance: 1e-4,
///     scheme: ESDIRK34,
///     newton: (max_iter: 20),
/// )
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationOptions {
    pub t0: f64,
    pub t_end: f64,
    /// Initial step of adaptive runs, constant step of fixed step runs.
    pub h_init: f64,
    pub tolerance: f64,
    /// Budget of attempted steps, rejected ones included.
    pub max_steps: usize,
    pub scheme: Scheme,
    pub step_control: AdaptiveStepControl,
    /// Jacobian approximation of the implicit stage solver.
    pub jacobian: JacobianKind,
    /// Settings of the implicit stage solver. Fields left out of a
    /// `newton: (..)` block keep their [`NewtonOptions::implicit_stage`] values.
    #[serde(deserialize_with = "implicit_stage_newton")]
    pub newton: NewtonOptions,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t_end: 1.0,
            h_init: 0.1,
            tolerance: 1e-6,
            max_steps: DEFAULT_MAX_STEPS,
            scheme: Scheme::default(),
            step_control: AdaptiveStepControl::default(),
            jacobian: JacobianKind::default(),
            newton: NewtonOptions::implicit_stage(),
        }
    }
}

impl IntegrationOptions {
    pub fn from_ron_str(text: &str) -> Result<Self, RkfErrors> {
        Ok(ron::from_str(text)?)
    }

    pub fn from_ron_file(path: impl AsRef<Path>) -> Result<Self, RkfErrors> {
        let text = fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    pub fn to_ron_string(&self) -> Result<String, RkfErrors> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    pub fn with_interval(mut self, t0: f64, t_end: f64) -> Self {
        self.t0 = t0;
        self.t_end = t_end;
        self
    }

    pub fn with_h_init(mut self, h_init: f64) -> Self {
        self.h_init = h_init;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Root finder for the implicit stages, built from `jacobian` and `newton`.
    pub fn root_finder(&self) -> Newton {
        Newton::new(self.jacobian, self.newton)
    }
}

// Mirror of `NewtonOptions` whose missing fields come from the implicit stage
// settings rather than from `NewtonOptions::default()`.
#[derive(Deserialize)]
#[serde(default)]
struct StageNewtonOptions {
    tolerance: f64,
    min_res: f64,
    max_iter: usize,
    backtrack: bool,
    stop_on_stagnation: bool,
    alpha: f64,
    backstep_reduction: f64,
    max_back_steps: usize,
    lambda_init: f64,
}

impl Default for StageNewtonOptions {
    fn default() -> Self {
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
        } = NewtonOptions::implicit_stage();
        Self {
            tolerance,
            min_res,
            max_iter,
            backtrack,
            stop_on_stagnation,
            alpha,
            backstep_reduction,
            max_back_steps,
            lambda_init,
        }
    }
}

fn implicit_stage_newton<'de, D>(deserializer: D) -> Result<NewtonOptions, D::Error>
where
    D: Deserializer<'de>,
{
    let StageNewtonOptions {
        tolerance,
        min_res,
        max_iter,
        backtrack,
        stop_on_stagnation,
        alpha,
        backstep_reduction,
        max_back_steps,
        lambda_init,
    } = StageNewtonOptions::deserialize(deserializer)?;
    Ok(NewtonOptions {
        tolerance,
        min_res,
        max_iter,
        backtrack,
        stop_on_stagnation,
        alpha,
        backstep_reduction,
        max_back_steps,
        lambda_init,
    })
}
