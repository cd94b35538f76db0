use std::fmt;

use crate::OdeState;

/// Overall verdict of an integration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Reached the end of the interval within tolerance.
    Success,
    /// Reached the end of the interval, but the floor step was forced through
    /// or an implicit stage did not converge.
    Degraded,
    /// Ran out of attempts or produced a non-finite state before the end.
    Failed,
}

/// Accepted points of an integration together with its statistics.
///
/// `times[0]` and `states[0]` are the initial condition. `times` is strictly
/// increasing and, unless `failed`, ends exactly at the requested end time.
#[derive(Clone, Debug)]
pub struct Trajectory<S> {
    pub times: Vec<f64>,
    pub states: Vec<S>,
    /// Sum of the local error estimates of the accepted steps.
    pub estimated_error: f64,
    pub failed: bool,
    /// Accepted steps after which the step was grown.
    pub expansions: usize,
    /// Rejected steps.
    pub contractions: usize,
    /// Steps tried, accepted or not.
    pub attempts: usize,
    /// Right-hand side evaluations, root finding included.
    pub fn_evals: usize,
    /// Set when a step was forced through at the minimum step size.
    pub minimal_step: bool,
    /// Implicit stages whose root find did not converge.
    pub nonlinear_failures: usize,
}

impl<S> Trajectory<S> {
    pub(crate) fn new(t0: f64, y0: S, capacity: usize) -> Self {
        let mut times = Vec::with_capacity(capacity);
        let mut states = Vec::with_capacity(capacity);
        times.push(t0);
        states.push(y0);
        Self {
            times,
            states,
            estimated_error: 0.0,
            failed: false,
            expansions: 0,
            contractions: 0,
            attempts: 0,
            fn_evals: 0,
            minimal_step: false,
            nonlinear_failures: 0,
        }
    }

    pub(crate) fn push(&mut self, t: f64, y: S) {
        self.times.push(t);
        self.states.push(y);
    }

    /// Number of stored points, initial condition included.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Accepted steps taken.
    pub fn steps(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Last stored time and state.
    pub fn last(&self) -> Option<(f64, &S)> {
        Some((*self.times.last()?, self.states.last()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &S)> {
        self.times.iter().copied().zip(self.states.iter())
    }

    /// Smallest and largest accepted step sizes.
    pub fn step_bounds(&self) -> Option<(f64, f64)> {
        self.times.windows(2).map(|w| w[1] - w[0]).fold(None, |bounds, h| match bounds {
            None => Some((h, h)),
            Some((min, max)) => Some((min.min(h), max.max(h))),
        })
    }

    pub fn outcome(&self) -> Outcome {
        if self.failed {
            Outcome::Failed
        } else if self.minimal_step || self.nonlinear_failures > 0 {
            Outcome::Degraded
        } else {
            Outcome::Success
        }
    }
}

impl<S: OdeState> fmt::Display for Trajectory<S> {
    /// A summary header followed by one `t y...` row per stored point.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "outcome            : {:?}", self.outcome())?;
        writeln!(f, "steps              : {}", self.steps())?;
        writeln!(f, "attempts           : {}", self.attempts)?;
        writeln!(f, "contractions       : {}", self.contractions)?;
        writeln!(f, "expansions         : {}", self.expansions)?;
        writeln!(f, "function evals     : {}", self.fn_evals)?;
        writeln!(f, "estimated error    : {:e}", self.estimated_error)?;
        if self.nonlinear_failures > 0 {
            writeln!(f, "nonlinear failures : {}", self.nonlinear_failures)?;
        }
        if let Some((h_min, h_max)) = self.step_bounds() {
            writeln!(f, "hmin               : {:e}", h_min)?;
            writeln!(f, "hmax               : {:e}", h_max)?;
        }

        let mut row = Vec::new();
        for (t, y) in self.iter() {
            row.clear();
            y.write_row(&mut row);
            write!(f, "{t}")?;
            for value in &row {
                write!(f, " {value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample() -> Trajectory<f64> {
        let mut trajectory = Trajectory::new(0.0, 1.0_f64, 4);
        trajectory.push(0.5, 0.5);
        trajectory.push(0.75, 0.25);
        trajectory.push(1.0, 0.125);
        trajectory.attempts = 4;
        trajectory.contractions = 1;
        trajectory
    }

    #[test]
    fn test_step_bounds() {
        let (h_min, h_max) = sample().step_bounds().unwrap();
        assert_abs_diff_eq!(h_min, 0.25, epsilon = 1e-15);
        assert_abs_diff_eq!(h_max, 0.5, epsilon = 1e-15);
        assert!(Trajectory::new(0.0, 1.0_f64, 1).step_bounds().is_none());
    }

    #[test]
    fn test_outcome() {
        let mut trajectory = sample();
        assert_eq!(trajectory.outcome(), Outcome::Success);
        trajectory.minimal_step = true;
        assert_eq!(trajectory.outcome(), Outcome::Degraded);
        trajectory.failed = true;
        assert_eq!(trajectory.outcome(), Outcome::Failed);
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.contains("steps              : 3"));
        assert!(text.contains("contractions       : 1"));
        assert!(text.contains("hmin               : 2.5e-1"));
        assert!(text.ends_with("0.75 0.25\n1 0.125\n"));
    }

    #[test]
    fn test_last() {
        let trajectory = sample();
        assert_eq!(trajectory.last(), Some((1.0, &0.125)));
        assert_eq!(trajectory.steps(), 3);
        assert_eq!(trajectory.iter().count(), 4);
    }
}
