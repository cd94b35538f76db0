use std::f64::consts::{FRAC_PI_2, PI};

use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use newton::{JacobianKind, Newton, NewtonOptions};
use rkf::{
    ButcherTableau, IntegrationOptions, OdeState, Outcome, Rkf, RkfErrors, Scheme, StateArray,
    Trajectory,
};

fn assert_strictly_increasing<S>(trajectory: &Trajectory<S>) {
    for w in trajectory.times.windows(2) {
        assert!(w[1] > w[0], "times not increasing: {} then {}", w[0], w[1]);
    }
    assert_eq!(trajectory.times.len(), trajectory.states.len());
}

fn stiff_system(_t: f64, y: &DVector<f64>) -> DVector<f64> {
    DVector::from_vec(vec![-1000.0 * y[0] + y[1], -y[1]])
}

fn implicit_newton() -> Newton {
    Newton::new(JacobianKind::Discrete, NewtonOptions::implicit_stage())
}

#[test]
fn test_exponential_decay() {
    let decay = |_t: f64, y: &f64| -10.0 * y;
    let trajectory = Rkf::new(&ButcherTableau::<6>::RK45)
        .integrate(&decay, 0.0, 10.0, &1.0, 0.2, 1e-4, 2000)
        .unwrap();

    assert!(!trajectory.failed);
    assert_eq!(trajectory.outcome(), Outcome::Success);
    assert_eq!(*trajectory.times.last().unwrap(), 10.0);
    assert_abs_diff_eq!(*trajectory.states.last().unwrap(), 0.0, epsilon = 1e-3);
    assert!(trajectory.estimated_error <= 1e-4);
    assert!(trajectory.expansions > 0);
    assert!(trajectory.contractions > 0);
    assert_eq!(
        trajectory.attempts,
        trajectory.steps() + trajectory.contractions
    );
    assert_strictly_increasing(&trajectory);

    // the error is controlled along the whole trajectory, not only at the end
    for (t, y) in trajectory.iter() {
        assert_abs_diff_eq!(*y, (-10.0 * t).exp(), epsilon = 1e-3);
    }
}

#[test]
fn test_empty_interval_is_a_configuration_error() {
    let decay = |_t: f64, y: &f64| -10.0 * y;
    let result =
        Rkf::new(&ButcherTableau::<6>::RK45).integrate(&decay, 0.0, 0.0, &1.0, 0.2, 1e-4, 2000);
    assert!(matches!(
        result,
        Err(RkfErrors::InvalidInterval { t0, t_end }) if t0 == 0.0 && t_end == 0.0
    ));
}

#[test]
fn test_one_period_of_cosine() {
    let f = |t: f64, _y: &f64| -t.sin();
    let tol = 1e-4;
    let trajectory = Rkf::new(&ButcherTableau::<4>::RK23)
        .integrate(&f, 0.0, 2.0 * PI, &1.0, 0.2, tol, 2000)
        .unwrap();

    assert_eq!(trajectory.outcome(), Outcome::Success);
    assert_abs_diff_eq!(*trajectory.times.last().unwrap(), 2.0 * PI, epsilon = 1e-12);
    assert_abs_diff_eq!(*trajectory.states.last().unwrap(), 1.0, epsilon = tol);
    for (t, y) in trajectory.iter() {
        assert_abs_diff_eq!(*y, t.cos(), epsilon = tol);
    }
    assert_strictly_increasing(&trajectory);
}

#[test]
fn test_stiff_system_fixed_step() {
    let y0 = DVector::from_vec(vec![1.0, 1.0]);
    let h = 0.01;

    let trajectory = Rkf::new(&ButcherTableau::<2>::ESDIRK12)
        .with_root_finder(implicit_newton())
        .integrate_fixed(&stiff_system, 0.0, 1.0, &y0, h)
        .unwrap();
    assert!(!trajectory.failed);
    assert!(trajectory.states.iter().all(|y| y.norm() < 1.5));

    let trajectory = Rkf::new(&ButcherTableau::<4>::ESDIRK34)
        .with_root_finder(implicit_newton())
        .integrate_fixed(&stiff_system, 0.0, 1.0, &y0, h)
        .unwrap();
    assert!(!trajectory.failed);
    assert_eq!(trajectory.nonlinear_failures, 0);
    assert!(trajectory.states.iter().all(|y| y.norm() < 1.5));
    assert_abs_diff_eq!(trajectory.states.last().unwrap()[1], (-1.0_f64).exp(), epsilon = 1e-4);

    // the same step is far outside the stability region of the explicit pairs
    let explicit = Rkf::new(&ButcherTableau::<6>::RK45)
        .integrate_fixed(&stiff_system, 0.0, 1.0, &y0, h)
        .unwrap();
    let last = explicit.states.last().unwrap();
    assert!(explicit.failed || !(OdeState::norm(last) < 1e3));
}

#[test]
fn test_stiff_system_adaptive() {
    let y0 = DVector::from_vec(vec![1.0, 1.0]);

    let implicit = Rkf::new(&ButcherTableau::<4>::ESDIRK34)
        .with_root_finder(implicit_newton())
        .integrate(&stiff_system, 0.0, 1.0, &y0, 0.01, 1e-4, 2000)
        .unwrap();
    assert_eq!(implicit.outcome(), Outcome::Success);
    assert_eq!(*implicit.times.last().unwrap(), 1.0);
    assert!(implicit.states.iter().all(|y| y.norm() <= 2.0_f64.sqrt() + 1e-9));
    assert!(implicit.fn_evals > implicit.attempts * 4);

    let explicit = Rkf::new(&ButcherTableau::<6>::RK45)
        .integrate(&stiff_system, 0.0, 1.0, &y0, 0.01, 1e-4, 2000)
        .unwrap();
    assert!(!explicit.failed);
    assert!(implicit.contractions < explicit.contractions);
}

#[test]
fn test_state_array_with_implicit_scheme() {
    let f = |_t: f64, y: &StateArray<2>| StateArray::new([y[1], -y[0]]);
    let trajectory = Rkf::new(&ButcherTableau::<4>::ESDIRK34)
        .with_root_finder(implicit_newton())
        .integrate(&f, 0.0, FRAC_PI_2, &StateArray::new([1.0, 0.0]), 0.05, 1e-6, 2000)
        .unwrap();

    assert_eq!(trajectory.outcome(), Outcome::Success);
    let (t, y) = trajectory.last().unwrap();
    assert_eq!(t, FRAC_PI_2);
    assert_abs_diff_eq!(y[0], 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(y[1], -1.0, epsilon = 1e-4);
}

#[test]
fn test_matrix_state() {
    // Y' = A Y with Y(0) = I gives the rotation exp(A t)
    let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]);
    let f = |_t: f64, y: &DMatrix<f64>| &a * y;
    let trajectory = Rkf::new(&ButcherTableau::<7>::DORMAND_PRINCE45)
        .integrate(&f, 0.0, FRAC_PI_2, &DMatrix::identity(2, 2), 0.1, 1e-8, 2000)
        .unwrap();

    assert!(!trajectory.failed);
    let y = trajectory.states.last().unwrap();
    let expected = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]);
    assert_abs_diff_eq!(OdeState::norm(&(y - expected)), 0.0, epsilon = 1e-6);
}

#[test]
fn test_step_budget() {
    let decay = |_t: f64, y: &f64| -10.0 * y;
    let trajectory = Rkf::new(&ButcherTableau::<6>::RK45)
        .integrate(&decay, 0.0, 10.0, &1.0, 0.2, 1e-4, 5)
        .unwrap();

    assert!(trajectory.failed);
    assert_eq!(trajectory.outcome(), Outcome::Failed);
    assert_eq!(trajectory.attempts, 5);
    assert!(*trajectory.times.last().unwrap() < 10.0);
    assert_eq!(trajectory.len(), 1 + trajectory.attempts - trajectory.contractions);
    assert_strictly_increasing(&trajectory);
}

#[test]
fn test_minimum_step_is_forced_through() {
    // a jump in the right-hand side cannot be resolved by shrinking the step
    let f = |t: f64, _y: &f64| if t < 0.5 { 0.0 } else { 100.0 };
    let trajectory = Rkf::new(&ButcherTableau::<2>::RK12)
        .integrate(&f, 0.0, 1.0, &0.0, 0.1, 1e-12, 2000)
        .unwrap();

    assert!(!trajectory.failed);
    assert!(trajectory.minimal_step);
    assert_eq!(trajectory.outcome(), Outcome::Degraded);
    assert_eq!(*trajectory.times.last().unwrap(), 1.0);
    assert_abs_diff_eq!(*trajectory.states.last().unwrap(), 50.0, epsilon = 1e-9);
    assert_strictly_increasing(&trajectory);
}

#[test]
fn test_unconverged_stages_degrade_the_run() {
    let f = |_t: f64, y: &DVector<f64>| y.map(|v| -v.powi(3));
    let newton = Newton::new(
        JacobianKind::Discrete,
        NewtonOptions::implicit_stage().with_max_iter(1),
    );
    let trajectory = Rkf::new(&ButcherTableau::<2>::ESDIRK12)
        .with_root_finder(newton)
        .integrate(&f, 0.0, 1.0, &DVector::from_vec(vec![10.0]), 0.1, 1e-3, 2000)
        .unwrap();

    assert!(trajectory.nonlinear_failures > 0);
    assert_ne!(trajectory.outcome(), Outcome::Success);
}

#[test]
fn test_non_finite_state_stops_the_run() {
    let f = |_t: f64, y: &f64| y * y;
    // blows up at t = 1
    let trajectory = Rkf::new(&ButcherTableau::<2>::RK12)
        .integrate_fixed(&f, 0.0, 10.0, &1.0, 0.25)
        .unwrap();

    assert!(trajectory.failed);
    assert!(trajectory.states.iter().all(|y| y.is_finite()));
    assert!(*trajectory.times.last().unwrap() < 10.0);
}

#[test]
fn test_scheme_from_options() {
    let options = IntegrationOptions::from_ron_str(
        "(t_end: 10.0, h_init: 0.2, tolerance: 1e-4, scheme: RK45)",
    )
    .unwrap();
    let decay = |_t: f64, y: &f64| -10.0 * y;
    let from_options = options
        .scheme
        .integrate(&decay, &1.0, &options, rkf::ExplicitOnly)
        .unwrap();
    let direct = Rkf::new(&ButcherTableau::<6>::RK45)
        .integrate(&decay, 0.0, 10.0, &1.0, 0.2, 1e-4, 2000)
        .unwrap();

    assert_eq!(from_options.times, direct.times);
    assert_eq!(from_options.states, direct.states);
}

#[test]
fn test_implicit_scheme_from_options() {
    let options = IntegrationOptions::default()
        .with_scheme(Scheme::Esdirk34)
        .with_h_init(0.01)
        .with_tolerance(1e-4);
    let y0 = DVector::from_vec(vec![1.0, 1.0]);
    let trajectory = options
        .scheme
        .integrate(&stiff_system, &y0, &options, options.root_finder())
        .unwrap();
    assert_eq!(trajectory.outcome(), Outcome::Success);

    let result = options
        .scheme
        .integrate(&stiff_system, &y0, &options, rkf::ExplicitOnly);
    assert!(matches!(result, Err(RkfErrors::ImplicitUnsupported)));
}

#[test]
fn test_root_finder_is_reused_across_runs() {
    let f = |_t: f64, y: &DVector<f64>| -y;
    let mut rkf = Rkf::new(&ButcherTableau::<2>::ESDIRK12).with_root_finder(implicit_newton());
    let y0 = DVector::from_vec(vec![1.0]);

    let first = rkf.integrate(&f, 0.0, 1.0, &y0, 0.1, 1e-3, 2000).unwrap();
    let second = rkf.integrate(&f, 0.0, 1.0, &y0, 0.1, 1e-3, 2000).unwrap();
    assert_eq!(first.times, second.times);
    assert_eq!(rkf.root_finder().options().max_iter, 100);
}
