use nalgebra::DVector;
use rkf::{ExplicitOnly, IntegrationOptions};
use std::error::Error;
use tracing::Level;

const MU: f64 = 2.0;

fn van_der_pol(_t: f64, y: &DVector<f64>) -> DVector<f64> {
    DVector::from_vec(vec![y[1], MU * (1.0 - y[0] * y[0]) * y[1] - y[0]])
}

// pass a RON file as the first argument to override the defaults below
const DEFAULT_OPTIONS: &str = "(
    t_end: 20.0,
    h_init: 0.01,
    tolerance: 1e-6,
    max_steps: 20000,
    scheme: DORMAND_PRINCE45,
)";

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let options = match std::env::args().nth(1) {
        Some(path) => IntegrationOptions::from_ron_file(path)?,
        None => IntegrationOptions::from_ron_str(DEFAULT_OPTIONS)?,
    };
    let y0 = DVector::from_vec(vec![2.0, 0.0]);

    let trajectory = if options.scheme.is_implicit() {
        options
            .scheme
            .integrate(&van_der_pol, &y0, &options, options.root_finder())?
    } else {
        options
            .scheme
            .integrate(&van_der_pol, &y0, &options, ExplicitOnly)?
    };

    println!("scheme             : {}", options.scheme);
    println!("outcome            : {:?}", trajectory.outcome());
    println!("steps              : {}", trajectory.steps());
    println!("attempts           : {}", trajectory.attempts);
    if let Some((h_min, h_max)) = trajectory.step_bounds() {
        println!("step sizes         : {h_min:e} .. {h_max:e}");
    }
    if let Some((t, y)) = trajectory.last() {
        println!("y({t}) = [{}, {}]", y[0], y[1]);
    }

    trajectory.write_csv(std::env::current_dir()?.join("results").join("van_der_pol.csv"))?;
    Ok(())
}
