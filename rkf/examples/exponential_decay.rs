use rkf::{ButcherTableau, Rkf};
use std::error::Error;
use tracing::Level;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let decay = |_t: f64, y: &f64| -10.0 * y;
    let trajectory = Rkf::new(&ButcherTableau::<6>::RK45).integrate(
        &decay, 0.0, 10.0, &1.0, 0.2, 1e-4, rkf::DEFAULT_MAX_STEPS,
    )?;

    println!("{trajectory}");

    let path = std::env::current_dir()?.join("results").join("exponential_decay.csv");
    trajectory.write_csv(&path)?;
    println!("written to {}", path.display());
    Ok(())
}
