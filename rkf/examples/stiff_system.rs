use nalgebra::DVector;
use newton::{JacobianKind, Newton, NewtonOptions};
use rkf::{ButcherTableau, Rkf};
use std::error::Error;
use tracing::Level;

// one fast mode (-1000) and one slow mode (-1)
fn stiff(_t: f64, y: &DVector<f64>) -> DVector<f64> {
    DVector::from_vec(vec![-1000.0 * y[0] + y[1], -y[1]])
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_max_level(Level::WARN).init();

    let y0 = DVector::from_vec(vec![1.0, 1.0]);
    let h = 0.01;

    let newton = Newton::new(JacobianKind::Discrete, NewtonOptions::implicit_stage());
    let implicit = Rkf::new(&ButcherTableau::<4>::ESDIRK34)
        .with_root_finder(newton)
        .integrate_fixed(&stiff, 0.0, 1.0, &y0, h)?;
    let explicit = Rkf::new(&ButcherTableau::<6>::RK45).integrate_fixed(&stiff, 0.0, 1.0, &y0, h)?;

    for (name, trajectory) in [("ESDIRK34", &implicit), ("RK45", &explicit)] {
        let (t, y) = trajectory
            .last()
            .ok_or("empty trajectory")?;
        println!(
            "{name:>8}: t = {t:.2}, |y| = {:e}, outcome {:?}",
            y.norm(),
            trajectory.outcome()
        );
    }

    let adaptive = Rkf::new(&ButcherTableau::<4>::ESDIRK34)
        .with_root_finder(Newton::new(JacobianKind::Discrete, NewtonOptions::implicit_stage()))
        .integrate(&stiff, 0.0, 1.0, &y0, h, 1e-4, rkf::DEFAULT_MAX_STEPS)?;
    println!();
    println!("{adaptive}");
    Ok(())
}
