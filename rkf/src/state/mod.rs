use std::{
    fmt::Debug,
    ops::{AddAssign, MulAssign},
};

pub mod state_array;
pub mod state_matrix;
pub mod state_vector;

/// A value that can be integrated: a scalar, a fixed-size array, a dynamic
/// vector or a dynamic matrix.
///
/// Runge-Kutta stages only ever need in-place accumulation (`y += &k`) and
/// scaling (`k *= h`), plus a norm for the error estimate.
pub trait OdeState: Clone + Debug + MulAssign<f64>
where
    for<'a> Self: AddAssign<&'a Self>,
{
    /// Norm used by the step controller: absolute value for scalars,
    /// Euclidean for vectors, Frobenius for matrices.
    fn norm(&self) -> f64;

    /// True when every component is finite.
    fn is_finite(&self) -> bool;

    /// Appends the components to `row`, column-major for matrices.
    fn write_row(&self, row: &mut Vec<f64>);
}

impl OdeState for f64 {
    fn norm(&self) -> f64 {
        self.abs()
    }

    fn is_finite(&self) -> bool {
        f64::is_finite(*self)
    }

    fn write_row(&self, row: &mut Vec<f64>) {
        row.push(*self);
    }
}

/// `norm(a - b)` without requiring subtraction on the state type.
pub fn distance<S: OdeState>(a: &S, b: &S) -> f64 {
    let mut difference = b.clone();
    difference *= -1.0;
    difference += a;
    difference.norm()
}
