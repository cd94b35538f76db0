use nalgebra::{DMatrix, Matrix};

use super::OdeState;

/// Matrix valued state, e.g. for matrix Riccati or Lyapunov equations.
///
/// The error norm is Frobenius. Rows are written column-major.
impl OdeState for DMatrix<f64> {
    fn norm(&self) -> f64 {
        Matrix::norm(self)
    }

    fn is_finite(&self) -> bool {
        self.iter().all(|x| f64::is_finite(*x))
    }

    fn write_row(&self, row: &mut Vec<f64>) {
        row.extend_from_slice(self.as_slice());
    }
}
