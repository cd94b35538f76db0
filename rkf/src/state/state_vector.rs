use nalgebra::{DVector, Matrix};

use super::OdeState;

/// Heap allocated state whose dimension is only known at run time.
impl OdeState for DVector<f64> {
    /// Euclidean norm.
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
