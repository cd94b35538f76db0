use std::ops::{AddAssign, Deref, DerefMut, MulAssign};

use super::OdeState;

/// A fixed-size array of `N` f64 components used as an ODE state.
///
/// Stack allocated, so the stages of a step do not touch the heap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateArray<const N: usize>([f64; N]);

impl<const N: usize> StateArray<N> {
    pub fn new(array: [f64; N]) -> Self {
        Self(array)
    }
}

impl<const N: usize> Default for StateArray<N> {
    /// All components are zero.
    fn default() -> Self {
        Self([0.0; N])
    }
}

impl<const N: usize> From<[f64; N]> for StateArray<N> {
    fn from(array: [f64; N]) -> Self {
        Self(array)
    }
}

impl<const N: usize> AddAssign<&Self> for StateArray<N> {
    fn add_assign(&mut self, rhs: &Self) {
        for i in 0..N {
            self.0[i] += rhs.0[i];
        }
    }
}

impl<const N: usize> MulAssign<f64> for StateArray<N> {
    fn mul_assign(&mut self, rhs: f64) {
        for i in 0..N {
            self.0[i] *= rhs;
        }
    }
}

impl<const N: usize> Deref for StateArray<N> {
    type Target = [f64; N];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> DerefMut for StateArray<N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const N: usize> OdeState for StateArray<N> {
    /// Euclidean norm.
    fn norm(&self) -> f64 {
        self.0.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    fn is_finite(&self) -> bool {
        self.0.iter().all(|x| f64::is_finite(*x))
    }

    fn write_row(&self, row: &mut Vec<f64>) {
        row.extend_from_slice(&self.0);
    }
}
