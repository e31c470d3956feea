use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Solved coefficient vector: `xi` followed by one `beta` per RKHS basis function.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlphaBeta(pub Array1<f64>);

impl AlphaBeta {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    /// Coefficient of the data-mean (`h`) direction.
    #[inline]
    pub fn xi(&self) -> f64 {
        self.0[0]
    }

    /// Coefficient of basis function `j`.
    #[inline]
    pub fn beta(&self, j: usize) -> f64 {
        self.0[1 + j]
    }

    pub fn betas(&self) -> ArrayView1<'_, f64> {
        self.0.slice(ndarray::s![1..])
    }
}

impl Deref for AlphaBeta {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Array1<f64>> for AlphaBeta {
    fn as_ref(&self) -> &Array1<f64> {
        &self.0
    }
}

impl From<Array1<f64>> for AlphaBeta {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl From<AlphaBeta> for Array1<f64> {
    fn from(values: AlphaBeta) -> Self {
        values.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn splits_xi_from_betas() {
        let ab = AlphaBeta::new(array![2.0, -1.0, 0.5]);
        assert_eq!(ab.xi(), 2.0);
        assert_eq!(ab.beta(1), 0.5);
        assert_eq!(ab.betas().to_vec(), vec![-1.0, 0.5]);
    }
}
