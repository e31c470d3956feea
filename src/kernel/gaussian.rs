use super::KernelDerivatives;
use crate::error::EstimatorError;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Gaussian kernel `k(x, y) = exp(-||x - y||^2 / sigma)`.
///
/// All derivatives are closed-form in `r = x - y` and `c = 2 / sigma`; every
/// term carries a trailing factor `k(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    sigma: f64,
}

#[inline]
fn delta(i: usize, j: usize) -> f64 {
    if i == j { 1.0 } else { 0.0 }
}

impl Gaussian {
    pub fn new(sigma: f64) -> Result<Self, EstimatorError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(EstimatorError::InvalidArgument(format!(
                "Gaussian kernel bandwidth must be finite and positive, got {sigma}"
            )));
        }
        Ok(Self { sigma })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    #[inline]
    fn c(&self) -> f64 {
        2.0 / self.sigma
    }

    #[inline]
    fn difference(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array1<f64> {
        &x - &y
    }

    #[inline]
    fn value_from_difference(&self, r: &Array1<f64>) -> f64 {
        (-r.dot(r) / self.sigma).exp()
    }

    #[inline]
    fn row_sum_entry(&self, r: &Array1<f64>, r_norm2: f64, k: f64, i: usize, j: usize) -> f64 {
        let c = self.c();
        let dim = r.len() as f64;
        let d_ij = delta(i, j);
        let rr = r[i] * r[j];
        k * (c * c * (dim + 2.0) * d_ij - c.powi(3) * ((dim + 4.0) * rr + d_ij * r_norm2)
            + c.powi(4) * rr * r_norm2)
    }

    #[inline]
    fn dot_vec_entry(
        &self,
        r: &Array1<f64>,
        v: ArrayView1<f64>,
        rv: f64,
        k: f64,
        i: usize,
        j: usize,
    ) -> f64 {
        let c = self.c();
        k * (c * c * (v[i] * r[j] + v[j] * r[i] + delta(i, j) * rv)
            - c.powi(3) * r[i] * r[j] * rv)
    }
}

impl KernelDerivatives for Gaussian {
    fn value(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        self.value_from_difference(&Self::difference(x, y))
    }

    fn dx_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize) -> f64 {
        let r = Self::difference(x, y);
        -self.c() * r[i] * self.value_from_difference(&r)
    }

    fn dx_dx_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize) -> f64 {
        let r = Self::difference(x, y);
        let c = self.c();
        (c * c * r[i] * r[i] - c) * self.value_from_difference(&r)
    }

    fn dx_dy_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize, j: usize) -> f64 {
        let r = Self::difference(x, y);
        let c = self.c();
        (c * delta(i, j) - c * c * r[i] * r[j]) * self.value_from_difference(&r)
    }

    fn dx_dx_dy_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        let r = Self::difference(x, y);
        let c = self.c();
        let k = self.value_from_difference(&r);
        (-2.0 * c * c * r[i] * delta(i, j) + (c * c * r[i] * r[i] - c) * c * r[j]) * k
    }

    fn dx_dx_dy_dy_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        let r = Self::difference(x, y);
        let c = self.c();
        let k = self.value_from_difference(&r);
        let d_ij = delta(i, j);
        let f_i = c * c * r[i] * r[i] - c;
        let f_j = c * c * r[j] * r[j] - c;
        (2.0 * c * c * d_ij - 4.0 * c.powi(3) * r[i] * r[i] * d_ij + f_i * f_j) * k
    }

    fn dx_i_dx_i_dx_j_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
    ) -> Array1<f64> {
        let r = Self::difference(x, y);
        let c = self.c();
        let k = self.value_from_difference(&r);
        let f_i = c * c * r[i] * r[i] - c;
        Array1::from_shape_fn(r.len(), |j| {
            (2.0 * c * c * r[i] * delta(i, j) - c * r[j] * f_i) * k
        })
    }

    fn dx_i_dx_j_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
    ) -> Array1<f64> {
        let r = Self::difference(x, y);
        let c = self.c();
        let k = self.value_from_difference(&r);
        Array1::from_shape_fn(r.len(), |j| (c * c * r[i] * r[j] - c * delta(i, j)) * k)
    }

    fn dx_i_dx_j_dx_k_dx_k_row_sum(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        let r = Self::difference(x, y);
        let r_norm2 = r.dot(&r);
        let k = (-r_norm2 / self.sigma).exp();
        let d = r.len();
        Array2::from_shape_fn((d, d), |(i, j)| self.row_sum_entry(&r, r_norm2, k, i, j))
    }

    fn dx_i_dx_j_dx_k_dx_k_row_sum_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        let r = Self::difference(x, y);
        let r_norm2 = r.dot(&r);
        let k = (-r_norm2 / self.sigma).exp();
        self.row_sum_entry(&r, r_norm2, k, i, j)
    }

    fn dx_i_dx_j_dx_k_dot_vec(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
    ) -> Array2<f64> {
        let r = Self::difference(x, y);
        let k = self.value_from_difference(&r);
        let rv = r.dot(&v);
        let d = r.len();
        Array2::from_shape_fn((d, d), |(i, j)| self.dot_vec_entry(&r, v, rv, k, i, j))
    }

    fn dx_i_dx_j_dx_k_dot_vec_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        let r = Self::difference(x, y);
        let k = self.value_from_difference(&r);
        let rv = r.dot(&v);
        self.dot_vec_entry(&r, v, rv, k, i, j)
    }
}
