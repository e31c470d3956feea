//! Kernel derivative primitives consumed by the estimators.
//!
//! Every method takes the coordinates of a left point `x` and a right point `y`
//! and differentiates `k(x, y)`. Names follow the variable being differentiated:
//! `dx` is with respect to the left argument, `dy` the right one. Indices `i`,
//! `j` select coordinates; the `dx_i_dx_j...` family returns whole vectors or
//! matrices over the free indices.

use ndarray::{Array1, Array2, ArrayView1};

mod gaussian;

pub use gaussian::Gaussian;

/// Derivative tensors of a translation-invariant RKHS kernel.
///
/// Implementations must be free of side effects: the estimators call them
/// concurrently from the assembly thread pool.
pub trait KernelDerivatives: Send + Sync {
    /// `k(x, y)`.
    fn value(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64;

    /// `d k / d x_i`.
    fn dx_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize) -> f64;

    /// `d^2 k / d x_i^2`.
    fn dx_dx_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize) -> f64;

    /// `d^2 k / d x_i d y_j`.
    fn dx_dy_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize, j: usize) -> f64;

    /// `d^3 k / d x_i^2 d y_j`.
    fn dx_dx_dy_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64;

    /// `d^4 k / d x_i^2 d y_j^2`.
    fn dx_dx_dy_dy_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64;

    /// Vector over `j` of `d^3 k / d x_i^2 d x_j`.
    fn dx_i_dx_i_dx_j_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
    ) -> Array1<f64>;

    /// Vector over `j` of `d^2 k / d x_i d x_j`.
    fn dx_i_dx_j_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize)
    -> Array1<f64>;

    /// Matrix over `(i, j)` of `sum_k d^4 k / d x_i d x_j d x_k^2`.
    fn dx_i_dx_j_dx_k_dx_k_row_sum(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array2<f64>;

    /// Entry `(i, j)` of [`Self::dx_i_dx_j_dx_k_dx_k_row_sum`].
    fn dx_i_dx_j_dx_k_dx_k_row_sum_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        self.dx_i_dx_j_dx_k_dx_k_row_sum(x, y)[[i, j]]
    }

    /// Matrix over `(i, j)` of `sum_k v_k d^3 k / d x_i d x_j d x_k`.
    fn dx_i_dx_j_dx_k_dot_vec(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
    ) -> Array2<f64>;

    /// Entry `(i, j)` of [`Self::dx_i_dx_j_dx_k_dot_vec`].
    fn dx_i_dx_j_dx_k_dot_vec_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        self.dx_i_dx_j_dx_k_dot_vec(x, y, v)[[i, j]]
    }
}
