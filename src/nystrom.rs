//! Nystrom-approximated kernel exponential family estimator.
//!
//! The full score-matching system has one unknown per data coordinate
//! (`N*D + 1`). Here only `m` coordinates, the RKHS basis, carry coefficients,
//! which reduces the normal equations to `(m+1) x (m+1)` and makes every
//! evaluation loop over the `m` basis functions instead of the data.

use crate::basis::{idx_to_ai, sub_sample_rkhs_basis, validate_basis_indices};
use crate::config::{BasisSelection, NystromConfig, default_parallel};
use crate::error::EstimatorError;
use crate::estimator::{EstimatorBase, KernelExpFamily};
use crate::kernel::KernelDerivatives;
use crate::linalg::faer_ndarray::fast_ata;
use crate::linalg::utils::{assembly_thread_pool, ordered_sum, symmetrize_in_place};
use crate::types::AlphaBeta;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayViewMut1, Axis, s};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
pub struct Nystrom<K> {
    base: EstimatorBase<K>,
    rkhs_basis_inds: Vec<usize>,
    parallel: bool,
}

impl<K: KernelDerivatives> Nystrom<K> {
    /// Estimator over user-defined basis coordinates, kept in the given order.
    pub fn new(
        data: Array2<f64>,
        kernel: K,
        lambda: f64,
        rkhs_basis_inds: Vec<usize>,
    ) -> Result<Self, EstimatorError> {
        let base = EstimatorBase::new(data, kernel, lambda)?;
        validate_basis_indices(&rkhs_basis_inds, base.num_lhs(), base.num_dimensions())?;
        log::info!(
            "Using m={} user-defined RKHS basis functions.",
            rkhs_basis_inds.len()
        );
        Ok(Self {
            base,
            rkhs_basis_inds,
            parallel: default_parallel(),
        })
    }

    /// Estimator over `num_rkhs_basis` coordinates sampled uniformly from `rng`.
    pub fn with_num_basis<R: Rng + ?Sized>(
        data: Array2<f64>,
        kernel: K,
        lambda: f64,
        num_rkhs_basis: usize,
        rng: &mut R,
    ) -> Result<Self, EstimatorError> {
        let base = EstimatorBase::new(data, kernel, lambda)?;
        let rkhs_basis_inds = sub_sample_rkhs_basis(
            base.num_lhs(),
            base.num_dimensions(),
            num_rkhs_basis,
            rng,
        )?;
        Ok(Self {
            base,
            rkhs_basis_inds,
            parallel: default_parallel(),
        })
    }

    pub fn from_config(
        data: Array2<f64>,
        kernel: K,
        config: &NystromConfig,
    ) -> Result<Self, EstimatorError> {
        let estimator = match &config.basis {
            BasisSelection::Explicit { indices } => {
                Self::new(data, kernel, config.lambda, indices.clone())?
            }
            BasisSelection::Uniform { num_basis, seed } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                Self::with_num_basis(data, kernel, config.lambda, *num_basis, &mut rng)?
            }
        };
        Ok(estimator.with_parallel(config.parallel))
    }

    /// Toggle the thread-pool execution of the assembly loops.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn num_rkhs_basis(&self) -> usize {
        self.rkhs_basis_inds.len()
    }

    pub fn rkhs_basis_inds(&self) -> &[usize] {
        &self.rkhs_basis_inds
    }

    /// Uniform sub-sample of this estimator's coordinate universe.
    pub fn sub_sample_rkhs_basis<R: Rng + ?Sized>(
        &self,
        num_rkhs_basis: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>, EstimatorError> {
        sub_sample_rkhs_basis(
            self.base.num_lhs(),
            self.base.num_dimensions(),
            num_rkhs_basis,
            rng,
        )
    }

    #[inline]
    fn idx_to_ai(&self, idx: usize) -> (usize, usize) {
        idx_to_ai(idx, self.base.num_dimensions())
    }

    /// Evaluates `f` once per basis function, returning results in basis order.
    fn per_basis<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        let m = self.num_rkhs_basis();
        if self.parallel {
            assembly_thread_pool().install(|| (0..m).into_par_iter().map(f).collect())
        } else {
            (0..m).map(f).collect()
        }
    }

    /// Per-basis mean over the data of `sum_i d^3 k / d x_i^2 d y_j`, with the
    /// basis point `(b, j)` in the right argument.
    pub fn compute_h(&self) -> Array1<f64> {
        let n = self.base.num_lhs();
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();

        let h = self.per_basis(|idx| {
            let (b, j) = self.idx_to_ai(self.rkhs_basis_inds[idx]);
            let y = self.base.lhs_point(b);
            let mut acc = 0.0;
            for a in 0..n {
                let x = self.base.lhs_point(a);
                for i in 0..d {
                    acc += kernel.dx_dx_dy_component(x, y, i, j);
                }
            }
            acc
        });

        Array1::from(h) / n as f64
    }

    /// Squared norm of the `xi` direction, normalized by `N^2`.
    pub fn compute_xi_norm_2(&self) -> f64 {
        let n = self.base.num_lhs();
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();

        let partials = self.per_basis(|idx| {
            let (a, i) = self.idx_to_ai(self.rkhs_basis_inds[idx]);
            let x = self.base.lhs_point(a);
            let mut acc = 0.0;
            for b in 0..n {
                let y = self.base.lhs_point(b);
                for j in 0..d {
                    acc += kernel.dx_dx_dy_dy_component(x, y, i, j);
                }
            }
            acc
        });

        ordered_sum(&partials) / (n * n) as f64
    }

    fn fill_hessian_column(&self, idx: usize, mut column: ArrayViewMut1<f64>) {
        let kernel = self.base.kernel();
        let (a, i) = self.idx_to_ai(self.rkhs_basis_inds[idx]);
        let x = self.base.lhs_point(a);
        for (row_idx, entry) in column.iter_mut().enumerate() {
            let (b, j) = self.idx_to_ai(row_idx);
            *entry = kernel.dx_dy_component(x, self.base.lhs_point(b), i, j);
        }
    }

    /// `N*D x m` matrix: column `j` is the mixed kernel Hessian between basis
    /// coordinate `j` and every flattened data coordinate.
    fn col_sub_sampled_hessian(&self) -> Array2<f64> {
        let nd = self.base.num_lhs() * self.base.num_dimensions();
        let m = self.num_rkhs_basis();
        let mut col = Array2::<f64>::zeros((nd, m));
        if self.parallel {
            assembly_thread_pool().install(|| {
                col.axis_iter_mut(Axis(1))
                    .into_par_iter()
                    .enumerate()
                    .for_each(|(idx, column)| self.fill_hessian_column(idx, column));
            });
        } else {
            for (idx, column) in col.axis_iter_mut(Axis(1)).enumerate() {
                self.fill_hessian_column(idx, column);
            }
        }
        col
    }

    /// Sparse basis coefficients scattered into a dense `N x D` buffer, one
    /// row per data point.
    fn expanded_beta(&self, alpha_beta: &AlphaBeta) -> Array2<f64> {
        let mut beta_full =
            Array2::<f64>::zeros((self.base.num_lhs(), self.base.num_dimensions()));
        for (idx, &basis_idx) in self.rkhs_basis_inds.iter().enumerate() {
            let (a, i) = self.idx_to_ai(basis_idx);
            beta_full[[a, i]] = alpha_beta.beta(idx);
        }
        beta_full
    }
}

impl<K: KernelDerivatives> KernelExpFamily for Nystrom<K> {
    type Kernel = K;

    fn base(&self) -> &EstimatorBase<K> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase<K> {
        &mut self.base
    }

    fn num_coefficients(&self) -> usize {
        self.num_rkhs_basis() + 1
    }

    fn build_system(&self) -> Result<(Array2<f64>, Array1<f64>), EstimatorError> {
        let n = self.base.num_lhs() as f64;
        let m = self.num_rkhs_basis();
        let lambda = self.base.lambda();

        log::info!("Allocating memory for system.");
        let mut a = Array2::<f64>::zeros((m + 1, m + 1));
        let mut b = Array1::<f64>::zeros(m + 1);

        log::info!("Computing h.");
        let h = self.compute_h();

        log::info!("Computing xi norm.");
        let xi_norm_2 = self.compute_xi_norm_2();

        log::info!("Creating sub-sampled kernel Hessians.");
        let col_sub_sampled_hessian = self.col_sub_sampled_hessian();
        let sub_sampled_hessian = col_sub_sampled_hessian.select(Axis(0), &self.rkhs_basis_inds);

        log::info!("Populating A matrix.");
        a[[0, 0]] = h.dot(&h) / n + lambda * xi_norm_2;

        let mut gram = fast_ata(&col_sub_sampled_hessian);
        symmetrize_in_place(&mut gram);
        a.slice_mut(s![1.., 1..])
            .assign(&(gram / n + &sub_sampled_hessian * lambda));

        let cross = sub_sampled_hessian.dot(&h) / n + &h * lambda;
        a.slice_mut(s![1.., 0]).assign(&cross);
        for idx in 0..m {
            a[[0, idx + 1]] = a[[idx + 1, 0]];
        }

        b[0] = -xi_norm_2;
        b.slice_mut(s![1..]).assign(&h.mapv(|v| -v));

        Ok((a, b))
    }

    fn log_pdf(&self, idx_test: usize) -> Result<f64, EstimatorError> {
        let alpha_beta = self.base.alpha_beta()?;
        let y = self.base.rhs_point(idx_test)?;
        let kernel = self.base.kernel();
        let n = self.base.num_lhs() as f64;

        let mut xi = 0.0;
        let mut beta_sum = 0.0;
        for (idx, &basis_idx) in self.rkhs_basis_inds.iter().enumerate() {
            let (a, i) = self.idx_to_ai(basis_idx);
            let x = self.base.lhs_point(a);
            xi += kernel.dx_dx_component(x, y, i);
            // The query point is the kernel's right argument, hence the sign flip.
            beta_sum -= kernel.dx_component(x, y, i) * alpha_beta.beta(idx);
        }

        Ok(alpha_beta.xi() * xi / n + beta_sum)
    }

    fn grad(&self, idx_test: usize) -> Result<Array1<f64>, EstimatorError> {
        let alpha_beta = self.base.alpha_beta()?;
        let y = self.base.rhs_point(idx_test)?;
        let kernel = self.base.kernel();
        let n = self.base.num_lhs() as f64;
        let d = self.base.num_dimensions();

        let mut xi_grad = Array1::<f64>::zeros(d);
        let mut beta_sum_grad = Array1::<f64>::zeros(d);
        for (idx, &basis_idx) in self.rkhs_basis_inds.iter().enumerate() {
            let (a, i) = self.idx_to_ai(basis_idx);
            let x = self.base.lhs_point(a);
            // Sign flip as in log_pdf.
            xi_grad -= &kernel.dx_i_dx_i_dx_j_component(x, y, i);
            beta_sum_grad.scaled_add(
                alpha_beta.beta(idx),
                &kernel.dx_i_dx_j_component(x, y, i),
            );
        }

        xi_grad *= alpha_beta.xi() / n;
        xi_grad += &beta_sum_grad;
        Ok(xi_grad)
    }

    fn hessian(&self, idx_test: usize) -> Result<Array2<f64>, EstimatorError> {
        let alpha_beta = self.base.alpha_beta()?;
        let y = self.base.rhs_point(idx_test)?;
        let kernel = self.base.kernel();
        let n = self.base.num_lhs();
        let d = self.base.num_dimensions();

        let beta_full = self.expanded_beta(alpha_beta);
        let mut xi_hessian = Array2::<f64>::zeros((d, d));
        let mut beta_sum_hessian = Array2::<f64>::zeros((d, d));

        // Iterates over every data point, not only those in the basis; rows of
        // beta_full outside the basis are zero and contribute nothing to the
        // beta term.
        for a in 0..n {
            let x = self.base.lhs_point(a);
            xi_hessian += &kernel.dx_i_dx_j_dx_k_dx_k_row_sum(x, y);
            // Sign flip as in log_pdf.
            beta_sum_hessian -= &kernel.dx_i_dx_j_dx_k_dot_vec(x, y, beta_full.row(a));
        }

        xi_hessian *= alpha_beta.xi() / n as f64;
        xi_hessian += &beta_sum_hessian;
        Ok(xi_hessian)
    }

    fn hessian_diag(&self, idx_test: usize) -> Result<Array1<f64>, EstimatorError> {
        let alpha_beta = self.base.alpha_beta()?;
        let y = self.base.rhs_point(idx_test)?;
        let kernel = self.base.kernel();
        let n = self.base.num_lhs();
        let d = self.base.num_dimensions();

        let beta_full = self.expanded_beta(alpha_beta);
        let mut xi_hessian_diag = Array1::<f64>::zeros(d);
        let mut beta_sum_hessian_diag = Array1::<f64>::zeros(d);

        for a in 0..n {
            let x = self.base.lhs_point(a);
            let beta_a = beta_full.row(a);
            for i in 0..d {
                xi_hessian_diag[i] += kernel.dx_i_dx_j_dx_k_dx_k_row_sum_component(x, y, i, i);
                beta_sum_hessian_diag[i] -=
                    kernel.dx_i_dx_j_dx_k_dot_vec_component(x, y, beta_a, i, i);
            }
        }

        xi_hessian_diag *= alpha_beta.xi() / n as f64;
        xi_hessian_diag += &beta_sum_hessian_diag;
        Ok(xi_hessian_diag)
    }

    fn leverage(&self) -> Result<Array1<f64>, EstimatorError> {
        Err(EstimatorError::NotImplemented(
            "leverage scores for the Nystrom estimator",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Gaussian;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn data() -> Array2<f64> {
        array![[0.0, 0.5], [1.0, -0.3], [-0.7, 0.8], [0.4, 1.2]]
    }

    fn estimator(lambda: f64) -> Nystrom<Gaussian> {
        Nystrom::new(data(), Gaussian::new(2.0).unwrap(), lambda, vec![1, 4, 6])
            .expect("valid estimator")
    }

    #[test]
    fn num_basis_matches_the_index_set() {
        for inds in [vec![], vec![3], vec![7, 0, 2], (0..8).collect()] {
            let len = inds.len();
            let est = Nystrom::new(data(), Gaussian::new(1.0).unwrap(), 0.1, inds).unwrap();
            assert_eq!(est.num_rkhs_basis(), len);
            assert_eq!(est.num_coefficients(), len + 1);
        }
    }

    #[test]
    fn user_indices_are_not_reordered() {
        let est = Nystrom::new(data(), Gaussian::new(1.0).unwrap(), 0.1, vec![6, 1, 4]).unwrap();
        assert_eq!(est.rkhs_basis_inds(), &[6, 1, 4]);
    }

    #[test]
    fn rejects_invalid_user_indices() {
        let kernel = Gaussian::new(1.0).unwrap();
        assert!(Nystrom::new(data(), kernel, 0.1, vec![8]).is_err());
        assert!(Nystrom::new(data(), kernel, 0.1, vec![2, 2]).is_err());
    }

    #[test]
    fn sampled_basis_is_sorted_and_bounded() {
        let mut rng = StdRng::seed_from_u64(11);
        let est =
            Nystrom::with_num_basis(data(), Gaussian::new(1.0).unwrap(), 0.1, 5, &mut rng)
                .unwrap();
        assert_eq!(est.num_rkhs_basis(), 5);
        assert!(est.rkhs_basis_inds().windows(2).all(|w| w[0] < w[1]));

        let mut rng = StdRng::seed_from_u64(11);
        assert!(matches!(
            Nystrom::with_num_basis(data(), Gaussian::new(1.0).unwrap(), 0.1, 9, &mut rng),
            Err(EstimatorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn leverage_is_not_implemented() {
        let mut est = estimator(0.1);
        assert!(matches!(
            est.leverage(),
            Err(EstimatorError::NotImplemented(_))
        ));
        est.fit().unwrap();
        assert!(matches!(
            est.leverage(),
            Err(EstimatorError::NotImplemented(_))
        ));
    }

    #[test]
    fn evaluation_requires_coefficients() {
        let est = estimator(0.1);
        assert!(matches!(est.log_pdf(0), Err(EstimatorError::NotFitted)));
        assert!(matches!(est.grad(0), Err(EstimatorError::NotFitted)));
        assert!(matches!(est.hessian(0), Err(EstimatorError::NotFitted)));
        assert!(matches!(est.hessian_diag(0), Err(EstimatorError::NotFitted)));
    }

    #[test]
    fn coefficient_length_must_match_basis() {
        let mut est = estimator(0.1);
        assert!(matches!(
            est.set_alpha_beta(Array1::zeros(3)),
            Err(EstimatorError::InvalidArgument(_))
        ));
        assert!(est.set_alpha_beta(Array1::zeros(4)).is_ok());
    }

    #[test]
    fn system_matrix_is_symmetric() {
        let (a, b) = estimator(0.1).build_system().unwrap();
        assert_eq!(a.dim(), (4, 4));
        assert_eq!(b.len(), 4);
        for i in 0..4 {
            for j in 0..4 {
                assert_abs_diff_eq!(a[[i, j]], a[[j, i]], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn parallel_and_sequential_assembly_agree() {
        let (a_par, b_par) = estimator(0.3).with_parallel(true).build_system().unwrap();
        let (a_seq, b_seq) = estimator(0.3).with_parallel(false).build_system().unwrap();
        for (x, y) in a_par.iter().zip(a_seq.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-13);
        }
        for (x, y) in b_par.iter().zip(b_seq.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-13);
        }
    }

    #[test]
    fn hessian_columns_hold_mixed_kernel_derivatives() {
        let est = estimator(0.0);
        let col = est.col_sub_sampled_hessian();
        assert_eq!(col.dim(), (8, 3));
        let kernel = est.base().kernel();
        let data = est.base().data();
        for (q, &basis) in est.rkhs_basis_inds().iter().enumerate() {
            let (a, i) = idx_to_ai(basis, 2);
            for row in 0..8 {
                let (b, j) = idx_to_ai(row, 2);
                let expected = kernel.dx_dy_component(data.row(a), data.row(b), i, j);
                assert_abs_diff_eq!(col[[row, q]], expected, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn hessian_diag_matches_full_hessian_diagonal() {
        let mut est = estimator(0.1);
        est.fit().unwrap();
        for t in 0..4 {
            let full = est.hessian(t).unwrap();
            let diag = est.hessian_diag(t).unwrap();
            for i in 0..2 {
                assert_abs_diff_eq!(full[[i, i]], diag[i], epsilon = 1e-12);
            }
        }
    }
}
