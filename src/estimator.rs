use crate::config::validate_lambda;
use crate::error::EstimatorError;
use crate::kernel::KernelDerivatives;
use crate::linalg::pinv::pinv_self_adjoint;
use crate::types::AlphaBeta;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// State shared by every kernel exponential family estimator.
///
/// Owns the `N x D` training data (the left-hand side of every kernel call),
/// the kernel, the regularization `lambda`, and the fitted coefficients. Query
/// points are resolved against the test data when set, the training data
/// otherwise.
#[derive(Debug, Clone)]
pub struct EstimatorBase<K> {
    data: Array2<f64>,
    kernel: K,
    lambda: f64,
    alpha_beta: Option<AlphaBeta>,
    test_data: Option<Array2<f64>>,
}

impl<K: KernelDerivatives> EstimatorBase<K> {
    pub fn new(data: Array2<f64>, kernel: K, lambda: f64) -> Result<Self, EstimatorError> {
        let (n, d) = data.dim();
        if n == 0 || d == 0 {
            return Err(EstimatorError::InvalidArgument(format!(
                "training data must be non-empty, got {n}x{d}"
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(EstimatorError::InvalidArgument(
                "training data must contain only finite values".to_string(),
            ));
        }
        validate_lambda(lambda)?;
        Ok(Self {
            data,
            kernel,
            lambda,
            alpha_beta: None,
            test_data: None,
        })
    }

    /// Number of training points `N`.
    pub fn num_lhs(&self) -> usize {
        self.data.nrows()
    }

    /// Number of query points available to the evaluation routines.
    pub fn num_rhs(&self) -> usize {
        self.test_data
            .as_ref()
            .map_or(self.data.nrows(), |t| t.nrows())
    }

    pub fn num_dimensions(&self) -> usize {
        self.data.ncols()
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn test_data(&self) -> Option<ArrayView2<'_, f64>> {
        self.test_data.as_ref().map(|t| t.view())
    }

    #[inline]
    pub(crate) fn lhs_point(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.data.row(idx)
    }

    /// Coordinates of query point `idx_test`.
    pub fn rhs_point(&self, idx_test: usize) -> Result<ArrayView1<'_, f64>, EstimatorError> {
        let rhs = self.test_data.as_ref().unwrap_or(&self.data);
        if idx_test >= rhs.nrows() {
            return Err(EstimatorError::InvalidArgument(format!(
                "test index {idx_test} is out of range for {} query points",
                rhs.nrows()
            )));
        }
        Ok(rhs.row(idx_test))
    }

    /// Evaluate at `test_data` instead of the training points.
    pub fn set_test_data(&mut self, test_data: Array2<f64>) -> Result<(), EstimatorError> {
        if test_data.ncols() != self.num_dimensions() {
            return Err(EstimatorError::InvalidArgument(format!(
                "test data has {} dimensions but the estimator was trained on {}",
                test_data.ncols(),
                self.num_dimensions()
            )));
        }
        self.test_data = Some(test_data);
        Ok(())
    }

    pub fn reset_test_data(&mut self) {
        self.test_data = None;
    }

    pub fn alpha_beta(&self) -> Result<&AlphaBeta, EstimatorError> {
        self.alpha_beta.as_ref().ok_or(EstimatorError::NotFitted)
    }

    pub(crate) fn store_alpha_beta(&mut self, alpha_beta: AlphaBeta) {
        self.alpha_beta = Some(alpha_beta);
    }
}

/// Score-matching estimator of a kernel exponential family density.
///
/// Implementors assemble a linear system whose solution parameterizes the
/// log-density gradient field and evaluate that field at query points. The
/// provided methods cover the fit and the batch evaluations shared by all
/// variants.
pub trait KernelExpFamily {
    type Kernel: KernelDerivatives;

    fn base(&self) -> &EstimatorBase<Self::Kernel>;

    fn base_mut(&mut self) -> &mut EstimatorBase<Self::Kernel>;

    /// Length the solved coefficient vector must have.
    fn num_coefficients(&self) -> usize;

    /// Regularized normal equations `(A, b)`; the coefficients solve `A x = b`.
    fn build_system(&self) -> Result<(Array2<f64>, Array1<f64>), EstimatorError>;

    fn log_pdf(&self, idx_test: usize) -> Result<f64, EstimatorError>;

    fn grad(&self, idx_test: usize) -> Result<Array1<f64>, EstimatorError>;

    fn hessian(&self, idx_test: usize) -> Result<Array2<f64>, EstimatorError>;

    fn hessian_diag(&self, idx_test: usize) -> Result<Array1<f64>, EstimatorError>;

    fn leverage(&self) -> Result<Array1<f64>, EstimatorError>;

    fn set_alpha_beta(&mut self, alpha_beta: Array1<f64>) -> Result<(), EstimatorError> {
        let expected = self.num_coefficients();
        if alpha_beta.len() != expected {
            return Err(EstimatorError::InvalidArgument(format!(
                "coefficient vector has length {} but the system has {expected} unknowns",
                alpha_beta.len()
            )));
        }
        self.base_mut().store_alpha_beta(AlphaBeta::new(alpha_beta));
        Ok(())
    }

    /// Builds the system, solves it through the pseudo-inverse and stores the result.
    fn fit(&mut self) -> Result<(), EstimatorError> {
        let (a, b) = self.build_system()?;
        log::info!("Solving {}x{} system via pseudo-inverse.", a.nrows(), a.ncols());
        let a_pinv = pinv_self_adjoint(&a)?;
        self.set_alpha_beta(a_pinv.dot(&b))
    }

    fn log_pdf_multiple(&self) -> Result<Array1<f64>, EstimatorError> {
        let n_test = self.base().num_rhs();
        let mut out = Array1::<f64>::zeros(n_test);
        for i in 0..n_test {
            out[i] = self.log_pdf(i)?;
        }
        Ok(out)
    }

    /// One gradient per query point, stacked as rows.
    fn grad_multiple(&self) -> Result<Array2<f64>, EstimatorError> {
        let n_test = self.base().num_rhs();
        let d = self.base().num_dimensions();
        let mut out = Array2::<f64>::zeros((n_test, d));
        for i in 0..n_test {
            out.row_mut(i).assign(&self.grad(i)?);
        }
        Ok(out)
    }

    /// Score-matching objective averaged over the query points:
    /// `0.5 * ||grad||^2 + trace(hessian)`.
    fn score(&self) -> Result<f64, EstimatorError> {
        let n_test = self.base().num_rhs();
        if n_test == 0 {
            return Err(EstimatorError::InvalidArgument(
                "score requires at least one query point".to_string(),
            ));
        }
        let mut total = 0.0;
        for i in 0..n_test {
            let gradient = self.grad(i)?;
            let hessian_diag = self.hessian_diag(i)?;
            total += 0.5 * gradient.dot(&gradient) + hessian_diag.sum();
        }
        Ok(total / n_test as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Gaussian;
    use ndarray::array;

    fn base() -> EstimatorBase<Gaussian> {
        let data = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
        EstimatorBase::new(data, Gaussian::new(1.0).unwrap(), 0.1).expect("valid base")
    }

    #[test]
    fn rejects_empty_or_non_finite_data() {
        let kernel = Gaussian::new(1.0).unwrap();
        assert!(EstimatorBase::new(Array2::zeros((0, 2)), kernel, 0.1).is_err());
        assert!(EstimatorBase::new(array![[0.0, f64::NAN]], kernel, 0.1).is_err());
        assert!(EstimatorBase::new(array![[0.0, 1.0]], kernel, -0.1).is_err());
    }

    #[test]
    fn query_points_follow_test_data() {
        let mut base = base();
        assert_eq!(base.num_rhs(), 3);
        assert_eq!(base.rhs_point(2).unwrap().to_vec(), vec![2.0, 2.0]);
        assert!(base.rhs_point(3).is_err());

        base.set_test_data(array![[5.0, 6.0]]).unwrap();
        assert_eq!(base.num_rhs(), 1);
        assert_eq!(base.rhs_point(0).unwrap().to_vec(), vec![5.0, 6.0]);
        assert!(base.rhs_point(1).is_err());

        base.reset_test_data();
        assert_eq!(base.num_rhs(), 3);
    }

    #[test]
    fn test_data_dimension_must_match() {
        let mut base = base();
        assert!(matches!(
            base.set_test_data(array![[1.0, 2.0, 3.0]]),
            Err(EstimatorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn coefficients_are_absent_until_stored() {
        let mut base = base();
        assert!(matches!(base.alpha_beta(), Err(EstimatorError::NotFitted)));
        base.store_alpha_beta(AlphaBeta::new(array![1.0, 2.0]));
        assert_eq!(base.alpha_beta().unwrap().xi(), 1.0);
    }
}
