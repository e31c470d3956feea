use crate::error::EstimatorError;
use crate::linalg::faer_ndarray::FaerEigh;
use crate::linalg::utils::{is_symmetric_with_tolerance, symmetrize_in_place};
use faer::Side;
use ndarray::{Array1, Array2};

const SYMMETRY_REL_TOL: f64 = 1e-10;
const SYMMETRY_ABS_TOL: f64 = 1e-12;

/// Moore-Penrose pseudo-inverse of a symmetric positive semi-definite matrix.
///
/// Eigen-directions whose eigenvalue does not exceed
/// `tol = eps * m * max(eigenvalue)` are dropped, matching the numpy/Octave
/// cutoff. Near-singular systems are therefore inverted on their numerical
/// range instead of failing.
pub fn pinv_self_adjoint(a: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
    let (m, cols) = a.dim();
    if m == 0 {
        return Err(EstimatorError::InvalidArgument(
            "pseudo-inverse requires a non-empty matrix".to_string(),
        ));
    }
    if cols != m {
        return Err(EstimatorError::InvalidArgument(format!(
            "pseudo-inverse requires a square matrix, got {m}x{cols}"
        )));
    }
    if !is_symmetric_with_tolerance(a, SYMMETRY_REL_TOL, SYMMETRY_ABS_TOL) {
        return Err(EstimatorError::InvalidArgument(
            "pseudo-inverse requires a symmetric matrix".to_string(),
        ));
    }

    let (s, v) = a.eigh(Side::Lower)?;
    let max_s = s.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let pinv_tol = f64::EPSILON * m as f64 * max_s;

    let inv_s: Array1<f64> = s.mapv(|value| if value > pinv_tol { 1.0 / value } else { 0.0 });
    let dropped = inv_s.iter().filter(|&&value| value == 0.0).count();
    if dropped > 0 {
        log::debug!(
            "Pseudo-inverse dropped {} of {} eigen-directions below tol {:.3e}",
            dropped,
            m,
            pinv_tol
        );
    }

    // V * diag(inv_s) * V^T
    let scaled = &v * &inv_s.view().insert_axis(ndarray::Axis(0));
    let mut a_pinv = scaled.dot(&v.t());
    symmetrize_in_place(&mut a_pinv);
    Ok(a_pinv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>, eps: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = eps);
        }
    }

    #[test]
    fn identity_is_its_own_pseudo_inverse() {
        for m in [1, 2, 5, 9] {
            let eye = Array2::<f64>::eye(m);
            let pinv = pinv_self_adjoint(&eye).expect("identity pinv");
            assert_close(&pinv, &eye, 1e-12);
        }
    }

    #[test]
    fn full_rank_matches_inverse() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let pinv = pinv_self_adjoint(&a).expect("pinv");
        let det = 11.0;
        let expected = array![[3.0 / det, -1.0 / det], [-1.0 / det, 4.0 / det]];
        assert_close(&pinv, &expected, 1e-12);
    }

    #[test]
    fn rank_deficient_satisfies_penrose_conditions() {
        // U U^T with U of shape 8x2 has rank 2.
        let m = 8;
        let u = Array2::from_shape_fn((m, 2), |(i, k)| {
            if k == 0 {
                1.0 + i as f64 * 0.25
            } else {
                ((i as f64) * 0.9).sin()
            }
        });
        let a = u.dot(&u.t());
        let pinv = pinv_self_adjoint(&a).expect("pinv");

        assert_close(&a.dot(&pinv).dot(&a), &a, 1e-9);
        assert_close(&pinv.dot(&a).dot(&pinv), &pinv, 1e-9);
        assert_close(&pinv, &pinv.t().to_owned(), 1e-14);

        // Directions orthogonal to the column space of U are annihilated.
        let q0 = u.column(0).to_owned() / u.column(0).dot(&u.column(0)).sqrt();
        let mut q1 = u.column(1).to_owned();
        q1.scaled_add(-q1.dot(&q0), &q0);
        q1 /= q1.dot(&q1).sqrt();
        let mut null = Array1::<f64>::zeros(m);
        null[0] = 1.0;
        null[3] = -1.0;
        null.scaled_add(-null.dot(&q0), &q0);
        null.scaled_add(-null.dot(&q1), &q1);
        let image = pinv.dot(&null);
        for value in image.iter() {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_matrix_maps_to_zero() {
        let a = Array2::<f64>::zeros((3, 3));
        let pinv = pinv_self_adjoint(&a).expect("pinv");
        assert_close(&pinv, &a, 0.0);
    }

    #[test]
    fn rejects_asymmetric_input() {
        let a = array![[1.0, 2.0], [0.0, 1.0]];
        assert!(matches!(
            pinv_self_adjoint(&a),
            Err(EstimatorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_non_square_and_empty_input() {
        let rect = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            pinv_self_adjoint(&rect),
            Err(EstimatorError::InvalidArgument(_))
        ));
        let empty = Array2::<f64>::zeros((0, 0));
        assert!(matches!(
            pinv_self_adjoint(&empty),
            Err(EstimatorError::InvalidArgument(_))
        ));
    }
}
