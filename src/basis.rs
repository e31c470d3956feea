use crate::error::EstimatorError;
use rand::Rng;
use rand::seq::SliceRandom;

/// Decodes a flattened coordinate index into `(point, dimension)`.
#[inline]
pub fn idx_to_ai(idx: usize, num_dimensions: usize) -> (usize, usize) {
    (idx / num_dimensions, idx % num_dimensions)
}

/// Inverse of [`idx_to_ai`].
#[inline]
pub fn ai_to_idx(point: usize, dimension: usize, num_dimensions: usize) -> usize {
    point * num_dimensions + dimension
}

/// Draws `num_basis` distinct coordinates uniformly from the `N*D` universe.
///
/// The result is the prefix of a uniform random permutation, sorted ascending so
/// that assembly reads the data rows sequentially.
pub fn sub_sample_rkhs_basis<R: Rng + ?Sized>(
    num_points: usize,
    num_dimensions: usize,
    num_basis: usize,
    rng: &mut R,
) -> Result<Vec<usize>, EstimatorError> {
    let universe = num_points * num_dimensions;
    if num_basis > universe {
        return Err(EstimatorError::InvalidArgument(format!(
            "requested {num_basis} RKHS basis functions but only {universe} coordinates \
             ({num_points} points x {num_dimensions} dimensions) are available"
        )));
    }
    log::info!("Using m={num_basis} uniformly sampled RKHS basis functions.");

    let mut permutation: Vec<usize> = (0..universe).collect();
    permutation.shuffle(rng);
    permutation.truncate(num_basis);
    permutation.sort_unstable();
    Ok(permutation)
}

/// Checks that user-supplied basis indices are in range and pairwise distinct.
pub fn validate_basis_indices(
    indices: &[usize],
    num_points: usize,
    num_dimensions: usize,
) -> Result<(), EstimatorError> {
    let universe = num_points * num_dimensions;
    if indices.len() > universe {
        return Err(EstimatorError::InvalidArgument(format!(
            "{} RKHS basis indices exceed the {universe} available coordinates",
            indices.len()
        )));
    }
    let mut seen = vec![false; universe];
    for (pos, &idx) in indices.iter().enumerate() {
        if idx >= universe {
            return Err(EstimatorError::InvalidArgument(format!(
                "RKHS basis index {idx} at position {pos} is out of range [0, {universe})"
            )));
        }
        if seen[idx] {
            return Err(EstimatorError::InvalidArgument(format!(
                "RKHS basis index {idx} appears more than once"
            )));
        }
        seen[idx] = true;
    }
    Ok(())
}
