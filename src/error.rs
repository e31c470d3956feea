use crate::linalg::faer_ndarray::FaerLinalgError;
use thiserror::Error;

/// Error type for every fallible estimator operation.
#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Estimator has no coefficients yet; call fit() or set_alpha_beta() first.")]
    NotFitted,

    #[error("Linear algebra backend failed: {0}")]
    Linalg(#[from] FaerLinalgError),
}
