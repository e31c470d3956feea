use crate::error::EstimatorError;
use serde::{Deserialize, Serialize};

pub fn default_parallel() -> bool {
    true
}

/// How the Nystrom estimator chooses its RKHS basis coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BasisSelection {
    /// Flattened `(point, dimension)` indices, used in the given order.
    Explicit { indices: Vec<usize> },
    /// `num_basis` coordinates drawn uniformly with a seeded generator.
    Uniform { num_basis: usize, seed: u64 },
}

/// Estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NystromConfig {
    pub lambda: f64,
    pub basis: BasisSelection,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl NystromConfig {
    pub fn explicit(lambda: f64, indices: Vec<usize>) -> Self {
        Self {
            lambda,
            basis: BasisSelection::Explicit { indices },
            parallel: default_parallel(),
        }
    }

    pub fn uniform(lambda: f64, num_basis: usize, seed: u64) -> Self {
        Self {
            lambda,
            basis: BasisSelection::Uniform { num_basis, seed },
            parallel: default_parallel(),
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

pub(crate) fn validate_lambda(lambda: f64) -> Result<(), EstimatorError> {
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(EstimatorError::InvalidArgument(format!(
            "regularization lambda must be finite and non-negative, got {lambda}"
        )));
    }
    Ok(())
}
