#![deny(dead_code)]
#![deny(unused_imports)]

pub mod basis;
pub mod config;
pub mod error;
pub mod estimator;
pub mod kernel;
pub mod linalg;
pub mod nystrom;
pub mod types;

pub use basis::{ai_to_idx, idx_to_ai, sub_sample_rkhs_basis, validate_basis_indices};
pub use config::{BasisSelection, NystromConfig};
pub use error::EstimatorError;
pub use estimator::{EstimatorBase, KernelExpFamily};
pub use kernel::{Gaussian, KernelDerivatives};
pub use linalg::pinv::pinv_self_adjoint;
pub use nystrom::Nystrom;
pub use types::AlphaBeta;
