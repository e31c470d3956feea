pub mod faer_ndarray;
pub mod pinv;
pub(crate) mod utils;
