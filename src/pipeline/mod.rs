//! Pipeline module - load, derive, estimate

pub mod error;
pub mod estimator;
pub mod loader;
pub mod qreg;
pub mod stata;
pub mod transform;
pub mod weights;
pub mod winsorize;

pub use error::PipelineError;
pub use estimator::*;
pub use loader::*;
pub use qreg::{EstimationError, QuantileFit};
pub use transform::*;
pub use weights::*;
pub use winsorize::*;
