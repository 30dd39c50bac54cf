use thiserror::Error;
use weft_core::EvalError;

use crate::linear;

use super::{ConfigError, Status};

/// Errors that can occur during a nonlinear solve.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("linear solve failed: {0}")]
    Linear(#[from] linear::Error),

    /// Only raised when `err_on_non_convergence` is set.
    #[error("failed to converge ({status:?}) after {iters} iterations, residual norm {residual_norm:e}")]
    NonConvergence {
        status: Status,
        iters: usize,
        residual_norm: f64,
    },
}
