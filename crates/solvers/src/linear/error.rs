use thiserror::Error;
use weft_core::EvalError;

use super::ConfigError;

/// Errors that can occur during a linear solve.
///
/// Running out of iterations is not an error; see [`Status`](super::Status).
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("jacobian is singular")]
    SingularJacobian,

    #[error("right-hand side has {found} entries, operator has {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error(transparent)]
    Eval(#[from] EvalError),
}
