use thiserror::Error;
use weft_core::Mode;

use crate::ConfigError;

/// Errors that can occur while detecting, coloring, recovering, or persisting.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("entry ({row}, {col}) is outside a {nrows}×{ncols} pattern")]
    OutOfBounds {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("expected {expected} values, found {found}")]
    Length { expected: usize, found: usize },

    #[error("expected {expected} {mode:?} products, found {found}")]
    Products {
        mode: Mode,
        expected: usize,
        found: usize,
    },

    #[error("sparsity sample failed: {0}")]
    Sample(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The stored coloring was computed for a different structure.
    #[error("coloring signature does not match the current structure")]
    StaleSignature,

    #[error("coloring json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("coloring file: {0}")]
    Io(#[from] std::io::Error),
}
