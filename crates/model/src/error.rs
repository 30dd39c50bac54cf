use thiserror::Error;
use weft_core::EvalError;
use weft_solvers::{linear, nonlinear};

/// Errors raised while building, running, or differentiating a model.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] weft_core::Error),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("linear solve failed: {0}")]
    Linear(#[from] linear::Error),

    #[error("block '{block}' failed: {source}")]
    Nonlinear {
        block: String,
        #[source]
        source: nonlinear::Error,
    },

    #[error("invalid nonlinear solver options: {0}")]
    NonlinearConfig(#[from] nonlinear::ConfigError),

    #[error("invalid linear solver options: {0}")]
    LinearConfig(#[from] linear::ConfigError),

    #[error(transparent)]
    Coloring(#[from] weft_coloring::Error),

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("invalid options file: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid options file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
