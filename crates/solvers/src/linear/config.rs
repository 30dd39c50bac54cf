use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BlockGaussSeidel, BlockJacobi, Direct, Gmres, LinearRunOnce, LinearSolver};

/// Errors that can occur when validating a linear solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("atol must be finite and non-negative")]
    Atol,

    #[error("rtol must be finite and non-negative")]
    Rtol,

    #[error("restart must be at least 1")]
    Restart,
}

pub(crate) fn check_tolerances(atol: f64, rtol: f64) -> Result<(), ConfigError> {
    if !atol.is_finite() || atol < 0.0 {
        return Err(ConfigError::Atol);
    }
    if !rtol.is_finite() || rtol < 0.0 {
        return Err(ConfigError::Rtol);
    }
    Ok(())
}

/// Configuration for the restarted GMRES solver.
///
/// Converges when `‖b - J x‖ <= max(atol, rtol ‖b‖)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmresConfig {
    /// Maximum number of inner iterations across all restarts.
    pub maxiter: usize,
    pub atol: f64,
    pub rtol: f64,

    /// Krylov subspace dimension before a restart.
    pub restart: usize,

    /// Start from the previous solution of the same mode.
    pub use_cached_guess: bool,

    /// Optional right preconditioner.
    pub precon: Option<Box<LinearSolverConfig>>,
}

impl Default for GmresConfig {
    fn default() -> Self {
        Self {
            maxiter: 1000,
            atol: 1e-12,
            rtol: 1e-10,
            restart: 20,
            use_cached_guess: true,
            precon: None,
        }
    }
}

impl GmresConfig {
    /// Checks tolerances and restart length, including any preconditioner.
    ///
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or non-finite, or if
    /// `restart` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_tolerances(self.atol, self.rtol)?;
        if self.restart == 0 {
            return Err(ConfigError::Restart);
        }
        self.precon.as_deref().map_or(Ok(()), LinearSolverConfig::validate)
    }
}

/// Configuration for the iterative block solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// Maximum number of sweeps.
    pub maxiter: usize,
    pub atol: f64,
    pub rtol: f64,

    /// Start from the previous solution of the same mode.
    pub use_cached_guess: bool,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            maxiter: 10,
            atol: 1e-10,
            rtol: 1e-10,
            use_cached_guess: true,
        }
    }
}

impl BlockConfig {
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or non-finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_tolerances(self.atol, self.rtol)
    }
}

/// Selects and configures a linear solver.
///
/// Deserializes from a table tagged by `type`, for example:
///
/// ```toml
/// type = "gmres"
/// restart = 30
///
/// [precon]
/// type = "block_gauss_seidel"
/// maxiter = 2
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinearSolverConfig {
    #[default]
    Direct,
    Gmres(GmresConfig),
    BlockGaussSeidel(BlockConfig),
    BlockJacobi(BlockConfig),
    RunOnce,
}

impl LinearSolverConfig {
    /// # Errors
    ///
    /// Returns an error if the selected solver's options are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Direct | Self::RunOnce => Ok(()),
            Self::Gmres(config) => config.validate(),
            Self::BlockGaussSeidel(config) | Self::BlockJacobi(config) => config.validate(),
        }
    }

    /// Builds the configured solver.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(&self) -> Result<Box<dyn LinearSolver>, ConfigError> {
        Ok(match self {
            Self::Direct => Box::new(Direct::new()),
            Self::Gmres(config) => Box::new(Gmres::new(config.clone())?),
            Self::BlockGaussSeidel(config) => Box::new(BlockGaussSeidel::new(*config)?),
            Self::BlockJacobi(config) => Box::new(BlockJacobi::new(*config)?),
            Self::RunOnce => Box::new(LinearRunOnce::new()),
        })
    }
}
