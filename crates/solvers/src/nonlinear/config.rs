use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::linear::{self, LinearSolverConfig, check_tolerances};

use super::{GaussSeidel, Newton, NonlinearSolver};

/// Errors that can occur when validating a nonlinear solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("atol must be finite and non-negative")]
    Atol,

    #[error("rtol must be finite and non-negative")]
    Rtol,

    #[error("line search c must be in (0, 1)")]
    Armijo,

    #[error("line search rho must be in (0, 1)")]
    Contraction,

    #[error("line search alpha must be in (0, 1]")]
    Alpha,

    #[error("linear solver: {0}")]
    Linear(#[from] linear::ConfigError),
}

fn check(atol: f64, rtol: f64) -> Result<(), ConfigError> {
    check_tolerances(atol, rtol).map_err(|e| match e {
        linear::ConfigError::Rtol => ConfigError::Rtol,
        _ => ConfigError::Atol,
    })
}

/// How a step that would leave the bounds is brought back inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundEnforcement {
    /// Shrink the whole step until every unknown is feasible.
    #[default]
    Vector,

    /// Clip each violating unknown to its bound, keeping the others.
    Scalar,

    /// Like `Scalar`, but unknowns that hit a bound at the full step stay
    /// pinned there for every trial step length.
    Wall,
}

/// The line search applied after each Newton step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSearchKind {
    /// Take the full step, ignoring bounds.
    None,

    /// Take the full step, enforcing bounds.
    #[default]
    BoundsEnforce,

    /// Backtrack until the residual norm decreases enough.
    Armijo,
}

/// Configuration for the Newton line search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchConfig {
    pub kind: LineSearchKind,
    pub bound_enforcement: BoundEnforcement,

    /// Sufficient decrease parameter: accept when `‖r‖ <= (1 - c α) ‖r₀‖`.
    pub c: f64,

    /// Step contraction factor applied after each rejected trial.
    pub rho: f64,

    /// Maximum number of backtracking trials.
    pub maxiter: usize,

    /// Initial step length.
    pub alpha: f64,

    /// Backtrack instead of failing when a trial point raises an analysis error.
    pub retry_on_analysis_error: bool,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            kind: LineSearchKind::default(),
            bound_enforcement: BoundEnforcement::default(),
            c: 0.1,
            rho: 0.5,
            maxiter: 10,
            alpha: 1.0,
            retry_on_analysis_error: true,
        }
    }
}

impl LineSearchConfig {
    /// # Errors
    ///
    /// Returns an error if `c` or `rho` is outside `(0, 1)`, or if `alpha`
    /// is outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.c > 0.0 && self.c < 1.0) {
            return Err(ConfigError::Armijo);
        }
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(ConfigError::Contraction);
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::Alpha);
        }
        Ok(())
    }
}

/// Configuration for the Newton solver.
///
/// Converges when `‖r‖ < atol` or `‖r‖ / ‖r₀‖ < rtol`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    pub maxiter: usize,
    pub atol: f64,
    pub rtol: f64,

    /// Return [`Error::NonConvergence`](super::Error::NonConvergence) instead
    /// of a `MaxIters` solution.
    pub err_on_non_convergence: bool,

    /// Run a nonlinear sweep over the subsystems before each Newton step.
    pub solve_subsystems: bool,

    /// Stop the subsystem sweeps after this many iterations.
    pub max_sub_solves: usize,

    pub line_search: LineSearchConfig,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            maxiter: 10,
            atol: 1e-10,
            rtol: 1e-10,
            err_on_non_convergence: false,
            solve_subsystems: false,
            max_sub_solves: 10,
            line_search: LineSearchConfig::default(),
        }
    }
}

impl NewtonConfig {
    /// # Errors
    ///
    /// Returns an error if a tolerance or line search option is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check(self.atol, self.rtol)?;
        self.line_search.validate()
    }
}

/// Configuration for the nonlinear block Gauss-Seidel solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussSeidelConfig {
    pub maxiter: usize,
    pub atol: f64,
    pub rtol: f64,
    pub err_on_non_convergence: bool,

    /// Give up after this many sweeps without a decrease in the residual norm.
    ///
    /// Zero disables stall detection.
    pub stall_limit: usize,
}

impl Default for GaussSeidelConfig {
    fn default() -> Self {
        Self {
            maxiter: 10,
            atol: 1e-10,
            rtol: 1e-10,
            err_on_non_convergence: false,
            stall_limit: 3,
        }
    }
}

impl GaussSeidelConfig {
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or non-finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check(self.atol, self.rtol)
    }
}

/// Selects and configures a nonlinear solver.
///
/// ```toml
/// type = "newton"
/// maxiter = 20
///
/// [line_search]
/// kind = "armijo"
/// bound_enforcement = "wall"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NonlinearSolverConfig {
    Newton(NewtonConfig),
    GaussSeidel(GaussSeidelConfig),
    #[default]
    RunOnce,
}

impl NonlinearSolverConfig {
    /// # Errors
    ///
    /// Returns an error if the selected solver's options are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Newton(config) => config.validate(),
            Self::GaussSeidel(config) => config.validate(),
            Self::RunOnce => Ok(()),
        }
    }

    /// Builds the configured solver, using `linear` for Newton steps.
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid.
    pub fn build(&self, linear: &LinearSolverConfig) -> Result<NonlinearSolver, ConfigError> {
        Ok(match self {
            Self::Newton(config) => NonlinearSolver::Newton(Newton::new(*config, linear.build()?)?),
            Self::GaussSeidel(config) => NonlinearSolver::GaussSeidel(GaussSeidel::new(*config)?),
            Self::RunOnce => NonlinearSolver::RunOnce,
        })
    }
}
