//! Nonlinear solvers that drive a system's residuals to zero.
//!
//! # Solvers
//!
//! - [`Newton`] linearizes and takes a step from a [`LinearSolver`], then
//!   runs a line search that also enforces bounds on the unknowns.
//! - [`GaussSeidel`] sweeps the subsystems in order until the residuals of
//!   the whole system converge.
//! - [`NonlinearSolver::RunOnce`] sweeps once, which is exact when the
//!   subsystems only feed forward.
//!
//! # Convergence
//!
//! A solve converges when `‖r‖ < atol` or `‖r‖ / ‖r₀‖ < rtol`, where `r₀`
//! is the residual vector before the first iteration. Running out of
//! iterations returns a [`Solution`] with [`Status::MaxIters`] unless
//! `err_on_non_convergence` is set, in which case it is an
//! [`Error::NonConvergence`].
//!
//! # Observers
//!
//! Newton and Gauss-Seidel emit [`Event::Started`] and then one
//! [`Event::Iterated`] per iteration. Returning [`Action::StopEarly`] stops
//! the solve with the system at its current state.
//!
//! [`LinearSolver`]: crate::linear::LinearSolver

mod action;
mod config;
mod error;
mod event;
mod gauss_seidel;
mod line_search;
mod newton;
mod run_once;
mod solution;


pub use action::Action;
pub use config::{
    BoundEnforcement, ConfigError, GaussSeidelConfig, LineSearchConfig, LineSearchKind, NewtonConfig,
    NonlinearSolverConfig,
};
pub use error::Error;
pub use event::Event;
pub use gauss_seidel::GaussSeidel;
pub use newton::Newton;
pub use solution::{Solution, Status};

use weft_core::{NonlinearSystem, Observer};

/// A nonlinear solver selected at runtime.
#[derive(Debug)]
pub enum NonlinearSolver {
    Newton(Newton),
    GaussSeidel(GaussSeidel),
    RunOnce,
}

impl NonlinearSolver {
    /// Solves the system with the selected solver.
    ///
    /// [`NonlinearSolver::RunOnce`] emits no events.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected solver fails.
    pub fn solve<S, Obs>(&mut self, system: &mut S, observer: Obs) -> Result<Solution, Error>
    where
        S: NonlinearSystem,
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        match self {
            Self::Newton(newton) => newton.solve(system, observer),
            Self::GaussSeidel(gauss_seidel) => gauss_seidel.solve(system, observer),
            Self::RunOnce => run_once::run_once(system),
        }
    }

    /// Solves the system without observer support.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected solver fails.
    pub fn solve_unobserved<S: NonlinearSystem>(&mut self, system: &mut S) -> Result<Solution, Error> {
        self.solve(system, ())
    }

    /// Returns a short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Newton(_) => "newton",
            Self::GaussSeidel(_) => "gauss_seidel",
            Self::RunOnce => "run_once",
        }
    }
}
