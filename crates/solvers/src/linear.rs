//! Linear solvers for Jacobian systems in forward and reverse mode.
//!
//! A linear solver is set up once per linearization and may then be asked
//! for any number of solves against the same operator. Forward mode solves
//! `J x = b`; reverse mode solves `Jᵀ x = b` with the same setup.
//!
//! # Solvers
//!
//! - [`Direct`]: dense LU factorization, reused across right-hand sides
//! - [`Gmres`]: restarted GMRES, matrix-free, optionally preconditioned by
//!   any other linear solver
//! - [`BlockGaussSeidel`]: sweeps the operator's diagonal blocks in order,
//!   carrying coupling terms forward
//! - [`BlockJacobi`]: like Gauss-Seidel, but every block sees the previous
//!   iterate
//! - [`LinearRunOnce`]: a single Gauss-Seidel sweep, exact for block
//!   triangular operators
//!
//! Diagonal blocks are solved with the operator's own block solve when it
//! provides one, and by factorizing the block otherwise.
//!
//! Non-convergence of an iterative solver is not an error: the returned
//! [`LinearSolution`] carries the [`Status`], iteration count, and final
//! residual norm.

mod action;
mod block;
mod config;
mod dense;
mod direct;
mod error;
mod event;
mod gmres;
mod solution;

#[cfg(test)]
mod tests;

pub use action::Action;
pub use block::{BlockGaussSeidel, BlockJacobi, LinearRunOnce};
pub use config::{BlockConfig, ConfigError, GmresConfig, LinearSolverConfig};
pub use direct::Direct;
pub use error::Error;
pub use event::Event;
pub use gmres::Gmres;
pub use solution::{LinearSolution, Status};

pub(crate) use config::check_tolerances;

use weft_core::{LinearOperator, Mode};

/// A solver for `J x = b` or `Jᵀ x = b`.
///
/// Implementations may cache work done in [`LinearSolver::setup`], such as a
/// factorization, and reuse it for every subsequent solve until the next
/// setup.
pub trait LinearSolver: std::fmt::Debug {
    /// Prepares for solves against the operator's current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the operator cannot be evaluated.
    fn setup(&mut self, op: &dyn LinearOperator) -> Result<(), Error>;

    /// Solves against `rhs` in the given mode.
    ///
    /// # Errors
    ///
    /// Returns an error if `rhs` has the wrong length, the operator fails, or
    /// a factorization is singular.
    fn solve(&mut self, op: &dyn LinearOperator, rhs: &[f64], mode: Mode) -> Result<LinearSolution, Error>;
}

/// Computes `b - op(x)` in the given mode.
fn residual(op: &dyn LinearOperator, rhs: &[f64], x: &[f64], mode: Mode) -> Result<Vec<f64>, Error> {
    let mut ax = vec![0.0; rhs.len()];
    op.apply(mode, x, &mut ax)?;
    Ok(rhs.iter().zip(ax).map(|(b, ax)| b - ax).collect())
}

fn check_dim(op: &dyn LinearOperator, rhs: &[f64]) -> Result<(), Error> {
    if rhs.len() == op.dim() {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            expected: op.dim(),
            found: rhs.len(),
        })
    }
}

/// Index of a mode into two-element per-mode caches.
fn mode_index(mode: Mode) -> usize {
    match mode {
        Mode::Fwd => 0,
        Mode::Rev => 1,
    }
}
