use std::ops::Range;

use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::EvalError;

/// Direction of a linear solve or Jacobian product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// `J x = b`, one solve per input direction.
    #[default]
    Fwd,

    /// `Jᵀ x = b`, one solve per output direction.
    Rev,
}

/// A square linear operator with optional block structure.
///
/// This is what linear solvers see: a Jacobian that can always be applied,
/// may be available as an assembled sparse matrix, and may know how to solve
/// its own diagonal blocks.
pub trait LinearOperator {
    /// Returns the number of rows (and columns).
    fn dim(&self) -> usize;

    /// Overwrites `y` with `J x` in forward mode or `Jᵀ x` in reverse mode.
    ///
    /// # Errors
    ///
    /// Returns an error if a matrix-free unit fails.
    fn apply(&self, mode: Mode, x: &[f64], y: &mut [f64]) -> Result<(), EvalError>;

    /// Returns the assembled matrix when one is maintained.
    fn assembled(&self) -> Option<&CsMat<f64>> {
        None
    }

    /// Returns the partition used by block solvers, in execution order.
    fn blocks(&self) -> Vec<Range<usize>> {
        vec![0..self.dim()]
    }

    /// Solves the diagonal block at `block` with a custom solver, if one exists.
    fn solve_block(
        &self,
        _block: usize,
        _rhs: &[f64],
        _mode: Mode,
    ) -> Option<Result<Vec<f64>, EvalError>> {
        None
    }
}

/// A set of unknowns with residuals that a nonlinear solver drives to zero.
///
/// The system is also the linear operator of its own Jacobian, valid after
/// the most recent call to [`NonlinearSystem::linearize`].
pub trait NonlinearSystem: LinearOperator {
    /// Returns the current unknowns.
    fn state(&self) -> Vec<f64>;

    /// Replaces the unknowns.
    fn set_state(&mut self, state: &[f64]);

    /// Returns `(lower, upper)` bounds for each unknown, infinite when unset.
    fn bounds(&self) -> (Vec<f64>, Vec<f64>);

    /// Evaluates residuals at the current unknowns.
    ///
    /// # Errors
    ///
    /// Returns an error if any unit fails at this point.
    fn residuals(&mut self) -> Result<Vec<f64>, EvalError>;

    /// Refreshes the Jacobian at the current unknowns.
    ///
    /// # Errors
    ///
    /// Returns an error if any unit fails to linearize.
    fn linearize(&mut self) -> Result<(), EvalError>;

    /// Runs one nonlinear block Gauss-Seidel pass over the subsystems.
    ///
    /// # Errors
    ///
    /// Returns an error if any subsystem fails.
    fn sweep(&mut self) -> Result<(), EvalError>;

    /// Lets subsystems adjust the unknowns before iterating.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluating the residuals the guess is based on
    /// fails.
    fn guess(&mut self) -> Result<(), EvalError> {
        Ok(())
    }
}
