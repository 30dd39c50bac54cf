//! Linear and nonlinear solvers for the Weft framework.
//!
//! Solvers are written against the seams defined in `weft-core`:
//!
//! - [`linear`] solvers act on a [`LinearOperator`], solving `J x = b` in
//!   forward mode or `Jᵀ x = b` in reverse mode.
//! - [`nonlinear`] solvers drive the residuals of a [`NonlinearSystem`] to
//!   zero, delegating the Newton step to a linear solver.
//!
//! Every solve returns a status alongside its result, so callers can inspect
//! a non-converged run before deciding whether it is fatal.
//!
//! [`LinearOperator`]: weft_core::LinearOperator
//! [`NonlinearSystem`]: weft_core::NonlinearSystem

pub mod linear;
pub mod nonlinear;

/// Euclidean norm of a vector.
pub(crate) fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}
