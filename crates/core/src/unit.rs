//! The unit evaluation contract and the adapter that drives it.
//!
//! A unit is either explicit (outputs computed directly from inputs) or
//! implicit (outputs defined by residual equations). Authors implement
//! [`ExplicitUnit`] or [`ImplicitUnit`]; the framework wraps either in a
//! [`UnitAdapter`], which is the only place that dispatches on the unit kind
//! and on its [`Capabilities`].
//!
//! Partial derivatives are declared up front through [`Declarations`]. Each
//! declared block is either written by the unit, fixed at declaration, or
//! approximated by the adapter using finite differences or complex step.

mod adapter;
mod approx;
mod declare;
mod partials;

#[cfg(test)]
mod tests;

pub use adapter::{Column, UnitAdapter, UnitKind};
pub use declare::{CsOptions, Declarations, FdForm, FdOptions, Method, Partial, Sparsity, StepCalc};
pub use partials::{Partials, SubJac, Wrt};

use num_complex::Complex64;

use crate::{EvalError, Mode, Vector, VectorMut};

/// Optional behaviors a unit provides beyond its required methods.
///
/// The adapter only calls a capability method when the matching flag is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The unit converges its own residuals in `solve_nonlinear`.
    pub solve_nonlinear: bool,

    /// The unit solves its own diagonal Jacobian block in `solve_linear`.
    pub solve_linear: bool,

    /// The unit supplies Jacobian-vector products instead of partials.
    pub apply_linear: bool,

    /// The unit can evaluate with complex values for complex-step derivatives.
    pub complex_step: bool,
}

/// Seeds and results for a matrix-free Jacobian-vector product.
///
/// Products accumulate into the mutable side.
#[derive(Debug)]
pub enum JacVec<'a> {
    /// `d_residuals += J · [d_inputs; d_outputs]`
    Fwd {
        d_inputs: Vector<'a>,
        d_outputs: Vector<'a>,
        d_residuals: VectorMut<'a>,
    },

    /// `[d_inputs; d_outputs] += Jᵀ · d_residuals`
    Rev {
        d_residuals: Vector<'a>,
        d_inputs: VectorMut<'a>,
        d_outputs: VectorMut<'a>,
    },
}

/// A unit whose outputs are explicit functions of its inputs.
pub trait ExplicitUnit {
    /// Declares inputs, outputs, and partial derivatives.
    fn declare(&self, decl: &mut Declarations);

    /// Computes outputs from inputs.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::Analysis`] if the inputs are outside the region
    /// where the unit is valid, or any other error to abort the run.
    fn compute(&self, inputs: Vector<'_>, outputs: VectorMut<'_>) -> Result<(), EvalError>;

    /// Writes `∂outputs/∂inputs` for every declared, non-approximated partial.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails or an undeclared partial is written.
    fn compute_partials(
        &mut self,
        _inputs: Vector<'_>,
        _partials: &mut Partials,
    ) -> Result<(), EvalError> {
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Computes outputs with complex arithmetic.
    ///
    /// # Errors
    ///
    /// Returns an error unless the unit advertises `complex_step`.
    fn compute_complex(
        &self,
        _inputs: Vector<'_, Complex64>,
        _outputs: VectorMut<'_, Complex64>,
    ) -> Result<(), EvalError> {
        Err(EvalError::unsupported("complex step"))
    }
}

/// A unit whose outputs are defined implicitly by residual equations.
pub trait ImplicitUnit {
    /// Declares inputs, outputs, and partial derivatives.
    fn declare(&self, decl: &mut Declarations);

    /// Evaluates residuals at the given inputs and outputs.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::Analysis`] if the point is invalid for the unit.
    fn apply_nonlinear(
        &self,
        inputs: Vector<'_>,
        outputs: Vector<'_>,
        residuals: VectorMut<'_>,
    ) -> Result<(), EvalError>;

    /// Writes partials of residuals with respect to inputs and outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails or an undeclared partial is written.
    fn linearize(
        &mut self,
        _inputs: Vector<'_>,
        _outputs: Vector<'_>,
        _partials: &mut Partials,
    ) -> Result<(), EvalError> {
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Drives residuals to zero by updating outputs in place.
    ///
    /// # Errors
    ///
    /// Returns an error unless the unit advertises `solve_nonlinear`.
    fn solve_nonlinear(
        &mut self,
        _inputs: Vector<'_>,
        _outputs: VectorMut<'_>,
    ) -> Result<(), EvalError> {
        Err(EvalError::unsupported("solve_nonlinear"))
    }

    /// Adjusts outputs before the owning solver starts iterating.
    fn guess_nonlinear(
        &self,
        _inputs: Vector<'_>,
        _outputs: VectorMut<'_>,
        _residuals: Vector<'_>,
    ) {
    }

    /// Solves the unit's diagonal block: `d_outputs` from `d_residuals` in
    /// forward mode, `d_residuals` from `d_outputs` in reverse mode.
    ///
    /// Both views use the output layout. Called after `linearize`.
    ///
    /// # Errors
    ///
    /// Returns an error unless the unit advertises `solve_linear`.
    fn solve_linear(
        &self,
        _rhs: Vector<'_>,
        _solution: VectorMut<'_>,
        _mode: Mode,
    ) -> Result<(), EvalError> {
        Err(EvalError::unsupported("solve_linear"))
    }

    /// Accumulates a Jacobian-vector product at the current point.
    ///
    /// # Errors
    ///
    /// Returns an error unless the unit advertises `apply_linear`.
    fn apply_linear(
        &self,
        _inputs: Vector<'_>,
        _outputs: Vector<'_>,
        _product: JacVec<'_>,
    ) -> Result<(), EvalError> {
        Err(EvalError::unsupported("apply_linear"))
    }

    /// Evaluates residuals with complex arithmetic.
    ///
    /// # Errors
    ///
    /// Returns an error unless the unit advertises `complex_step`.
    fn apply_nonlinear_complex(
        &self,
        _inputs: Vector<'_, Complex64>,
        _outputs: Vector<'_, Complex64>,
        _residuals: VectorMut<'_, Complex64>,
    ) -> Result<(), EvalError> {
        Err(EvalError::unsupported("complex step"))
    }
}
