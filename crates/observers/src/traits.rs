//! Traits that let one observer watch many solvers.
//!
//! These traits abstract over solver-specific event and action types, so one
//! observer can watch a Newton solve, a GMRES solve, or a block sweep.
//!
//! # Example
//!
//! ```rust
//! use weft_core::Observer;
//! use weft_observers::traits::{CanStopEarly, HasIteration, HasResidualNorm};
//!
//! struct GoodEnough {
//!     tolerance: f64,
//!     min_iters: usize,
//! }
//!
//! impl<E: HasResidualNorm + HasIteration, A: CanStopEarly> Observer<E, A> for GoodEnough {
//!     fn observe(&mut self, event: &E) -> Option<A> {
//!         if event.iteration() >= self.min_iters && event.residual_norm() < self.tolerance {
//!             return Some(A::stop_early());
//!         }
//!         None
//!     }
//! }
//! ```

use weft_solvers::{linear, nonlinear};

/// An event that carries a residual norm.
pub trait HasResidualNorm {
    fn residual_norm(&self) -> f64;
}

/// An event tied to an iteration count.
///
/// Iteration 0 is the starting point, before any update.
pub trait HasIteration {
    fn iteration(&self) -> usize;
}

/// An action that can end a solve early.
pub trait CanStopEarly {
    /// The action that ends the solve, keeping its current state.
    fn stop_early() -> Self;
}

impl HasResidualNorm for nonlinear::Event<'_> {
    fn residual_norm(&self) -> f64 {
        nonlinear::Event::residual_norm(self)
    }
}

impl HasIteration for nonlinear::Event<'_> {
    fn iteration(&self) -> usize {
        self.iter()
    }
}

impl HasResidualNorm for linear::Event {
    fn residual_norm(&self) -> f64 {
        self.residual_norm
    }
}

impl HasIteration for linear::Event {
    fn iteration(&self) -> usize {
        self.cycle
    }
}

impl CanStopEarly for nonlinear::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}

impl CanStopEarly for linear::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}
