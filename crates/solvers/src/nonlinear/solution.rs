/// Indicates whether a nonlinear solve converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Converged according to the configured tolerances.
    Converged,

    /// Reached the iteration limit without converging.
    MaxIters,

    /// The residual norm stopped decreasing before converging.
    Stalled,

    /// The residual norm became NaN or infinite.
    Diverged,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The result of a nonlinear solve.
///
/// The solved state itself stays in the system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    /// Final solver status.
    pub status: Status,

    /// Iteration count when the solver finished.
    pub iters: usize,

    /// Residual norm before the first iteration.
    pub initial_norm: f64,

    /// Residual norm at the final state.
    pub residual_norm: f64,
}

impl Solution {
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status == Status::Converged
    }
}
