/// Indicates whether a linear solve converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Converged according to the configured tolerances.
    Converged,

    /// Reached the iteration limit without converging.
    MaxIters,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The result of a linear solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSolution {
    /// Final solver status.
    pub status: Status,

    /// The solution vector.
    pub x: Vec<f64>,

    /// Iteration count when the solver finished.
    pub iters: usize,

    /// Norm of `b - J x` at the returned solution.
    pub residual_norm: f64,
}

impl LinearSolution {
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status == Status::Converged
    }
}
