use weft_core::Observer;

use crate::traits::{CanStopEarly, HasIteration, HasResidualNorm};

/// Stops a solver once its residual norm drops below `tol`.
///
/// The check starts at iteration `min_iters`, so a solve that begins below
/// `tol` still takes that many steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopBelow {
    pub tol: f64,
    pub min_iters: usize,
}

impl StopBelow {
    #[must_use]
    pub fn new(tol: f64) -> Self {
        Self { tol, min_iters: 0 }
    }

    #[must_use]
    pub fn with_min_iters(self, min_iters: usize) -> Self {
        Self { min_iters, ..self }
    }
}

impl<E, A> Observer<E, A> for StopBelow
where
    E: HasResidualNorm + HasIteration,
    A: CanStopEarly,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        (event.iteration() >= self.min_iters && event.residual_norm() < self.tol).then(A::stop_early)
    }
}

/// Stops a solver once it reaches iteration `max_iters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopAfter {
    pub max_iters: usize,
}

impl<E, A> Observer<E, A> for StopAfter
where
    E: HasIteration,
    A: CanStopEarly,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        (event.iteration() >= self.max_iters).then(A::stop_early)
    }
}
