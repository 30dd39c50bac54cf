use tracing::debug;
use weft_core::Observer;

use crate::traits::{HasIteration, HasResidualNorm};

/// Logs every event at debug level under a fixed label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trace {
    pub label: &'static str,
}

impl<E, A> Observer<E, A> for Trace
where
    E: HasResidualNorm + HasIteration,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        debug!(
            label = self.label,
            iter = event.iteration(),
            residual_norm = event.residual_norm(),
            "solver progress"
        );
        None
    }
}
