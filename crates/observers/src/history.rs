use weft_core::Observer;

use crate::traits::{HasIteration, HasResidualNorm};

/// The residual norms seen across one or more solves.
///
/// A solve restarts its count at iteration 0, so the history of a model run
/// holds one run of iterations per solved block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    entries: Vec<(usize, f64)>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an observer that appends to this history.
    ///
    /// The recorder borrows the history, so it can be handed to a solver and
    /// the history read once the solve returns.
    pub fn recorder(&mut self) -> Recorder<'_> {
        Recorder { history: self }
    }

    /// Recorded `(iteration, residual_norm)` pairs in arrival order.
    #[must_use]
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// Recorded residual norms in arrival order.
    pub fn norms(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|&(_, norm)| norm)
    }

    /// Number of solves seen, counted by their starting events.
    #[must_use]
    pub fn solves(&self) -> usize {
        self.entries.iter().filter(|&&(iter, _)| iter == 0).count()
    }

    /// The most recent residual norm.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        self.entries.last().map(|&(_, norm)| norm)
    }

    /// Returns `true` if each solve's residual never grew between iterations.
    #[must_use]
    pub fn is_monotone(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[1].0 == 0 || pair[1].1 <= pair[0].1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Observer that appends every event to a [`History`].
#[derive(Debug)]
pub struct Recorder<'h> {
    history: &'h mut History,
}

impl<E, A> Observer<E, A> for Recorder<'_>
where
    E: HasResidualNorm + HasIteration,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self.history.entries.push((event.iteration(), event.residual_norm()));
        None
    }
}
