/// Events emitted by the nonlinear solvers.
///
/// Every solver emits [`Event::Started`] once the initial residuals are
/// known, then [`Event::Iterated`] after each iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event<'a> {
    /// Initial residuals have been evaluated.
    Started { residual_norm: f64 },

    /// One iteration completed.
    Iterated {
        /// Iteration number, starting at 1.
        iter: usize,

        /// Residual norm at the new state.
        residual_norm: f64,

        /// Step length accepted by the line search, 1 for solvers without one.
        alpha: f64,

        /// The new state.
        state: &'a [f64],
    },
}

impl Event<'_> {
    /// Returns the iteration number, 0 for [`Event::Started`].
    #[must_use]
    pub fn iter(&self) -> usize {
        match self {
            Self::Started { .. } => 0,
            Self::Iterated { iter, .. } => *iter,
        }
    }

    #[must_use]
    pub fn residual_norm(&self) -> f64 {
        match self {
            Self::Started { residual_norm } | Self::Iterated { residual_norm, .. } => *residual_norm,
        }
    }
}
