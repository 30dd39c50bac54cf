/// Event emitted by an iterative linear solver at the start of each cycle.
///
/// For [`Gmres`](super::Gmres) a cycle is one restart; for the block solvers
/// it is one sweep. `residual_norm` is the true residual `‖b - J x‖` of the
/// current iterate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Cycle number, starting at 0 for the initial iterate.
    pub cycle: usize,

    /// Total inner iterations so far.
    pub iters: usize,

    /// Residual norm of the current iterate.
    pub residual_norm: f64,
}
