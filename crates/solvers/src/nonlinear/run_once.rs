use tracing::{debug, warn};
use weft_core::NonlinearSystem;

use crate::norm;

use super::{Error, Solution, Status};

/// Residual norm below which a single sweep counts as converged.
const ATOL: f64 = 1e-10;

/// Runs a single sweep over the subsystems in execution order.
///
/// Exact for feed-forward systems, which leave no residual. A sweep that
/// leaves a residual above [`ATOL`] reports `MaxIters`, since its one
/// iteration is spent.
pub(crate) fn run_once<S: NonlinearSystem>(system: &mut S) -> Result<Solution, Error> {
    system.guess()?;
    system.sweep()?;
    let residual_norm = norm(&system.residuals()?);
    debug!(residual_norm, "run once");

    let status = if !residual_norm.is_finite() {
        warn!(residual_norm, "run once produced a non-finite residual");
        Status::Diverged
    } else if residual_norm < ATOL {
        Status::Converged
    } else {
        Status::MaxIters
    };
    Ok(Solution {
        status,
        iters: 1,
        initial_norm: residual_norm,
        residual_norm,
    })
}
