use tracing::{debug, warn};
use weft_core::{LinearOperator, Mode};

use crate::norm;

use super::{
    Error, LinearSolution, LinearSolver, Status, check_dim,
    dense::{DenseLu, dense_block},
    residual,
};

/// Relative residual above which a direct solution is rejected as singular.
const RESIDUAL_RTOL: f64 = 1e-6;

/// Direct solver using a dense LU factorization of the whole operator.
///
/// The operator is factored once in [`LinearSolver::setup`] and the factors
/// are reused for every right-hand side in both modes until the next setup.
#[derive(Debug, Default)]
pub struct Direct {
    lu: Option<DenseLu>,
}

impl Direct {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for Direct {
    fn setup(&mut self, op: &dyn LinearOperator) -> Result<(), Error> {
        let n = op.dim();
        let values = dense_block(op, 0..n)?;
        let lu = DenseLu::new(&values, n);
        if lu.is_singular() {
            warn!(dim = n, "jacobian is singular");
        }
        debug!(dim = n, "factored jacobian");
        self.lu = Some(lu);
        Ok(())
    }

    fn solve(&mut self, op: &dyn LinearOperator, rhs: &[f64], mode: Mode) -> Result<LinearSolution, Error> {
        check_dim(op, rhs)?;
        if self.lu.as_ref().is_none_or(|lu| lu.dim() != op.dim()) {
            self.setup(op)?;
        }
        let lu = self.lu.as_ref().ok_or(Error::SingularJacobian)?;

        let x = lu.solve(rhs, mode).inspect_err(|e| {
            if matches!(e, Error::SingularJacobian) {
                warn!(?mode, "direct solve failed on a singular jacobian");
            }
        })?;
        let residual_norm = norm(&residual(op, rhs, &x, mode)?);
        if residual_norm > RESIDUAL_RTOL * norm(rhs).max(f64::MIN_POSITIVE) {
            warn!(?mode, residual_norm, "direct solve left a large residual");
            return Err(Error::SingularJacobian);
        }

        Ok(LinearSolution {
            status: Status::Converged,
            x,
            iters: 1,
            residual_norm,
        })
    }
}
