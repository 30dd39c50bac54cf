use std::ops::Range;

use tracing::{debug, warn};
use weft_core::{LinearOperator, Mode, Observer};

use crate::norm;

use super::{
    Action, BlockConfig, ConfigError, Error, Event, LinearSolution, LinearSolver, Status, check_dim,
    dense::{DenseLu, dense_block},
    mode_index, residual,
};

/// Diagonal block partition with lazily factored blocks.
#[derive(Debug, Default)]
struct Diagonal {
    ranges: Vec<Range<usize>>,
    factors: Vec<Option<DenseLu>>,
}

impl Diagonal {
    fn reset(&mut self, op: &dyn LinearOperator) {
        self.ranges = op.blocks();
        self.factors = std::iter::repeat_with(|| None).take(self.ranges.len()).collect();
    }

    /// Solves the diagonal block `i`, preferring the operator's own solve.
    fn solve(&mut self, op: &dyn LinearOperator, i: usize, rhs: &[f64], mode: Mode) -> Result<Vec<f64>, Error> {
        if let Some(result) = op.solve_block(i, rhs, mode) {
            return Ok(result?);
        }
        if self.factors[i].is_none() {
            let range = self.ranges[i].clone();
            let n = range.len();
            self.factors[i] = Some(DenseLu::new(&dense_block(op, range)?, n));
        }
        match &self.factors[i] {
            Some(lu) => lu.solve(rhs, mode),
            None => Err(Error::SingularJacobian),
        }
    }

    /// One pass over the blocks, in reverse order for reverse mode.
    ///
    /// With `jacobi`, every block's coupling terms come from the iterate at
    /// the start of the pass; otherwise from the latest values.
    fn sweep(
        &mut self,
        op: &dyn LinearOperator,
        rhs: &[f64],
        x: &mut [f64],
        mode: Mode,
        jacobi: bool,
    ) -> Result<(), Error> {
        if self.ranges.iter().map(Range::len).sum::<usize>() != op.dim() {
            self.reset(op);
        }
        let order: Vec<usize> = match mode {
            Mode::Fwd => (0..self.ranges.len()).collect(),
            Mode::Rev => (0..self.ranges.len()).rev().collect(),
        };
        let start = x.to_vec();
        let mut coupled = vec![0.0; x.len()];

        for i in order {
            let range = self.ranges[i].clone();
            let mut others = if jacobi { start.clone() } else { x.to_vec() };
            others[range.clone()].fill(0.0);
            op.apply(mode, &others, &mut coupled)?;

            let block_rhs: Vec<f64> = range.clone().map(|k| rhs[k] - coupled[k]).collect();
            let block_x = self.solve(op, i, &block_rhs, mode)?;
            x[range].copy_from_slice(&block_x);
        }
        Ok(())
    }
}

/// Sweeps until converged or out of iterations.
#[allow(clippy::too_many_arguments)]
fn iterate<Obs>(
    diagonal: &mut Diagonal,
    config: &BlockConfig,
    cache: &mut [Option<Vec<f64>>; 2],
    op: &dyn LinearOperator,
    rhs: &[f64],
    mode: Mode,
    jacobi: bool,
    mut observer: Obs,
) -> Result<LinearSolution, Error>
where
    Obs: Observer<Event, Action>,
{
    check_dim(op, rhs)?;
    let n = op.dim();
    let mut x = match &cache[mode_index(mode)] {
        Some(cached) if config.use_cached_guess && cached.len() == n => cached.clone(),
        _ => vec![0.0; n],
    };

    let initial_norm = norm(&residual(op, rhs, &x, mode)?);
    let mut residual_norm = initial_norm;
    let converged = |r: f64| r <= config.atol || (initial_norm > 0.0 && r / initial_norm <= config.rtol);

    let mut status = Status::MaxIters;
    let mut iters = 0;
    if converged(residual_norm) {
        status = Status::Converged;
    }
    while status == Status::MaxIters && iters < config.maxiter {
        diagonal.sweep(op, rhs, &mut x, mode, jacobi)?;
        iters += 1;
        residual_norm = norm(&residual(op, rhs, &x, mode)?);
        debug!(iter = iters, residual_norm, jacobi, "block linear sweep");

        let event = Event {
            cycle: iters,
            iters,
            residual_norm,
        };
        if let Some(Action::StopEarly) = observer.observe(&event) {
            status = Status::StoppedByObserver;
        } else if converged(residual_norm) {
            status = Status::Converged;
        }
    }
    if status == Status::MaxIters {
        warn!(iters, residual_norm, "block linear solver reached maxiter");
    }

    cache[mode_index(mode)] = Some(x.clone());
    Ok(LinearSolution {
        status,
        x,
        iters,
        residual_norm,
    })
}

/// Block Gauss-Seidel over the operator's diagonal blocks.
///
/// Each block is solved with the latest values of every other block, in
/// execution order for forward mode and in reverse order for reverse mode.
#[derive(Debug)]
pub struct BlockGaussSeidel {
    config: BlockConfig,
    diagonal: Diagonal,
    cache: [Option<Vec<f64>>; 2],
}

impl BlockGaussSeidel {
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: BlockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            diagonal: Diagonal::default(),
            cache: [None, None],
        })
    }

    /// Solves with an observer that sees the residual after each sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if `rhs` has the wrong length, the operator fails, or
    /// a diagonal block is singular.
    pub fn solve_observed<Obs>(
        &mut self,
        op: &dyn LinearOperator,
        rhs: &[f64],
        mode: Mode,
        observer: Obs,
    ) -> Result<LinearSolution, Error>
    where
        Obs: Observer<Event, Action>,
    {
        iterate(&mut self.diagonal, &self.config, &mut self.cache, op, rhs, mode, false, observer)
    }
}

impl LinearSolver for BlockGaussSeidel {
    fn setup(&mut self, op: &dyn LinearOperator) -> Result<(), Error> {
        self.diagonal.reset(op);
        Ok(())
    }

    fn solve(&mut self, op: &dyn LinearOperator, rhs: &[f64], mode: Mode) -> Result<LinearSolution, Error> {
        self.solve_observed(op, rhs, mode, ())
    }
}

/// Block Jacobi over the operator's diagonal blocks.
#[derive(Debug)]
pub struct BlockJacobi {
    config: BlockConfig,
    diagonal: Diagonal,
    cache: [Option<Vec<f64>>; 2],
}

impl BlockJacobi {
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: BlockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            diagonal: Diagonal::default(),
            cache: [None, None],
        })
    }
}

impl LinearSolver for BlockJacobi {
    fn setup(&mut self, op: &dyn LinearOperator) -> Result<(), Error> {
        self.diagonal.reset(op);
        Ok(())
    }

    fn solve(&mut self, op: &dyn LinearOperator, rhs: &[f64], mode: Mode) -> Result<LinearSolution, Error> {
        iterate(&mut self.diagonal, &self.config, &mut self.cache, op, rhs, mode, true, ())
    }
}

/// A single block Gauss-Seidel sweep from zero.
///
/// Exact when the operator is block triangular in execution order, which is
/// the case for any model without coupled groups.
#[derive(Debug, Default)]
pub struct LinearRunOnce {
    diagonal: Diagonal,
}

impl LinearRunOnce {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for LinearRunOnce {
    fn setup(&mut self, op: &dyn LinearOperator) -> Result<(), Error> {
        self.diagonal.reset(op);
        Ok(())
    }

    fn solve(&mut self, op: &dyn LinearOperator, rhs: &[f64], mode: Mode) -> Result<LinearSolution, Error> {
        check_dim(op, rhs)?;
        let mut x = vec![0.0; op.dim()];
        self.diagonal.sweep(op, rhs, &mut x, mode, false)?;
        let residual_norm = norm(&residual(op, rhs, &x, mode)?);
        Ok(LinearSolution {
            status: Status::Converged,
            x,
            iters: 1,
            residual_norm,
        })
    }
}
