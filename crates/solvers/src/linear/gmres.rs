use tracing::{debug, warn};
use weft_core::{LinearOperator, Mode, Observer};

use crate::norm;

use super::{
    Action, ConfigError, Error, Event, GmresConfig, LinearSolution, LinearSolver, Status, check_dim,
    mode_index, residual,
};

/// Restarted GMRES with optional right preconditioning.
///
/// Only needs operator products, so it works with assembled and matrix-free
/// operators alike. The preconditioner may be any other [`LinearSolver`],
/// including one that delegates to the units' own block solves.
#[derive(Debug)]
pub struct Gmres {
    config: GmresConfig,
    precon: Option<Box<dyn LinearSolver>>,
    cache: [Option<Vec<f64>>; 2],
}

impl Gmres {
    /// Creates a solver, building the configured preconditioner if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: GmresConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let precon = config.precon.as_deref().map(|p| p.build()).transpose()?;
        Ok(Self {
            config,
            precon,
            cache: [None, None],
        })
    }

    /// Replaces the preconditioner.
    #[must_use]
    pub fn with_preconditioner(mut self, precon: Box<dyn LinearSolver>) -> Self {
        self.precon = Some(precon);
        self
    }

    #[must_use]
    pub fn config(&self) -> &GmresConfig {
        &self.config
    }

    /// Solves with an observer that sees the residual at each restart.
    ///
    /// # Errors
    ///
    /// Returns an error if `rhs` has the wrong length, the operator fails, or
    /// the preconditioner fails.
    pub fn solve_observed<Obs>(
        &mut self,
        op: &dyn LinearOperator,
        rhs: &[f64],
        mode: Mode,
        mut observer: Obs,
    ) -> Result<LinearSolution, Error>
    where
        Obs: Observer<Event, Action>,
    {
        check_dim(op, rhs)?;
        let n = op.dim();
        let b_norm = norm(rhs);
        let tol = self.config.atol.max(self.config.rtol * b_norm);

        let mut x = match &self.cache[mode_index(mode)] {
            Some(cached) if self.config.use_cached_guess && cached.len() == n => cached.clone(),
            _ => vec![0.0; n],
        };
        if b_norm == 0.0 {
            x.fill(0.0);
        }

        let mut iters = 0;
        let mut cycle = 0;
        let solution = loop {
            let r = residual(op, rhs, &x, mode)?;
            let r_norm = norm(&r);
            debug!(cycle, iters, residual_norm = r_norm, "gmres");

            let event = Event {
                cycle,
                iters,
                residual_norm: r_norm,
            };
            if let Some(Action::StopEarly) = observer.observe(&event) {
                break self.finish(x, Status::StoppedByObserver, iters, r_norm);
            }
            if r_norm <= tol {
                break self.finish(x, Status::Converged, iters, r_norm);
            }
            if iters >= self.config.maxiter {
                warn!(iters, residual_norm = r_norm, "gmres reached maxiter");
                break self.finish(x, Status::MaxIters, iters, r_norm);
            }

            let (update, inner) = self.cycle(op, &r, r_norm, tol, mode, self.config.maxiter - iters)?;
            for (xi, ui) in x.iter_mut().zip(update) {
                *xi += ui;
            }
            iters += inner;
            cycle += 1;
        };

        self.cache[mode_index(mode)] = Some(solution.x.clone());
        Ok(solution)
    }

    fn finish(&self, x: Vec<f64>, status: Status, iters: usize, residual_norm: f64) -> LinearSolution {
        LinearSolution {
            status,
            x,
            iters,
            residual_norm,
        }
    }

    /// Applies the preconditioner, or the identity when there is none.
    fn precondition(&mut self, op: &dyn LinearOperator, v: &[f64], mode: Mode) -> Result<Vec<f64>, Error> {
        match &mut self.precon {
            Some(precon) => Ok(precon.solve(op, v, mode)?.x),
            None => Ok(v.to_vec()),
        }
    }

    /// Runs one Arnoldi cycle from residual `r`, returning the correction to
    /// `x` and the number of inner iterations used.
    fn cycle(
        &mut self,
        op: &dyn LinearOperator,
        r: &[f64],
        r_norm: f64,
        tol: f64,
        mode: Mode,
        budget: usize,
    ) -> Result<(Vec<f64>, usize), Error> {
        let n = r.len();
        let m = self.config.restart.min(n).min(budget).max(1);

        // Columns of the Hessenberg matrix: h[k][j] is row j of column k.
        let mut h = vec![vec![0.0; m + 1]; m];
        let mut basis: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
        let mut preconditioned: Vec<Vec<f64>> = Vec::with_capacity(m);
        let mut cs = vec![0.0; m];
        let mut sn = vec![0.0; m];
        let mut g = vec![0.0; m + 1];
        g[0] = r_norm;
        basis.push(r.iter().map(|v| v / r_norm).collect());

        let mut w = vec![0.0; n];
        let mut k = 0;
        while k < m {
            let z = self.precondition(op, &basis[k], mode)?;
            op.apply(mode, &z, &mut w)?;
            preconditioned.push(z);

            // Modified Gram-Schmidt
            for j in 0..=k {
                let hjk: f64 = basis[j].iter().zip(&w).map(|(v, w)| v * w).sum();
                h[k][j] = hjk;
                for (wi, vi) in w.iter_mut().zip(&basis[j]) {
                    *wi -= hjk * vi;
                }
            }
            let w_norm = norm(&w);
            h[k][k + 1] = w_norm;

            for j in 0..k {
                let temp = cs[j] * h[k][j] + sn[j] * h[k][j + 1];
                h[k][j + 1] = -sn[j] * h[k][j] + cs[j] * h[k][j + 1];
                h[k][j] = temp;
            }
            let (c, s) = givens(h[k][k], h[k][k + 1]);
            cs[k] = c;
            sn[k] = s;
            h[k][k] = c * h[k][k] + s * h[k][k + 1];
            h[k][k + 1] = 0.0;
            g[k + 1] = -s * g[k];
            g[k] *= c;

            k += 1;
            if g[k].abs() <= tol || w_norm <= f64::EPSILON * r_norm {
                break;
            }
            basis.push(w.iter().map(|v| v / w_norm).collect());
        }

        // Back-substitution for the least-squares coefficients.
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let mut sum = g[i];
            for j in (i + 1)..k {
                sum -= h[j][i] * y[j];
            }
            if h[i][i].abs() > 0.0 {
                y[i] = sum / h[i][i];
            }
        }

        let mut update = vec![0.0; n];
        for (yi, z) in y.iter().zip(&preconditioned) {
            for (u, zj) in update.iter_mut().zip(z) {
                *u += yi * zj;
            }
        }
        Ok((update, k))
    }
}

impl LinearSolver for Gmres {
    fn setup(&mut self, op: &dyn LinearOperator) -> Result<(), Error> {
        match &mut self.precon {
            Some(precon) => precon.setup(op),
            None => Ok(()),
        }
    }

    fn solve(&mut self, op: &dyn LinearOperator, rhs: &[f64], mode: Mode) -> Result<LinearSolution, Error> {
        self.solve_observed(op, rhs, mode, ())
    }
}

/// Returns `(c, s)` such that the rotation zeroes `b` against `a`.
fn givens(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        (1.0, 0.0)
    } else {
        let r = a.hypot(b);
        (a / r, b / r)
    }
}
