use tracing::{debug, info, warn};
use weft_core::{Mode, NonlinearSystem, Observer};

use crate::{linear::LinearSolver, norm};

use super::{
    Action, ConfigError, Error, Event, NewtonConfig, Solution, Status,
    line_search::{self, Accepted},
};

/// Newton's method with a pluggable linear solver and line search.
///
/// Each iteration linearizes the system, solves `J Δ = -r` with the linear
/// solver, and hands the step to the configured line search, which also
/// enforces bounds on the unknowns.
#[derive(Debug)]
pub struct Newton {
    config: NewtonConfig,
    linear: Box<dyn LinearSolver>,
}

impl Newton {
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: NewtonConfig, linear: Box<dyn LinearSolver>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, linear })
    }

    #[must_use]
    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    /// Drives the system's residuals to zero.
    ///
    /// The observer receives [`Event::Started`] once the initial residuals
    /// are known and [`Event::Iterated`] after every accepted step.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation or a linear solve fails, or if the
    /// solver does not converge and `err_on_non_convergence` is set.
    pub fn solve<S, Obs>(&mut self, system: &mut S, mut observer: Obs) -> Result<Solution, Error>
    where
        S: NonlinearSystem,
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        let config = self.config;
        system.guess()?;
        let mut residuals = system.residuals()?;
        let initial_norm = norm(&residuals);
        let mut residual_norm = initial_norm;
        let converged = |r: f64| r < config.atol || (initial_norm > 0.0 && r / initial_norm < config.rtol);

        let finish = |status, iters, residual_norm| Solution {
            status,
            iters,
            initial_norm,
            residual_norm,
        };
        let give_up = |status, iters, residual_norm| {
            if config.err_on_non_convergence {
                Err(Error::NonConvergence {
                    status,
                    iters,
                    residual_norm,
                })
            } else {
                Ok(finish(status, iters, residual_norm))
            }
        };

        if let Some(Action::StopEarly) = observer.observe(&Event::Started { residual_norm }) {
            return Ok(finish(Status::StoppedByObserver, 0, residual_norm));
        }
        if converged(residual_norm) {
            debug!(residual_norm, "newton converged before iterating");
            return Ok(finish(Status::Converged, 0, residual_norm));
        }

        for iter in 1..=config.maxiter {
            if config.solve_subsystems && iter <= config.max_sub_solves {
                system.sweep()?;
                residuals = system.residuals()?;
                residual_norm = norm(&residuals);
            }
            if !residual_norm.is_finite() {
                warn!(iter, residual_norm, "newton diverged");
                return give_up(Status::Diverged, iter - 1, residual_norm);
            }

            system.linearize()?;
            self.linear.setup(&*system)?;
            let rhs: Vec<f64> = residuals.iter().map(|r| -r).collect();
            let step = self.linear.solve(&*system, &rhs, Mode::Fwd)?;
            if !step.is_converged() {
                warn!(iter, linear_residual = step.residual_norm, "newton step from an unconverged linear solve");
            }

            let x0 = system.state();
            let Accepted {
                alpha,
                residuals: accepted,
            } = line_search::search(&config.line_search, system, &x0, &step.x, residual_norm)?;
            residuals = accepted;
            residual_norm = norm(&residuals);
            debug!(iter, alpha, residual_norm, "newton iteration");

            let state = system.state();
            let event = Event::Iterated {
                iter,
                residual_norm,
                alpha,
                state: &state,
            };
            if let Some(Action::StopEarly) = observer.observe(&event) {
                return Ok(finish(Status::StoppedByObserver, iter, residual_norm));
            }
            if converged(residual_norm) {
                info!(iters = iter, residual_norm, "newton converged");
                return Ok(finish(Status::Converged, iter, residual_norm));
            }
        }

        if !residual_norm.is_finite() {
            warn!(iters = config.maxiter, residual_norm, "newton diverged");
            return give_up(Status::Diverged, config.maxiter, residual_norm);
        }
        warn!(iters = config.maxiter, residual_norm, "newton reached maxiter");
        give_up(Status::MaxIters, config.maxiter, residual_norm)
    }
}
