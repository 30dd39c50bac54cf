use tracing::{debug, info, warn};
use weft_core::{NonlinearSystem, Observer};

use crate::norm;

use super::{Action, ConfigError, Error, Event, GaussSeidelConfig, Solution, Status};

/// Nonlinear block Gauss-Seidel.
///
/// Repeatedly sweeps the subsystems in execution order, each solving its
/// own unknowns with the latest values of the others, until the residuals
/// of the whole system meet the tolerances.
#[derive(Debug, Clone, Copy)]
pub struct GaussSeidel {
    config: GaussSeidelConfig,
}

impl GaussSeidel {
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: GaussSeidelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &GaussSeidelConfig {
        &self.config
    }

    /// Sweeps until converged, stalled, or out of iterations.
    ///
    /// # Errors
    ///
    /// Returns an error if a subsystem fails, or if the solver does not
    /// converge and `err_on_non_convergence` is set.
    pub fn solve<S, Obs>(&self, system: &mut S, mut observer: Obs) -> Result<Solution, Error>
    where
        S: NonlinearSystem,
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        let config = self.config;
        system.guess()?;
        let initial_norm = norm(&system.residuals()?);
        let converged = |r: f64| r < config.atol || (initial_norm > 0.0 && r / initial_norm < config.rtol);
        let finish = |status, iters, residual_norm| Solution {
            status,
            iters,
            initial_norm,
            residual_norm,
        };

        if let Some(Action::StopEarly) = observer.observe(&Event::Started {
            residual_norm: initial_norm,
        }) {
            return Ok(finish(Status::StoppedByObserver, 0, initial_norm));
        }
        if converged(initial_norm) {
            return Ok(finish(Status::Converged, 0, initial_norm));
        }
        if !initial_norm.is_finite() {
            warn!(residual_norm = initial_norm, "gauss-seidel started from a non-finite residual");
            if config.err_on_non_convergence {
                return Err(Error::NonConvergence {
                    status: Status::Diverged,
                    iters: 0,
                    residual_norm: initial_norm,
                });
            }
            return Ok(finish(Status::Diverged, 0, initial_norm));
        }

        let mut best = initial_norm;
        let mut stalled_for = 0;
        let mut residual_norm = initial_norm;
        let mut status = Status::MaxIters;
        let mut iters = 0;

        while iters < config.maxiter {
            system.sweep()?;
            iters += 1;
            residual_norm = norm(&system.residuals()?);
            debug!(iter = iters, residual_norm, "gauss-seidel sweep");

            let state = system.state();
            let event = Event::Iterated {
                iter: iters,
                residual_norm,
                alpha: 1.0,
                state: &state,
            };
            if let Some(Action::StopEarly) = observer.observe(&event) {
                return Ok(finish(Status::StoppedByObserver, iters, residual_norm));
            }
            if converged(residual_norm) {
                info!(iters, residual_norm, "gauss-seidel converged");
                return Ok(finish(Status::Converged, iters, residual_norm));
            }
            if !residual_norm.is_finite() {
                status = Status::Diverged;
                break;
            }

            if residual_norm < best {
                best = residual_norm;
                stalled_for = 0;
            } else {
                stalled_for += 1;
                if config.stall_limit > 0 && stalled_for >= config.stall_limit {
                    status = Status::Stalled;
                    break;
                }
            }
        }

        warn!(iters, residual_norm, ?status, "gauss-seidel did not converge");
        if config.err_on_non_convergence {
            return Err(Error::NonConvergence {
                status,
                iters,
                residual_norm,
            });
        }
        Ok(finish(status, iters, residual_norm))
    }
}
