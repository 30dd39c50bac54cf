use tracing::{debug, warn};
use weft_core::{EvalError, NonlinearSystem};

use crate::norm;

use super::{BoundEnforcement, LineSearchConfig, LineSearchKind};

/// The accepted point of a line search.
#[derive(Debug)]
pub(crate) struct Accepted {
    pub(crate) alpha: f64,
    pub(crate) residuals: Vec<f64>,
}

/// Trial points along `x0 + α step` with bounds applied.
struct Path<'a> {
    x0: &'a [f64],
    step: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    enforcement: Option<BoundEnforcement>,
    pinned: Vec<bool>,
}

impl<'a> Path<'a> {
    fn new(x0: &'a [f64], step: &[f64], bounds: (Vec<f64>, Vec<f64>), enforcement: Option<BoundEnforcement>) -> Self {
        let (lower, upper) = bounds;
        let mut step = step.to_vec();
        let mut pinned = vec![false; x0.len()];

        match enforcement {
            Some(BoundEnforcement::Vector) => {
                let mut fraction: f64 = 1.0;
                for i in 0..x0.len() {
                    let full = x0[i] + step[i];
                    if full > upper[i] && step[i] > 0.0 {
                        fraction = fraction.min((upper[i] - x0[i]) / step[i]);
                    } else if full < lower[i] && step[i] < 0.0 {
                        fraction = fraction.min((lower[i] - x0[i]) / step[i]);
                    }
                }
                let fraction = fraction.max(0.0);
                if fraction < 1.0 {
                    debug!(fraction, "step shortened to stay within bounds");
                    for s in &mut step {
                        *s *= fraction;
                    }
                }
            }
            Some(BoundEnforcement::Wall) => {
                for i in 0..x0.len() {
                    let full = x0[i] + step[i];
                    pinned[i] = full > upper[i] || full < lower[i];
                }
            }
            Some(BoundEnforcement::Scalar) | None => {}
        }

        Self {
            x0,
            step,
            lower,
            upper,
            enforcement,
            pinned,
        }
    }

    fn point(&self, alpha: f64) -> Vec<f64> {
        (0..self.x0.len())
            .map(|i| {
                let x = self.x0[i] + alpha * self.step[i];
                match self.enforcement {
                    None => x,
                    Some(BoundEnforcement::Wall) if self.pinned[i] => {
                        if self.x0[i] + self.step[i] > self.upper[i] {
                            self.upper[i]
                        } else {
                            self.lower[i]
                        }
                    }
                    Some(_) => x.max(self.lower[i]).min(self.upper[i]),
                }
            })
            .collect()
    }
}

/// Moves the system along `step` from `x0` and returns the accepted point.
///
/// The system is left at the accepted point with its residuals evaluated.
pub(crate) fn search<S: NonlinearSystem>(
    config: &LineSearchConfig,
    system: &mut S,
    x0: &[f64],
    step: &[f64],
    initial_norm: f64,
) -> Result<Accepted, EvalError> {
    let enforcement = match config.kind {
        LineSearchKind::None => None,
        LineSearchKind::BoundsEnforce | LineSearchKind::Armijo => Some(config.bound_enforcement),
    };
    let path = Path::new(x0, step, system.bounds(), enforcement);

    let mut alpha = config.alpha;
    if config.kind != LineSearchKind::Armijo {
        system.set_state(&path.point(alpha));
        let residuals = system.residuals()?;
        return Ok(Accepted { alpha, residuals });
    }

    let mut last = None;
    for trial in 1..=config.maxiter.max(1) {
        system.set_state(&path.point(alpha));
        match system.residuals() {
            Ok(residuals) => {
                let residual_norm = norm(&residuals);
                if residual_norm <= (1.0 - config.c * alpha) * initial_norm {
                    return Ok(Accepted { alpha, residuals });
                }
                debug!(trial, alpha, residual_norm, "armijo trial rejected");
                last = Some(Ok(Accepted { alpha, residuals }));
            }
            Err(e) if config.retry_on_analysis_error && e.is_retryable() => {
                warn!(trial, alpha, error = %e, "analysis error during line search, backtracking");
                last = Some(Err(e));
            }
            Err(e) => return Err(e),
        }
        alpha *= config.rho;
    }

    warn!(alpha, "line search exhausted, accepting the last trial");
    match last {
        Some(result) => result,
        None => Err(EvalError::analysis("line search made no trials")),
    }
}
