//! Comparisons of analytic derivatives against numerical re-derivations.

use ndarray::Array2;
use sprs::{CsMat, TriMat};
use tracing::{debug, info};
use weft_core::{Column, FdForm, FdOptions, Method, Mode, UnitAdapter, Wrt};
use weft_solvers::linear::{Direct, LinearSolver};

use crate::{
    Error, Problem, Totals,
    block::transfer,
    totals::{Assembled, Resolved, solve_totals},
};

/// One analytic partial derivative block next to its approximation.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialCheck {
    pub unit: String,
    pub of: String,
    pub wrt: String,
    pub analytic: Array2<f64>,
    pub approx: Array2<f64>,

    /// Frobenius norm of `analytic - approx`.
    pub abs_error: f64,

    /// `abs_error` relative to the larger of the two norms, 0 when both vanish.
    pub rel_error: f64,
}

/// One block of analytic totals next to its numerical re-derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct TotalCheck {
    pub of: String,
    pub wrt: String,
    pub analytic: Array2<f64>,
    pub approx: Array2<f64>,
    pub abs_error: f64,
    pub rel_error: f64,
}

fn worst(errors: impl Iterator<Item = f64>) -> f64 {
    errors.fold(0.0, f64::max)
}

fn frobenius(a: &Array2<f64>) -> f64 {
    a.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn errors(analytic: &Array2<f64>, approx: &Array2<f64>) -> (f64, f64) {
    let abs_error = frobenius(&(analytic - approx));
    let scale = frobenius(analytic).max(frobenius(approx));
    let rel_error = if scale > 0.0 { abs_error / scale } else { 0.0 };
    (abs_error, rel_error)
}

/// Complex step where the unit supports it, finite differences otherwise.
fn supported(unit: &UnitAdapter, method: Method) -> Method {
    match method {
        Method::Cs(_) if !unit.capabilities().complex_step => {
            debug!(unit = unit.name(), "complex step unsupported, using finite differences");
            Method::fd()
        }
        Method::Exact => Method::fd(),
        method => method,
    }
}

impl Problem {
    /// Compares every analytic partial against `method` at the current point.
    ///
    /// Blocks that are themselves approximated, and units that only supply
    /// Jacobian-vector products, are skipped. Complex step falls back to
    /// finite differences for units that cannot evaluate complex values.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit fails to linearize or evaluate.
    pub fn check_partials(&mut self, method: Method) -> Result<Vec<PartialCheck>, Error> {
        let mut checks = Vec::new();
        let (slots, _, inputs) = self.store.buffers_mut();
        for &u in &self.order {
            let layout = self.layout.unit(u);
            transfer(layout, slots, inputs);
            let x = &inputs[layout.inputs.clone()];
            let y = &slots[layout.outputs.clone()];
            self.units[u].linearize(x, y, None)?;

            let unit = &self.units[u];
            if unit.capabilities().apply_linear {
                debug!(unit = unit.name(), "matrix-free unit skipped");
                continue;
            }
            let method = supported(unit, method);

            for subjac in unit.partials().iter().filter(|s| !s.method().is_approximated()) {
                let Some(rows) = unit.output_layout().range(subjac.of_name()) else {
                    continue;
                };
                let (n_of, n_wrt) = subjac.shape();
                let column = |c: usize| match subjac.wrt() {
                    Wrt::Input(p) => Column::Input(unit.input_layout().range_at(p).start + c),
                    Wrt::Output(p) => Column::Output(unit.output_layout().range_at(p).start + c),
                };

                let mut approx = Array2::<f64>::zeros((n_of, n_wrt));
                for c in 0..n_wrt {
                    let values = unit.approximate_column(x, y, column(c), method)?;
                    for r in 0..n_of {
                        approx[[r, c]] = values[rows.start + r];
                    }
                }
                let dense = subjac.to_dense();
                let analytic = Array2::from_shape_fn((n_of, n_wrt), |(r, c)| dense[r * n_wrt + c]);
                let (abs_error, rel_error) = errors(&analytic, &approx);
                checks.push(PartialCheck {
                    unit: unit.name().to_owned(),
                    of: subjac.of_name().to_owned(),
                    wrt: subjac.wrt_name().to_owned(),
                    analytic,
                    approx,
                    abs_error,
                    rel_error,
                });
            }
        }
        info!(
            checked = checks.len(),
            max_rel_error = worst(checks.iter().map(|c| c.rel_error)),
            "checked partials"
        );
        Ok(checks)
    }

    /// Compares [`Problem::compute_totals`] against a numerical re-derivation.
    ///
    /// With finite differences, each independent entry is perturbed and the
    /// whole model re-run. With complex step, every unit's partials are
    /// re-derived by complex step (or finite differences where unsupported)
    /// and the totals are solved from that Jacobian. The model state is
    /// restored afterwards.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Problem::compute_totals`] and
    /// [`Problem::run_model`].
    pub fn check_totals(
        &mut self,
        of: &[&str],
        wrt: &[&str],
        mode: Mode,
        method: Method,
    ) -> Result<Vec<TotalCheck>, Error> {
        let analytic = self.compute_totals(of, wrt, mode)?;
        let of_resolved = self.resolve_of(of)?;
        let wrt_resolved = self.resolve_wrt(wrt)?;

        let approx = match method {
            Method::Cs(_) => self.approximate_totals(&of_resolved, &wrt_resolved, method)?,
            Method::Fd(options) => self.fd_totals(of, &wrt_resolved, &options)?,
            Method::Exact => self.fd_totals(of, &wrt_resolved, &FdOptions::default())?,
        };
        let approx = Totals::new(of_resolved.names, wrt_resolved.names, approx);

        let checks: Vec<TotalCheck> = analytic
            .iter()
            .filter_map(|(of, wrt, block)| {
                let analytic = block.to_owned();
                let approx = approx.get(of, wrt)?.to_owned();
                let (abs_error, rel_error) = errors(&analytic, &approx);
                Some(TotalCheck {
                    of: of.to_owned(),
                    wrt: wrt.to_owned(),
                    analytic,
                    approx,
                    abs_error,
                    rel_error,
                })
            })
            .collect();
        info!(
            checked = checks.len(),
            max_rel_error = worst(checks.iter().map(|c| c.rel_error)),
            "checked totals"
        );
        Ok(checks)
    }

    /// Finite-difference totals, re-running the model at each perturbed point.
    fn fd_totals(&mut self, of: &[&str], wrt: &Resolved, options: &FdOptions) -> Result<Array2<f64>, Error> {
        let base = self.store.slots().to_vec();
        let result = self.perturb_all(of, wrt, options, &base);
        self.store.slots_mut().copy_from_slice(&base);
        self.evaluate_all()?;
        result
    }

    fn perturb_all(
        &mut self,
        of: &[&str],
        wrt: &Resolved,
        options: &FdOptions,
        base: &[f64],
    ) -> Result<Array2<f64>, Error> {
        let center = self.run_at(of, base, None)?;
        let mut values = Array2::zeros((center.len(), wrt.len()));
        for (j, &slot) in wrt.slots.iter().enumerate() {
            let h = options.step_for(base[slot]);
            let column: Vec<f64> = match options.form {
                FdForm::Forward => {
                    let plus = self.run_at(of, base, Some((slot, h)))?;
                    plus.iter().zip(&center).map(|(p, c)| (p - c) / h).collect()
                }
                FdForm::Backward => {
                    let minus = self.run_at(of, base, Some((slot, -h)))?;
                    center.iter().zip(&minus).map(|(c, m)| (c - m) / h).collect()
                }
                FdForm::Central => {
                    let plus = self.run_at(of, base, Some((slot, h)))?;
                    let minus = self.run_at(of, base, Some((slot, -h)))?;
                    plus.iter().zip(&minus).map(|(p, m)| (p - m) / (2.0 * h)).collect()
                }
            };
            for (i, v) in column.into_iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        Ok(values)
    }

    /// Restores `base`, applies a perturbation, runs, and reads `of`.
    fn run_at(&mut self, of: &[&str], base: &[f64], delta: Option<(usize, f64)>) -> Result<Vec<f64>, Error> {
        self.store.slots_mut().copy_from_slice(base);
        if let Some((slot, h)) = delta {
            self.store.slots_mut()[slot] += h;
        }
        self.run_model()?;
        let mut values = Vec::new();
        for name in of {
            values.extend_from_slice(self.get(name)?);
        }
        Ok(values)
    }

    /// Totals solved from a Jacobian whose partials are all approximated.
    fn approximate_totals(&mut self, of: &Resolved, wrt: &Resolved, method: Method) -> Result<Array2<f64>, Error> {
        let matrix = self.approximate_jacobian(method)?;
        let op = Assembled(&matrix);
        let mut direct = Direct::new();
        direct.setup(&op)?;
        Ok(solve_totals(&mut direct, &op, of, wrt, Mode::Fwd)?)
    }

    /// The global Jacobian with every unit's partials taken by `method`.
    fn approximate_jacobian(&mut self, method: Method) -> Result<CsMat<f64>, Error> {
        let size = self.layout.size();
        let mut triplets = TriMat::new((size, size));
        for range in self.layout.independents() {
            for slot in range.clone() {
                triplets.add_triplet(slot, slot, 1.0);
            }
        }

        let (slots, _, inputs) = self.store.buffers_mut();
        for &u in &self.order {
            let layout = self.layout.unit(u);
            transfer(layout, slots, inputs);
            let unit = &self.units[u];
            let x = &inputs[layout.inputs.clone()];
            let y = &slots[layout.outputs.clone()];
            let method = supported(unit, method);
            let out = layout.outputs.start;

            // Explicit units are in residual form, y - f(x).
            let sign = if unit.is_implicit() {
                1.0
            } else {
                for slot in layout.outputs.clone() {
                    triplets.add_triplet(slot, slot, 1.0);
                }
                -1.0
            };
            for (k, route) in layout.routes.iter().enumerate() {
                let column = unit.approximate_column(x, y, Column::Input(k), method)?;
                for (r, v) in column.into_iter().enumerate().filter(|(_, v)| *v != 0.0) {
                    triplets.add_triplet(out + r, route.slot, sign * route.scale * v);
                }
            }
            if unit.is_implicit() {
                for c in 0..layout.outputs.len() {
                    let column = unit.approximate_column(x, y, Column::Output(c), method)?;
                    for (r, v) in column.into_iter().enumerate().filter(|(_, v)| *v != 0.0) {
                        triplets.add_triplet(out + r, out + c, v);
                    }
                }
            }
        }
        Ok(triplets.to_csr())
    }
}
