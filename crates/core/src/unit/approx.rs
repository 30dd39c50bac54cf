use num_complex::Complex64;

use crate::{EvalError, Vector, VectorMut};

use super::{
    adapter::{Column, UnitAdapter, UnitKind},
    declare::{FdForm, FdOptions, Method},
    partials::Wrt,
};

/// Step used when probing for undeclared nonzeros.
const STRICT_STEP: f64 = 1e-6;

impl UnitAdapter {
    /// Fills every FD/CS partial by perturbing one `wrt` entry at a time.
    ///
    /// Each perturbation is shared by all approximated blocks with the same
    /// `wrt` variable and method.
    pub(super) fn approximate(&mut self, inputs: &[f64], outputs: &[f64]) -> Result<(), EvalError> {
        let mut groups: Vec<(Wrt, Method)> = Vec::new();
        for subjac in self.partials.iter() {
            let key = (subjac.wrt, subjac.method);
            if subjac.method.is_approximated() && !subjac.constant && !groups.contains(&key) {
                groups.push(key);
            }
        }
        if groups.is_empty() {
            return Ok(());
        }

        let base = self.raw(inputs, outputs)?;
        for (wrt, method) in groups {
            let range = match wrt {
                Wrt::Input(p) => self.inputs.range_at(p),
                Wrt::Output(p) => self.outputs.range_at(p),
            };
            let perturb_input = matches!(wrt, Wrt::Input(_));

            for (local, index) in range.enumerate() {
                let column = match method {
                    Method::Fd(options) => {
                        self.fd_column(inputs, outputs, perturb_input, index, &options, &base)?
                    }
                    Method::Cs(options) => {
                        self.cs_column(inputs, outputs, perturb_input, index, options.step)?
                    }
                    Method::Exact => continue,
                };

                let outputs_layout = &self.outputs;
                for subjac in self
                    .partials
                    .iter_mut()
                    .filter(|s| s.wrt == wrt && s.method == method && !s.constant)
                {
                    let offset = outputs_layout.range_at(subjac.of).start;
                    for k in 0..subjac.values.len() {
                        if subjac.cols[k] == local {
                            subjac.values[k] = column[offset + subjac.rows[k]];
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks that every derivative above `tol` lies inside a declared block.
    ///
    /// Uses one forward difference per input entry (and per output entry for
    /// implicit units). Entries that do not depend on the perturbed variable
    /// reproduce bit-for-bit, so the check does not flag them.
    pub(super) fn verify_sparsity(
        &self,
        inputs: &[f64],
        outputs: &[f64],
        tol: f64,
    ) -> Result<(), EvalError> {
        if self.capabilities.apply_linear {
            return Ok(());
        }

        let options = FdOptions {
            step: STRICT_STEP,
            ..FdOptions::default()
        };
        let base = self.raw(inputs, outputs)?;

        let mut candidates = vec![(true, self.inputs.size())];
        if self.is_implicit() {
            candidates.push((false, self.outputs.size()));
        }

        for (perturb_input, size) in candidates {
            let layout = if perturb_input { &self.inputs } else { &self.outputs };
            for index in 0..size {
                let column = self.fd_column(inputs, outputs, perturb_input, index, &options, &base)?;
                let Some((wrt_pos, col)) = layout.locate(index) else {
                    continue;
                };
                let wrt_name = layout.name_at(wrt_pos);

                for (flat_row, value) in column.iter().enumerate() {
                    if value.abs() <= tol {
                        continue;
                    }
                    let Some((of_pos, row)) = self.outputs.locate(flat_row) else {
                        continue;
                    };
                    let of_name = self.outputs.name_at(of_pos);
                    let declared = self
                        .partials
                        .subjac(of_name, wrt_name)
                        .is_some_and(|s| s.contains(row, col));
                    if !declared {
                        return Err(EvalError::UndeclaredNonzero {
                            unit: self.name.clone(),
                            of: of_name.to_owned(),
                            wrt: wrt_name.to_owned(),
                            row,
                            col,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Approximates one Jacobian column of the unit's raw function.
    ///
    /// The column is `∂f/∂x` for explicit units and `∂R/∂[x; y]` for implicit
    /// ones, indexed by flat output entry. [`Method::Exact`] falls back to a
    /// forward difference with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if an evaluation fails or complex step is requested
    /// from a unit that does not support it.
    pub fn approximate_column(
        &self,
        inputs: &[f64],
        outputs: &[f64],
        column: Column,
        method: Method,
    ) -> Result<Vec<f64>, EvalError> {
        let (perturb_input, index) = match column {
            Column::Input(i) => (true, i),
            Column::Output(i) => (false, i),
        };
        match method {
            Method::Cs(options) => {
                if !self.capabilities.complex_step {
                    return Err(EvalError::unsupported("complex step").in_unit(&self.name));
                }
                self.cs_column(inputs, outputs, perturb_input, index, options.step)
            }
            Method::Fd(options) => {
                let base = self.raw(inputs, outputs)?;
                self.fd_column(inputs, outputs, perturb_input, index, &options, &base)
            }
            Method::Exact => {
                let base = self.raw(inputs, outputs)?;
                self.fd_column(inputs, outputs, perturb_input, index, &FdOptions::default(), &base)
            }
        }
    }

    /// Evaluates `f(x)` for explicit units or `R(x, y)` for implicit ones.
    fn raw(&self, inputs: &[f64], outputs: &[f64]) -> Result<Vec<f64>, EvalError> {
        let mut values = vec![0.0; self.outputs.size()];
        match &self.kind {
            UnitKind::Explicit(_) => self.evaluate(inputs, &mut values)?,
            UnitKind::Implicit(_) => self.evaluate_residuals(inputs, outputs, &mut values)?,
        }
        Ok(values)
    }

    fn raw_perturbed(
        &self,
        inputs: &[f64],
        outputs: &[f64],
        perturb_input: bool,
        index: usize,
        delta: f64,
    ) -> Result<Vec<f64>, EvalError> {
        if perturb_input {
            let mut x = inputs.to_vec();
            x[index] += delta;
            self.raw(&x, outputs)
        } else {
            let mut y = outputs.to_vec();
            y[index] += delta;
            self.raw(inputs, &y)
        }
    }

    fn fd_column(
        &self,
        inputs: &[f64],
        outputs: &[f64],
        perturb_input: bool,
        index: usize,
        options: &FdOptions,
        base: &[f64],
    ) -> Result<Vec<f64>, EvalError> {
        let x = if perturb_input { inputs[index] } else { outputs[index] };
        let h = options.step_for(x);

        let column = match options.form {
            FdForm::Forward => {
                let plus = self.raw_perturbed(inputs, outputs, perturb_input, index, h)?;
                plus.iter().zip(base).map(|(p, b)| (p - b) / h).collect()
            }
            FdForm::Backward => {
                let minus = self.raw_perturbed(inputs, outputs, perturb_input, index, -h)?;
                base.iter().zip(&minus).map(|(b, m)| (b - m) / h).collect()
            }
            FdForm::Central => {
                let plus = self.raw_perturbed(inputs, outputs, perturb_input, index, h)?;
                let minus = self.raw_perturbed(inputs, outputs, perturb_input, index, -h)?;
                plus.iter()
                    .zip(&minus)
                    .map(|(p, m)| (p - m) / (2.0 * h))
                    .collect()
            }
        };
        Ok(column)
    }

    fn cs_column(
        &self,
        inputs: &[f64],
        outputs: &[f64],
        perturb_input: bool,
        index: usize,
        step: f64,
    ) -> Result<Vec<f64>, EvalError> {
        let mut x: Vec<Complex64> = inputs.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        let mut y: Vec<Complex64> = outputs.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        if perturb_input {
            x[index].im = step;
        } else {
            y[index].im = step;
        }

        let mut result = vec![Complex64::new(0.0, 0.0); self.outputs.size()];
        let status = match &self.kind {
            UnitKind::Explicit(unit) => unit.compute_complex(
                Vector::new(&self.inputs, &x),
                VectorMut::new(&self.outputs, &mut result),
            ),
            UnitKind::Implicit(unit) => unit.apply_nonlinear_complex(
                Vector::new(&self.inputs, &x),
                Vector::new(&self.outputs, &y),
                VectorMut::new(&self.outputs, &mut result),
            ),
        };
        status.map_err(|e| e.in_unit(&self.name))?;

        Ok(result.iter().map(|v| v.im / step).collect())
    }
}
