use crate::{Error, EvalError, Mode, VarLayout, Variable, Vector, VectorMut};

use super::{
    Capabilities, ExplicitUnit, ImplicitUnit, JacVec,
    declare::{Declarations, Method, Partial, Sparsity},
    partials::{Partials, SubJac, Wrt},
};

/// The two kinds of unit, as supplied by the author.
pub enum UnitKind {
    Explicit(Box<dyn ExplicitUnit>),
    Implicit(Box<dyn ImplicitUnit>),
}

impl std::fmt::Debug for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(_) => f.write_str("Explicit"),
            Self::Implicit(_) => f.write_str("Implicit"),
        }
    }
}

/// A Jacobian column local to one unit, as a flat index into its inputs or outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Input(usize),
    Output(usize),
}

/// Wraps a unit with its declared layout and partial derivative storage.
///
/// Explicit units are presented in residual form, `R(y) = y - f(x)`, so
/// every consumer sees implicit semantics: `∂R/∂y = I` and `∂R/∂x = -∂f/∂x`.
#[derive(Debug)]
pub struct UnitAdapter {
    pub(super) name: String,
    pub(super) kind: UnitKind,
    pub(super) capabilities: Capabilities,
    pub(super) inputs: VarLayout,
    pub(super) outputs: VarLayout,
    pub(super) input_vars: Vec<Variable>,
    pub(super) output_vars: Vec<Variable>,
    pub(super) partials: Partials,
    pub(super) probed: Option<Vec<f64>>,
}

impl UnitAdapter {
    /// Wraps an explicit unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit's declarations are inconsistent.
    pub fn explicit(name: impl Into<String>, unit: impl ExplicitUnit + 'static) -> Result<Self, Error> {
        Self::new(name, UnitKind::Explicit(Box::new(unit)))
    }

    /// Wraps an implicit unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit's declarations are inconsistent.
    pub fn implicit(name: impl Into<String>, unit: impl ImplicitUnit + 'static) -> Result<Self, Error> {
        Self::new(name, UnitKind::Implicit(Box::new(unit)))
    }

    /// Runs the unit's declarations and validates them.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate variable names, default values of the
    /// wrong size, or partial declarations that reference unknown variables,
    /// fall outside the block shape, or request complex step from a unit that
    /// cannot evaluate complex values.
    pub fn new(name: impl Into<String>, kind: UnitKind) -> Result<Self, Error> {
        let name = name.into();
        let mut decl = Declarations::new();
        let capabilities = match &kind {
            UnitKind::Explicit(unit) => {
                unit.declare(&mut decl);
                Capabilities {
                    complex_step: unit.capabilities().complex_step,
                    ..Capabilities::default()
                }
            }
            UnitKind::Implicit(unit) => {
                unit.declare(&mut decl);
                unit.capabilities()
            }
        };

        let inputs = build_layout(&name, &decl.inputs, None)?;
        let outputs = build_layout(&name, &decl.outputs, Some(&inputs))?;

        let mut adapter = Self {
            name,
            kind,
            capabilities,
            inputs,
            outputs,
            input_vars: decl.inputs,
            output_vars: decl.outputs,
            partials: Partials::default(),
            probed: None,
        };
        for (of, wrt, partial) in &decl.partials {
            adapter.declare_partial(of, wrt, partial)?;
        }
        Ok(adapter)
    }

    fn declare_partial(&mut self, of: &str, wrt: &str, partial: &Partial) -> Result<(), Error> {
        let invalid = |reason: &str| Error::InvalidPartial {
            unit: self.name.clone(),
            of: of.to_owned(),
            wrt: wrt.to_owned(),
            reason: reason.to_owned(),
        };

        if matches!(partial.method, Method::Cs(_)) && !self.capabilities.complex_step {
            return Err(Error::ComplexStepUnsupported(self.name.clone()));
        }

        let ofs: Vec<usize> = if of == "*" {
            (0..self.outputs.len()).collect()
        } else {
            vec![self.outputs.position(of).ok_or_else(|| invalid("unknown output"))?]
        };

        let wrts: Vec<Wrt> = if wrt == "*" {
            let mut all: Vec<Wrt> = (0..self.inputs.len()).map(Wrt::Input).collect();
            if self.is_implicit() {
                all.extend((0..self.outputs.len()).map(Wrt::Output));
            }
            all
        } else if let Some(p) = self.inputs.position(wrt) {
            vec![Wrt::Input(p)]
        } else if let Some(p) = self.outputs.position(wrt) {
            if !self.is_implicit() {
                return Err(invalid("explicit units cannot declare partials with respect to outputs"));
            }
            vec![Wrt::Output(p)]
        } else {
            return Err(invalid("unknown variable"));
        };

        for &of_pos in &ofs {
            for &wrt_pos in &wrts {
                let n_of = self.outputs.range_at(of_pos).len();
                let (wrt_name, n_wrt) = match wrt_pos {
                    Wrt::Input(p) => (self.inputs.name_at(p), self.inputs.range_at(p).len()),
                    Wrt::Output(p) => (self.outputs.name_at(p), self.outputs.range_at(p).len()),
                };

                let (rows, cols, dense) = match &partial.sparsity {
                    Sparsity::Dense => {
                        let rows = (0..n_of).flat_map(|r| std::iter::repeat_n(r, n_wrt)).collect();
                        let cols = (0..n_of).flat_map(|_| 0..n_wrt).collect();
                        (rows, cols, true)
                    }
                    Sparsity::Sparse { rows, cols } => {
                        if rows.len() != cols.len() {
                            return Err(invalid("rows and cols differ in length"));
                        }
                        if rows.iter().any(|&r| r >= n_of) || cols.iter().any(|&c| c >= n_wrt) {
                            return Err(invalid("sparsity index out of bounds"));
                        }
                        (rows.clone(), cols.clone(), false)
                    }
                };

                let nnz = rows.len();
                let values = match &partial.constant {
                    Some(v) if v.len() == 1 => vec![v[0]; nnz],
                    Some(v) if v.len() == nnz => v.clone(),
                    Some(_) => return Err(invalid("constant value has the wrong length")),
                    None => vec![0.0; nnz],
                };

                self.partials.insert(SubJac {
                    of: of_pos,
                    wrt: wrt_pos,
                    of_name: self.outputs.name_at(of_pos).to_owned(),
                    wrt_name: wrt_name.to_owned(),
                    shape: (n_of, n_wrt),
                    rows,
                    cols,
                    values,
                    method: partial.method,
                    constant: partial.constant.is_some(),
                    dense,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_implicit(&self) -> bool {
        matches!(self.kind, UnitKind::Implicit(_))
    }

    /// Returns `true` if any partial is written by the unit itself.
    #[must_use]
    pub fn has_analytic_partials(&self) -> bool {
        self.partials
            .iter()
            .any(|s| s.method == Method::Exact && !s.constant)
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[must_use]
    pub fn input_layout(&self) -> &VarLayout {
        &self.inputs
    }

    #[must_use]
    pub fn output_layout(&self) -> &VarLayout {
        &self.outputs
    }

    #[must_use]
    pub fn input_vars(&self) -> &[Variable] {
        &self.input_vars
    }

    #[must_use]
    pub fn output_vars(&self) -> &[Variable] {
        &self.output_vars
    }

    #[must_use]
    pub fn partials(&self) -> &Partials {
        &self.partials
    }

    /// Computes explicit outputs from inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit fails or is implicit.
    pub fn evaluate(&self, inputs: &[f64], outputs: &mut [f64]) -> Result<(), EvalError> {
        let result = match &self.kind {
            UnitKind::Explicit(unit) => unit.compute(
                Vector::new(&self.inputs, inputs),
                VectorMut::new(&self.outputs, outputs),
            ),
            UnitKind::Implicit(_) => Err(EvalError::unsupported("explicit evaluation")),
        };
        result.map_err(|e| e.in_unit(&self.name))
    }

    /// Evaluates residuals; explicit units report `outputs - f(inputs)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit fails at this point.
    pub fn evaluate_residuals(
        &self,
        inputs: &[f64],
        outputs: &[f64],
        residuals: &mut [f64],
    ) -> Result<(), EvalError> {
        match &self.kind {
            UnitKind::Explicit(_) => {
                let mut computed = vec![0.0; self.outputs.size()];
                self.evaluate(inputs, &mut computed)?;
                for ((r, y), f) in residuals.iter_mut().zip(outputs).zip(computed) {
                    *r = y - f;
                }
                Ok(())
            }
            UnitKind::Implicit(unit) => unit
                .apply_nonlinear(
                    Vector::new(&self.inputs, inputs),
                    Vector::new(&self.outputs, outputs),
                    VectorMut::new(&self.outputs, residuals),
                )
                .map_err(|e| e.in_unit(&self.name)),
        }
    }

    /// Lets the unit converge itself when it can.
    ///
    /// Explicit units always can, by computing their outputs. Returns
    /// `Ok(false)` when the unit has no way of solving itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit fails.
    pub fn solve_nonlinear(&mut self, inputs: &[f64], outputs: &mut [f64]) -> Result<bool, EvalError> {
        if !self.is_implicit() {
            return self.evaluate(inputs, outputs).map(|()| true);
        }
        match &mut self.kind {
            UnitKind::Implicit(unit) if self.capabilities.solve_nonlinear => unit
                .solve_nonlinear(
                    Vector::new(&self.inputs, inputs),
                    VectorMut::new(&self.outputs, outputs),
                )
                .map(|()| true)
                .map_err(|e| e.in_unit(&self.name)),
            _ => Ok(false),
        }
    }

    /// Gives an implicit unit the chance to adjust its outputs before a solve.
    pub fn guess(&self, inputs: &[f64], outputs: &mut [f64], residuals: &[f64]) {
        if let UnitKind::Implicit(unit) = &self.kind {
            unit.guess_nonlinear(
                Vector::new(&self.inputs, inputs),
                VectorMut::new(&self.outputs, outputs),
                Vector::new(&self.outputs, residuals),
            );
        }
    }

    /// Refreshes every partial at the given point.
    ///
    /// Runs the unit's own linearization, approximates FD/CS blocks, probes
    /// matrix-free units, and, when `strict_tol` is set, verifies that no
    /// derivative larger than the tolerance falls outside the declared sparsity.
    ///
    /// # Errors
    ///
    /// Returns an error if any evaluation fails or the sparsity check does.
    pub fn linearize(
        &mut self,
        inputs: &[f64],
        outputs: &[f64],
        strict_tol: Option<f64>,
    ) -> Result<(), EvalError> {
        let result = match &mut self.kind {
            UnitKind::Explicit(unit) => {
                unit.compute_partials(Vector::new(&self.inputs, inputs), &mut self.partials)
            }
            UnitKind::Implicit(unit) => unit.linearize(
                Vector::new(&self.inputs, inputs),
                Vector::new(&self.outputs, outputs),
                &mut self.partials,
            ),
        };
        result.map_err(|e| e.in_unit(&self.name))?;

        if self.capabilities.apply_linear {
            self.probed = Some(self.probe(inputs, outputs)?);
        }
        self.approximate(inputs, outputs)?;
        if let Some(tol) = strict_tol {
            self.verify_sparsity(inputs, outputs, tol)?;
        }
        Ok(())
    }

    /// Visits every structural Jacobian entry in residual form.
    ///
    /// Rows are flat output indices. The visiting order and count depend
    /// only on the declarations, never on values.
    pub fn for_each_entry(&self, mut visit: impl FnMut(usize, Column, f64)) {
        let n_out = self.outputs.size();
        let n_in = self.inputs.size();

        if self.capabilities.apply_linear {
            let width = n_out + n_in;
            let value = |r: usize, c: usize| self.probed.as_ref().map_or(0.0, |p| p[r * width + c]);
            for r in 0..n_out {
                for c in 0..n_out {
                    visit(r, Column::Output(c), value(r, c));
                }
                for c in 0..n_in {
                    visit(r, Column::Input(c), value(r, n_out + c));
                }
            }
            return;
        }

        let explicit = !self.is_implicit();
        if explicit {
            for i in 0..n_out {
                visit(i, Column::Output(i), 1.0);
            }
        }
        for subjac in self.partials.iter() {
            let row_offset = self.outputs.range_at(subjac.of).start;
            let sign = if explicit { -1.0 } else { 1.0 };
            for (r, c, v) in subjac.entries() {
                let column = match subjac.wrt {
                    Wrt::Input(p) => Column::Input(self.inputs.range_at(p).start + c),
                    Wrt::Output(p) => Column::Output(self.outputs.range_at(p).start + c),
                };
                visit(row_offset + r, column, sign * v);
            }
        }
    }

    /// Accumulates `d_residuals += J · [d_inputs; d_outputs]`.
    ///
    /// # Errors
    ///
    /// Returns an error if a matrix-free unit fails.
    pub fn apply_fwd(
        &self,
        inputs: &[f64],
        outputs: &[f64],
        d_inputs: &[f64],
        d_outputs: &[f64],
        d_residuals: &mut [f64],
    ) -> Result<(), EvalError> {
        if let (UnitKind::Implicit(unit), true) = (&self.kind, self.capabilities.apply_linear) {
            return unit
                .apply_linear(
                    Vector::new(&self.inputs, inputs),
                    Vector::new(&self.outputs, outputs),
                    JacVec::Fwd {
                        d_inputs: Vector::new(&self.inputs, d_inputs),
                        d_outputs: Vector::new(&self.outputs, d_outputs),
                        d_residuals: VectorMut::new(&self.outputs, d_residuals),
                    },
                )
                .map_err(|e| e.in_unit(&self.name));
        }
        self.for_each_entry(|r, col, v| {
            d_residuals[r] += v * match col {
                Column::Input(c) => d_inputs[c],
                Column::Output(c) => d_outputs[c],
            };
        });
        Ok(())
    }

    /// Accumulates `[d_inputs; d_outputs] += Jᵀ · d_residuals`.
    ///
    /// # Errors
    ///
    /// Returns an error if a matrix-free unit fails.
    pub fn apply_rev(
        &self,
        inputs: &[f64],
        outputs: &[f64],
        d_residuals: &[f64],
        d_inputs: &mut [f64],
        d_outputs: &mut [f64],
    ) -> Result<(), EvalError> {
        if let (UnitKind::Implicit(unit), true) = (&self.kind, self.capabilities.apply_linear) {
            return unit
                .apply_linear(
                    Vector::new(&self.inputs, inputs),
                    Vector::new(&self.outputs, outputs),
                    JacVec::Rev {
                        d_residuals: Vector::new(&self.outputs, d_residuals),
                        d_inputs: VectorMut::new(&self.inputs, d_inputs),
                        d_outputs: VectorMut::new(&self.outputs, d_outputs),
                    },
                )
                .map_err(|e| e.in_unit(&self.name));
        }
        self.for_each_entry(|r, col, v| match col {
            Column::Input(c) => d_inputs[c] += v * d_residuals[r],
            Column::Output(c) => d_outputs[c] += v * d_residuals[r],
        });
        Ok(())
    }

    /// Solves the unit's diagonal block with its own `solve_linear`.
    ///
    /// Returns `None` when the unit does not provide one.
    #[must_use]
    pub fn solve_linear(&self, rhs: &[f64], mode: Mode) -> Option<Result<Vec<f64>, EvalError>> {
        match &self.kind {
            UnitKind::Implicit(unit) if self.capabilities.solve_linear => {
                let mut solution = vec![0.0; self.outputs.size()];
                let result = unit.solve_linear(
                    Vector::new(&self.outputs, rhs),
                    VectorMut::new(&self.outputs, &mut solution),
                    mode,
                );
                Some(result.map(|()| solution).map_err(|e| e.in_unit(&self.name)))
            }
            _ => None,
        }
    }

    /// Builds the dense residual Jacobian of a matrix-free unit column by column.
    fn probe(&self, inputs: &[f64], outputs: &[f64]) -> Result<Vec<f64>, EvalError> {
        let n_out = self.outputs.size();
        let n_in = self.inputs.size();
        let width = n_out + n_in;
        let mut dense = vec![0.0; n_out * width];

        let mut d_inputs = vec![0.0; n_in];
        let mut d_outputs = vec![0.0; n_out];
        for c in 0..width {
            if c < n_out {
                d_outputs[c] = 1.0;
            } else {
                d_inputs[c - n_out] = 1.0;
            }
            let mut d_residuals = vec![0.0; n_out];
            if let UnitKind::Implicit(unit) = &self.kind {
                unit.apply_linear(
                    Vector::new(&self.inputs, inputs),
                    Vector::new(&self.outputs, outputs),
                    JacVec::Fwd {
                        d_inputs: Vector::new(&self.inputs, &d_inputs),
                        d_outputs: Vector::new(&self.outputs, &d_outputs),
                        d_residuals: VectorMut::new(&self.outputs, &mut d_residuals),
                    },
                )
                .map_err(|e| e.in_unit(&self.name))?;
            }
            for (r, v) in d_residuals.into_iter().enumerate() {
                dense[r * width + c] = v;
            }
            d_inputs.fill(0.0);
            d_outputs.fill(0.0);
        }
        Ok(dense)
    }
}

/// Builds a variable layout, checking names and default value sizes.
fn build_layout(unit: &str, vars: &[Variable], other: Option<&VarLayout>) -> Result<VarLayout, Error> {
    let mut layout = VarLayout::new();
    for var in vars {
        let full = format!("{unit}.{}", var.name());
        if var.default_value().len() != var.size() {
            return Err(Error::ShapeMismatch {
                name: full,
                expected: var.size(),
                found: var.default_value().len(),
            });
        }
        let clash = other.is_some_and(|o| o.position(var.name()).is_some());
        if clash || layout.push(var.name(), var.size()).is_none() {
            return Err(Error::DuplicateVariable(full));
        }
    }
    Ok(layout)
}
