use std::ops::Range;

use crate::{EvalError, LinearOperator, Mode, UnitAdapter};

use super::Layout;

/// Jacobian products formed unit by unit, without an assembled matrix.
///
/// Holds the current point so units with their own `apply_linear` can
/// evaluate products there.
#[derive(Debug, Clone)]
pub struct MatrixFree<'a> {
    layout: &'a Layout,
    units: &'a [UnitAdapter],
    unit_ids: &'a [usize],
    range: Range<usize>,
    slots: &'a [f64],
    inputs: &'a [f64],
}

impl<'a> MatrixFree<'a> {
    /// Creates an operator over `range` for the given units and point.
    ///
    /// `slots` is the full slot vector and `inputs` the full input buffer.
    #[must_use]
    pub fn new(
        layout: &'a Layout,
        units: &'a [UnitAdapter],
        unit_ids: &'a [usize],
        range: Range<usize>,
        slots: &'a [f64],
        inputs: &'a [f64],
    ) -> Self {
        Self {
            layout,
            units,
            unit_ids,
            range,
            slots,
            inputs,
        }
    }

    fn independents(&self) -> impl Iterator<Item = usize> + '_ {
        self.layout
            .independents()
            .iter()
            .flat_map(Clone::clone)
            .filter(|s| self.range.contains(s))
    }
}

impl LinearOperator for MatrixFree<'_> {
    fn dim(&self) -> usize {
        self.range.len()
    }

    fn apply(&self, mode: Mode, x: &[f64], y: &mut [f64]) -> Result<(), EvalError> {
        let start = self.range.start;
        let local = |slot: usize| self.range.contains(&slot).then(|| slot - start);

        y.fill(0.0);
        for s in self.independents() {
            y[s - start] += x[s - start];
        }

        for &u in self.unit_ids {
            let slots = self.layout.unit(u);
            let unit = &self.units[u];
            let inputs = &self.inputs[slots.inputs.clone()];
            let outputs = &self.slots[slots.outputs.clone()];
            let Some(out_start) = local(slots.outputs.start) else {
                continue;
            };
            let out_range = out_start..out_start + slots.outputs.len();

            match mode {
                Mode::Fwd => {
                    let d_inputs: Vec<f64> = slots
                        .routes
                        .iter()
                        .map(|route| local(route.slot).map_or(0.0, |s| route.scale * x[s]))
                        .collect();
                    let d_outputs = &x[out_range.clone()];
                    let mut d_residuals = vec![0.0; slots.outputs.len()];
                    unit.apply_fwd(inputs, outputs, &d_inputs, d_outputs, &mut d_residuals)?;
                    for (yi, d) in y[out_range].iter_mut().zip(d_residuals) {
                        *yi += d;
                    }
                }
                Mode::Rev => {
                    let d_residuals = &x[out_range.clone()];
                    let mut d_inputs = vec![0.0; slots.routes.len()];
                    let mut d_outputs = vec![0.0; slots.outputs.len()];
                    unit.apply_rev(inputs, outputs, d_residuals, &mut d_inputs, &mut d_outputs)?;
                    for (yi, d) in y[out_range].iter_mut().zip(d_outputs) {
                        *yi += d;
                    }
                    for (route, d) in slots.routes.iter().zip(d_inputs) {
                        if let Some(s) = local(route.slot) {
                            y[s] += route.scale * d;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
