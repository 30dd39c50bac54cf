use std::ops::Range;

use sprs::CsMat;
use tracing::trace;
use weft_core::{
    EvalError, Jacobian, Layout, LinearOperator, MatrixFree, Mode, NonlinearSystem, UnitAdapter, UnitSlots,
};
use weft_solvers::nonlinear::NonlinearSolver;

use crate::BlockSolverOptions;

/// One diagonal block of an operator: a unit's outputs or an independent input.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Part {
    pub(crate) range: Range<usize>,
    pub(crate) unit: Option<usize>,
}

/// Partitions `range` into unit output blocks followed by independent blocks.
///
/// Offsets are relative to `range.start`; empty blocks are skipped.
pub(crate) fn partition(layout: &Layout, unit_ids: &[usize], range: &Range<usize>) -> Vec<Part> {
    let local = |r: &Range<usize>| r.start - range.start..r.end - range.start;
    let units = unit_ids.iter().filter_map(|&u| {
        let outputs = &layout.unit(u).outputs;
        (!outputs.is_empty() && range.contains(&outputs.start)).then(|| Part {
            range: local(outputs),
            unit: Some(u),
        })
    });
    let independents = layout
        .independents()
        .iter()
        .filter(|r| !r.is_empty() && range.contains(&r.start))
        .map(|r| Part {
            range: local(r),
            unit: None,
        });
    units.chain(independents).collect()
}

/// Copies a unit's inputs from the slots they are routed from.
pub(crate) fn transfer(unit: &UnitSlots, slots: &[f64], inputs: &mut [f64]) {
    for (k, route) in unit.routes.iter().enumerate() {
        inputs[unit.inputs.start + k] = route.scale * slots[route.slot] + route.offset;
    }
}

/// The Jacobian over a range of slots, assembled or matrix-free.
///
/// Exposes one diagonal block per unit so block solvers can sweep them and
/// use a unit's own linear solve where it has one.
#[derive(Debug, Clone)]
pub(crate) struct Operator<'a> {
    pub(crate) layout: &'a Layout,
    pub(crate) units: &'a [UnitAdapter],
    pub(crate) unit_ids: &'a [usize],
    pub(crate) range: Range<usize>,
    pub(crate) parts: &'a [Part],
    pub(crate) jacobian: Option<&'a Jacobian>,
    pub(crate) slots: &'a [f64],
    pub(crate) inputs: &'a [f64],
}

impl LinearOperator for Operator<'_> {
    fn dim(&self) -> usize {
        self.range.len()
    }

    fn apply(&self, mode: Mode, x: &[f64], y: &mut [f64]) -> Result<(), EvalError> {
        match self.jacobian {
            Some(jacobian) => jacobian.apply(mode, x, y),
            None => MatrixFree::new(
                self.layout,
                self.units,
                self.unit_ids,
                self.range.clone(),
                self.slots,
                self.inputs,
            )
            .apply(mode, x, y),
        }
    }

    fn assembled(&self) -> Option<&CsMat<f64>> {
        self.jacobian.map(Jacobian::matrix)
    }

    fn blocks(&self) -> Vec<Range<usize>> {
        self.parts.iter().map(|p| p.range.clone()).collect()
    }

    fn solve_block(&self, block: usize, rhs: &[f64], mode: Mode) -> Option<Result<Vec<f64>, EvalError>> {
        let unit = self.parts.get(block)?.unit?;
        self.units[unit].solve_linear(rhs, mode)
    }
}

/// A block of units with its solvers and cached Jacobian.
#[derive(Debug)]
pub(crate) struct SolverBlock {
    pub(crate) name: String,
    pub(crate) unit_ids: Vec<usize>,
    pub(crate) range: Range<usize>,
    pub(crate) parts: Vec<Part>,
    pub(crate) bounds: (Vec<f64>, Vec<f64>),
    pub(crate) options: BlockSolverOptions,
    pub(crate) solver: NonlinearSolver,
    pub(crate) jacobian: Option<Jacobian>,
}

/// Shared model state a block system reads and writes.
pub(crate) struct Buffers<'a> {
    pub(crate) layout: &'a Layout,
    pub(crate) units: &'a mut [UnitAdapter],
    pub(crate) slots: &'a mut [f64],
    pub(crate) residuals: &'a mut [f64],
    pub(crate) inputs: &'a mut [f64],
    pub(crate) strict_tol: Option<f64>,
}

impl SolverBlock {
    /// Splits the block into its solver and a system over its slots.
    pub(crate) fn split<'a>(&'a mut self, buffers: Buffers<'a>) -> (&'a mut NonlinearSolver, BlockSystem<'a>) {
        let system = BlockSystem {
            buffers,
            unit_ids: &self.unit_ids,
            range: &self.range,
            parts: &self.parts,
            bounds: &self.bounds,
            jacobian: &mut self.jacobian,
            assemble: self.options.assemble_jac,
        };
        (&mut self.solver, system)
    }
}

/// The unknowns and residuals of one block, as seen by a nonlinear solver.
///
/// Every evaluation first transfers inputs from the slots they are routed
/// from, so units always see the latest upstream values.
pub(crate) struct BlockSystem<'a> {
    buffers: Buffers<'a>,
    unit_ids: &'a [usize],
    range: &'a Range<usize>,
    parts: &'a [Part],
    bounds: &'a (Vec<f64>, Vec<f64>),
    jacobian: &'a mut Option<Jacobian>,
    assemble: bool,
}

impl BlockSystem<'_> {
    fn operator(&self) -> Operator<'_> {
        Operator {
            layout: self.buffers.layout,
            units: &*self.buffers.units,
            unit_ids: self.unit_ids,
            range: self.range.clone(),
            parts: self.parts,
            jacobian: self.jacobian.as_ref().filter(|_| self.assemble),
            slots: &*self.buffers.slots,
            inputs: &*self.buffers.inputs,
        }
    }

    fn transfer(&mut self, unit: usize) {
        let b = &mut self.buffers;
        transfer(b.layout.unit(unit), &*b.slots, &mut *b.inputs);
    }

    /// Transfers and evaluates residuals for every unit in the block.
    fn evaluate(&mut self) -> Result<(), EvalError> {
        for &u in self.unit_ids {
            self.transfer(u);
            let b = &mut self.buffers;
            let slots = b.layout.unit(u);
            b.units[u].evaluate_residuals(
                &b.inputs[slots.inputs.clone()],
                &b.slots[slots.outputs.clone()],
                &mut b.residuals[slots.outputs.clone()],
            )?;
        }
        Ok(())
    }
}

impl LinearOperator for BlockSystem<'_> {
    fn dim(&self) -> usize {
        self.range.len()
    }

    fn apply(&self, mode: Mode, x: &[f64], y: &mut [f64]) -> Result<(), EvalError> {
        self.operator().apply(mode, x, y)
    }

    fn assembled(&self) -> Option<&CsMat<f64>> {
        self.jacobian
            .as_ref()
            .filter(|_| self.assemble)
            .map(Jacobian::matrix)
    }

    fn blocks(&self) -> Vec<Range<usize>> {
        self.operator().blocks()
    }

    fn solve_block(&self, block: usize, rhs: &[f64], mode: Mode) -> Option<Result<Vec<f64>, EvalError>> {
        self.operator().solve_block(block, rhs, mode)
    }
}

impl NonlinearSystem for BlockSystem<'_> {
    fn state(&self) -> Vec<f64> {
        self.buffers.slots[self.range.clone()].to_vec()
    }

    fn set_state(&mut self, state: &[f64]) {
        self.buffers.slots[self.range.clone()].copy_from_slice(state);
    }

    fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.bounds.clone()
    }

    fn residuals(&mut self) -> Result<Vec<f64>, EvalError> {
        self.evaluate()?;
        Ok(self.buffers.residuals[self.range.clone()].to_vec())
    }

    fn linearize(&mut self) -> Result<(), EvalError> {
        for &u in self.unit_ids {
            self.transfer(u);
            let b = &mut self.buffers;
            let slots = b.layout.unit(u);
            b.units[u].linearize(
                &b.inputs[slots.inputs.clone()],
                &b.slots[slots.outputs.clone()],
                b.strict_tol,
            )?;
        }
        if self.assemble {
            let b = &self.buffers;
            if let Some(jacobian) = self.jacobian.as_mut() {
                jacobian.refresh(b.layout, &*b.units);
            } else {
                *self.jacobian = Some(Jacobian::new(
                    b.layout,
                    &*b.units,
                    self.unit_ids.to_vec(),
                    self.range.clone(),
                ));
            }
        }
        Ok(())
    }

    fn sweep(&mut self) -> Result<(), EvalError> {
        for &u in self.unit_ids {
            self.transfer(u);
            let b = &mut self.buffers;
            let slots = b.layout.unit(u);
            let solved = b.units[u].solve_nonlinear(
                &b.inputs[slots.inputs.clone()],
                &mut b.slots[slots.outputs.clone()],
            )?;
            if !solved {
                trace!(unit = b.units[u].name(), "unit cannot solve itself; left unchanged");
            }
        }
        Ok(())
    }

    fn guess(&mut self) -> Result<(), EvalError> {
        if !self.unit_ids.iter().any(|&u| self.buffers.units[u].is_implicit()) {
            return Ok(());
        }
        self.evaluate()?;
        let b = &mut self.buffers;
        for &u in self.unit_ids {
            let slots = b.layout.unit(u);
            b.units[u].guess(
                &b.inputs[slots.inputs.clone()],
                &mut b.slots[slots.outputs.clone()],
                &b.residuals[slots.outputs.clone()],
            );
        }
        Ok(())
    }
}
