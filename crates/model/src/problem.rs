use std::collections::HashMap;

use tracing::{info, warn};
use weft_coloring::ColoringCache;
use weft_core::{Jacobian, Layout, Observer, Target, UnitAdapter, VarKind, VariableStore};
use weft_solvers::nonlinear::{Action, Event, Solution};

use crate::{
    Error, SolverOptions,
    block::{Buffers, Operator, Part, SolverBlock, transfer},
    model::Link,
};

/// A model laid out and ready to run.
///
/// Created by [`Model::setup`](crate::Model::setup). Values are read and
/// written by `"unit.variable"` name. Outputs may be set to provide an
/// initial guess; inputs may only be set when nothing is connected to them.
#[derive(Debug)]
pub struct Problem {
    pub(crate) store: VariableStore,
    pub(crate) units: Vec<UnitAdapter>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) layout: Layout,
    pub(crate) blocks: Vec<SolverBlock>,
    pub(crate) links: HashMap<Target, Link>,
    pub(crate) options: SolverOptions,
    pub(crate) order: Vec<usize>,
    pub(crate) total_parts: Vec<Part>,
    pub(crate) total_jacobian: Option<Jacobian>,
    pub(crate) coloring: ColoringCache,
}

/// How one block's nonlinear solve went.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockReport {
    pub name: String,
    pub solver: &'static str,
    pub solution: Solution,
}

/// The outcome of [`Problem::run_model`], one report per block in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub blocks: Vec<BlockReport>,
}

impl RunReport {
    /// Returns `true` if every block converged.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.blocks.iter().all(|b| b.solution.is_converged())
    }

    /// Returns the report for a block by name.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&BlockReport> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

/// An output whose residual exceeds the requested tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualEntry {
    pub name: String,
    pub norm: f64,
}

impl Problem {
    /// Returns a variable's value.
    ///
    /// # Errors
    ///
    /// Returns an error if no variable has this name.
    pub fn get(&self, name: &str) -> Result<&[f64], Error> {
        Ok(self.store.get(name)?)
    }

    /// Sets an output or an unconnected input.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown, the length is wrong, or the
    /// input is connected to a source.
    pub fn set(&mut self, name: &str, value: &[f64]) -> Result<(), Error> {
        self.check_settable(name)?;
        Ok(self.store.set(name, value)?)
    }

    /// Returns a variable's value converted to `units`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unknown or its units are not
    /// convertible to `units`.
    pub fn get_in_units(&self, name: &str, units: &str) -> Result<Vec<f64>, Error> {
        Ok(self.store.get_in_units(name, units)?)
    }

    /// Sets a variable from a value given in `units`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Problem::set`], and an error if the units are
    /// not convertible.
    pub fn set_in_units(&mut self, name: &str, value: &[f64], units: &str) -> Result<(), Error> {
        self.check_settable(name)?;
        Ok(self.store.set_in_units(name, value, units)?)
    }

    /// Returns the residual of an output or independent input.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unknown or is a connected input.
    pub fn residual(&self, name: &str) -> Result<&[f64], Error> {
        Ok(self.store.residual(name)?)
    }

    #[must_use]
    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    /// Names of the solver blocks in execution order.
    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.name.as_str())
    }

    #[must_use]
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Returns the unit registered under `name`.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&UnitAdapter> {
        self.index.get(name).map(|&u| &self.units[u])
    }

    /// Runs every block's nonlinear solver in execution order.
    ///
    /// Non-convergence is reported, not raised, unless a solver is configured
    /// with `err_on_non_convergence`.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit fails or a solver raises one.
    pub fn run_model(&mut self) -> Result<RunReport, Error> {
        self.run_model_observed(())
    }

    /// Like [`Problem::run_model`], passing every solver event to `observer`.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit fails or a solver raises one.
    pub fn run_model_observed<Obs>(&mut self, mut observer: Obs) -> Result<RunReport, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        let strict_tol = self.options.strict_partials;
        let mut report = RunReport::default();

        for block in &mut self.blocks {
            let name = block.name.clone();
            let (slots, residuals, inputs) = self.store.buffers_mut();
            let buffers = Buffers {
                layout: &self.layout,
                units: &mut self.units,
                slots,
                residuals,
                inputs,
                strict_tol,
            };
            let (solver, mut system) = block.split(buffers);
            let solver_name = solver.name();
            let solution = solver
                .solve(&mut system, |event: &Event<'_>| observer.observe(event))
                .map_err(|source| Error::Nonlinear {
                    block: name.clone(),
                    source,
                })?;

            if solution.is_converged() {
                info!(block = %name, solver = solver_name, iters = solution.iters, residual_norm = solution.residual_norm, "block converged");
            } else {
                warn!(
                    block = %name,
                    solver = solver_name,
                    status = ?solution.status,
                    iters = solution.iters,
                    residual_norm = solution.residual_norm,
                    "block did not converge"
                );
            }
            report.blocks.push(BlockReport {
                name,
                solver: solver_name,
                solution,
            });
        }

        self.evaluate_all()?;
        Ok(report)
    }

    /// Lists every output whose residual norm exceeds `tol`, largest first.
    #[must_use]
    pub fn list_residuals(&self, tol: f64) -> Vec<ResidualEntry> {
        let mut entries: Vec<ResidualEntry> = self
            .store
            .ids()
            .filter(|&id| self.store.kind(id) == VarKind::Output)
            .filter_map(|id| {
                let range = self.store.slot_range(id)?;
                let norm = self.store.residuals()[range]
                    .iter()
                    .map(|r| r * r)
                    .sum::<f64>()
                    .sqrt();
                (norm > tol).then(|| ResidualEntry {
                    name: self.store.name(id).to_owned(),
                    norm,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.norm.total_cmp(&a.norm));
        entries
    }

    fn check_settable(&self, name: &str) -> Result<(), Error> {
        let id = self.store.id(name)?;
        if self.store.kind(id) == VarKind::Input && !self.store.is_independent(id) {
            return Err(weft_core::Error::NotIndependent(name.to_owned()).into());
        }
        Ok(())
    }

    /// Transfers inputs and evaluates residuals of every unit.
    pub(crate) fn evaluate_all(&mut self) -> Result<(), Error> {
        let (slots, residuals, inputs) = self.store.buffers_mut();
        for &u in &self.order {
            let unit = self.layout.unit(u);
            transfer(unit, slots, inputs);
            self.units[u].evaluate_residuals(
                &inputs[unit.inputs.clone()],
                &slots[unit.outputs.clone()],
                &mut residuals[unit.outputs.clone()],
            )?;
        }
        Ok(())
    }

    /// Linearizes every unit and refreshes the Jacobian over all slots.
    pub(crate) fn linearize_all(&mut self) -> Result<(), Error> {
        let strict_tol = self.options.strict_partials;
        let (slots, _, inputs) = self.store.buffers_mut();
        for &u in &self.order {
            let unit = self.layout.unit(u);
            transfer(unit, slots, inputs);
            self.units[u].linearize(&inputs[unit.inputs.clone()], &slots[unit.outputs.clone()], strict_tol)?;
        }
        if let Some(jacobian) = self.total_jacobian.as_mut() {
            jacobian.refresh(&self.layout, &self.units);
        } else {
            self.total_jacobian = Some(Jacobian::new(
                &self.layout,
                &self.units,
                self.order.clone(),
                0..self.layout.size(),
            ));
        }
        Ok(())
    }

    /// The Jacobian over all slots, as of the last [`Problem::linearize_all`].
    pub(crate) fn total_operator(&self) -> Operator<'_> {
        Operator {
            layout: &self.layout,
            units: &self.units,
            unit_ids: &self.order,
            range: 0..self.layout.size(),
            parts: &self.total_parts,
            jacobian: self.total_jacobian.as_ref(),
            slots: self.store.slots(),
            inputs: self.store.inputs(),
        }
    }
}
