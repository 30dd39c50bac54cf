use std::ops::Range;

use tracing::{debug, info};
use weft_coloring::ColoringCache;
use weft_core::{Layout, Route, Target, UnitAdapter, UnitSlots, VarId, VariableStore};

use crate::{
    BlockSolverOptions, Error, Model, Problem, SolverOptions,
    block::{SolverBlock, partition},
};

impl Model {
    /// Lays out the model and assigns solvers, producing a runnable problem.
    ///
    /// Units are grouped into blocks by the strongly connected components
    /// of the connection graph, in execution order. Outputs get slots block
    /// by block, so each block owns a contiguous range; unconnected inputs
    /// become independent variables with slots after every output.
    ///
    /// A block without explicit solver options gets:
    ///
    /// - run once, for a single explicit unit or a single implicit unit
    ///   that can solve itself
    /// - Newton with a direct linear solver, otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or name an unknown unit.
    pub fn setup(self) -> Result<Problem, Error> {
        let Self {
            units,
            index,
            graph,
            links,
            options,
        } = self;
        options.validate()?;
        if let Some(name) = options.blocks.keys().find(|name| !index.contains_key(*name)) {
            return Err(Error::Setup(format!("solver options name unknown unit '{name}'")));
        }

        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| weft_core::Error::UnknownUnit(name.to_owned()))
        };
        let mut groups = Vec::new();
        for block in graph.topological_order() {
            let ids = block.units().iter().map(|name| lookup(name)).collect::<Result<Vec<_>, _>>()?;
            let name = match block.units() {
                [single] => single.clone(),
                names => format!("[{}]", names.join(", ")),
            };
            groups.push((name, ids, block.is_coupled()));
        }

        let mut store = VariableStore::new();
        let mut outputs = vec![0..0; units.len()];
        for &u in groups.iter().flat_map(|(_, ids, _)| ids) {
            let start = store.n_slots();
            for var in units[u].output_vars() {
                store.add_output(format!("{}.{}", units[u].name(), var.name()), var)?;
            }
            outputs[u] = start..store.n_slots();
        }

        let mut input_ids: Vec<Vec<VarId>> = Vec::with_capacity(units.len());
        let mut input_ranges = Vec::with_capacity(units.len());
        for unit in &units {
            let start = store.inputs().len();
            let ids = unit
                .input_vars()
                .iter()
                .map(|var| store.add_input(format!("{}.{}", unit.name(), var.name()), var))
                .collect::<Result<Vec<_>, _>>()?;
            input_ids.push(ids);
            input_ranges.push(start..store.inputs().len());
        }

        let mut independents = Vec::new();
        let mut unit_slots = Vec::with_capacity(units.len());
        for (u, unit) in units.iter().enumerate() {
            let mut routes = Vec::with_capacity(input_ranges[u].len());
            for (var, &id) in unit.input_vars().iter().zip(&input_ids[u]) {
                let target = Target::new(unit.name(), var.name());
                if let Some(link) = links.get(&target) {
                    let source = store.id(&link.source.to_string())?;
                    let range = store
                        .slot_range(source)
                        .ok_or_else(|| Error::Setup(format!("source of '{target}' owns no slots")))?;
                    routes.extend(range.map(|slot| Route {
                        slot,
                        scale: link.scale,
                        offset: link.offset,
                    }));
                } else {
                    let range = store.make_independent(id);
                    debug!(input = %target, "independent input");
                    routes.extend(range.clone().map(|slot| Route {
                        slot,
                        scale: 1.0,
                        offset: 0.0,
                    }));
                    independents.push(range);
                }
            }
            unit_slots.push(UnitSlots {
                outputs: outputs[u].clone(),
                inputs: input_ranges[u].clone(),
                routes,
            });
        }
        let layout = Layout::new(store.n_slots(), unit_slots, independents);

        if options.root.is_some() {
            let all = groups.into_iter().flat_map(|(_, ids, _)| ids).collect();
            groups = vec![("root".to_owned(), all, true)];
        }

        let mut blocks = Vec::with_capacity(groups.len());
        for (name, mut unit_ids, coupled) in groups {
            unit_ids.sort_by_key(|&u| layout.unit(u).outputs.start);
            let range = span(&layout, &unit_ids);
            let block_options = choose(&options, &units, &unit_ids, coupled);
            let solver = block_options.nonlinear.build(&block_options.linear)?;
            debug!(block = %name, units = unit_ids.len(), slots = range.len(), solver = solver.name(), "block");
            blocks.push(SolverBlock {
                parts: partition(&layout, &unit_ids, &range),
                bounds: bounds(&units, &unit_ids),
                name,
                unit_ids,
                range,
                options: block_options,
                solver,
                jacobian: None,
            });
        }

        let order: Vec<usize> = blocks.iter().flat_map(|b| b.unit_ids.iter().copied()).collect();
        let total_parts = partition(&layout, &order, &(0..layout.size()));
        let coloring = match &options.totals.coloring_file {
            Some(path) => ColoringCache::with_file(path.clone()),
            None => ColoringCache::new(),
        };
        info!(
            units = units.len(),
            blocks = blocks.len(),
            slots = layout.size(),
            independents = layout.independents().len(),
            "model set up"
        );

        Ok(Problem {
            store,
            units,
            index,
            layout,
            blocks,
            links,
            options,
            order,
            total_parts,
            total_jacobian: None,
            coloring,
        })
    }
}

/// The slot range covered by a block's outputs.
fn span(layout: &Layout, unit_ids: &[usize]) -> Range<usize> {
    let start = unit_ids.first().map_or(0, |&u| layout.unit(u).outputs.start);
    let end = unit_ids.last().map_or(start, |&u| layout.unit(u).outputs.end);
    start..end
}

fn choose(options: &SolverOptions, units: &[UnitAdapter], unit_ids: &[usize], coupled: bool) -> BlockSolverOptions {
    if let Some(root) = &options.root {
        return root.clone();
    }
    if let Some(chosen) = unit_ids.iter().find_map(|&u| options.blocks.get(units[u].name())) {
        return chosen.clone();
    }
    match unit_ids {
        [u] if !coupled && (!units[*u].is_implicit() || units[*u].capabilities().solve_nonlinear) => {
            BlockSolverOptions::default()
        }
        _ => BlockSolverOptions::newton(),
    }
}

fn bounds(units: &[UnitAdapter], unit_ids: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    for &u in unit_ids {
        for var in units[u].output_vars() {
            let (lo, hi) = var.bounds();
            lower.extend(std::iter::repeat_n(lo, var.size()));
            upper.extend(std::iter::repeat_n(hi, var.size()));
        }
    }
    (lower, upper)
}
