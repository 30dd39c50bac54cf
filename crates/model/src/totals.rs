//! Total derivatives of model quantities with respect to independent inputs.
//!
//! Every total is an entry of the inverse of the global Jacobian `J`. Forward
//! mode solves `J x = e_wrt` once per independent entry and reads the rows of
//! interest from `x`; reverse mode solves `Jᵀ λ = e_of` once per entry of
//! interest and reads the independent columns from `λ`. Both give the same
//! matrix, so pick whichever needs fewer solves.
//!
//! Connected inputs are valid quantities of interest: their totals are the
//! totals of their source, scaled by the unit conversion.

use std::ops::Range;

use ndarray::{Array2, ArrayView2, s};
use rand::{Rng, rngs::StdRng};
use sprs::CsMat;
use tracing::{debug, info, warn};
use weft_coloring::{Coloring, Fingerprint, Pattern, Signature};
use weft_core::{EvalError, LinearOperator, Mode, Target, VarKind};
use weft_solvers::linear::{self, Direct, LinearSolution, LinearSolver};

use crate::{Error, Problem, model::split};

/// A dense total Jacobian, addressable by `(of, wrt)` name pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    of: Vec<(String, Range<usize>)>,
    wrt: Vec<(String, Range<usize>)>,
    values: Array2<f64>,
    solves: usize,
}

impl Totals {
    pub(crate) fn new(of: Vec<(String, Range<usize>)>, wrt: Vec<(String, Range<usize>)>, values: Array2<f64>) -> Self {
        Self {
            of,
            wrt,
            values,
            solves: 0,
        }
    }

    /// Returns the block of `d of / d wrt`, shaped `(size of, size wrt)`.
    #[must_use]
    pub fn get(&self, of: &str, wrt: &str) -> Option<ArrayView2<'_, f64>> {
        let rows = find(&self.of, of)?;
        let cols = find(&self.wrt, wrt)?;
        Some(self.values.slice(s![rows, cols]))
    }

    /// Returns `d of / d wrt` when both are scalars.
    #[must_use]
    pub fn value(&self, of: &str, wrt: &str) -> Option<f64> {
        let block = self.get(of, wrt)?;
        (block.dim() == (1, 1)).then(|| block[[0, 0]])
    }

    /// The whole matrix, rows in `of` order and columns in `wrt` order.
    #[must_use]
    pub fn matrix(&self) -> &Array2<f64> {
        &self.values
    }

    /// Number of linear solves it took.
    #[must_use]
    pub fn solves(&self) -> usize {
        self.solves
    }

    /// Iterates over every `(of, wrt, block)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, ArrayView2<'_, f64>)> {
        self.of.iter().flat_map(move |(of, rows)| {
            self.wrt.iter().map(move |(wrt, cols)| {
                (
                    of.as_str(),
                    wrt.as_str(),
                    self.values.slice(s![rows.clone(), cols.clone()]),
                )
            })
        })
    }
}

fn find(names: &[(String, Range<usize>)], name: &str) -> Option<Range<usize>> {
    names.iter().find(|(n, _)| n == name).map(|(_, r)| r.clone())
}

/// Names resolved to one slot per scalar entry.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub(crate) names: Vec<(String, Range<usize>)>,
    pub(crate) slots: Vec<usize>,
    pub(crate) scales: Vec<f64>,
}

impl Resolved {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn push(&mut self, name: &str, slots: Range<usize>, scale: f64) {
        let start = self.slots.len();
        self.scales.extend(std::iter::repeat_n(scale, slots.len()));
        self.slots.extend(slots);
        self.names.push((name.to_owned(), start..self.slots.len()));
    }

    fn empty() -> Self {
        Self {
            names: Vec::new(),
            slots: Vec::new(),
            scales: Vec::new(),
        }
    }
}

impl Problem {
    /// Computes the totals of `of` with respect to `wrt`.
    ///
    /// `of` may name any output or input. `wrt` must name inputs with no
    /// connected source. The model should have been run first; totals are
    /// taken at the current point.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown, a `wrt` is not independent, a
    /// unit fails to linearize, or a linear solve fails.
    pub fn compute_totals(&mut self, of: &[&str], wrt: &[&str], mode: Mode) -> Result<Totals, Error> {
        let of = self.resolve_of(of)?;
        let wrt = self.resolve_wrt(wrt)?;
        self.linearize_all()?;

        let op = self.total_operator();
        let mut solver = self.options.totals.linear.build()?;
        solver.setup(&op)?;

        let values = solve_totals(&mut *solver, &op, &of, &wrt, mode)?;
        let solves = match mode {
            Mode::Fwd => wrt.len(),
            Mode::Rev => of.len(),
        };
        debug!(?mode, solves, shape = ?values.dim(), "computed totals");

        Ok(Totals {
            of: of.names,
            wrt: wrt.names,
            values,
            solves,
        })
    }

    /// Computes the coloring of the total Jacobian for these quantities.
    ///
    /// The sparsity is detected by solving with randomized Jacobian values,
    /// so it reflects structure only. The result is cached, and persisted
    /// when a coloring file is configured, until the structure changes.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is invalid, linearization fails, or the
    /// sampled Jacobian is singular.
    pub fn coloring(&mut self, of: &[&str], wrt: &[&str]) -> Result<Coloring, Error> {
        let of = self.resolve_of(of)?;
        let wrt = self.resolve_wrt(wrt)?;
        self.linearize_all()?;
        self.coloring_for(&of, &wrt)
    }

    /// Computes totals with one solve per color group instead of one per entry.
    ///
    /// Gives the same values as [`Problem::compute_totals`].
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Problem::coloring`] and
    /// [`Problem::compute_totals`].
    pub fn compute_totals_colored(&mut self, of: &[&str], wrt: &[&str]) -> Result<Totals, Error> {
        let of = self.resolve_of(of)?;
        let wrt = self.resolve_wrt(wrt)?;
        self.linearize_all()?;
        let coloring = self.coloring_for(&of, &wrt)?;
        info!(summary = %coloring.summary(), "colored totals");

        let op = self.total_operator();
        let mut solver = self.options.totals.linear.build()?;
        solver.setup(&op)?;
        let mut rhs = vec![0.0; op.dim()];
        let mut fwd: Vec<Vec<f64>> = Vec::new();
        for group in coloring.groups(Mode::Fwd) {
            rhs.fill(0.0);
            for &j in group {
                rhs[wrt.slots[j]] += 1.0;
            }
            let x = solve(&mut *solver, &op, &rhs, Mode::Fwd)?;
            fwd.push(of.slots.iter().zip(&of.scales).map(|(&row, &scale)| scale * x[row]).collect());
        }

        let mut rev: Vec<Vec<f64>> = Vec::new();
        for group in coloring.groups(Mode::Rev) {
            rhs.fill(0.0);
            for &i in group {
                rhs[of.slots[i]] += of.scales[i];
            }
            let lambda = solve(&mut *solver, &op, &rhs, Mode::Rev)?;
            rev.push(wrt.slots.iter().map(|&col| lambda[col]).collect());
        }

        let dense = coloring.recover(&fwd, &rev)?;
        let ncols = wrt.len();
        let values = Array2::from_shape_fn((of.len(), ncols), |(i, j)| dense[i * ncols + j]);
        Ok(Totals {
            of: of.names,
            wrt: wrt.names,
            values,
            solves: fwd.len() + rev.len(),
        })
    }

    fn coloring_for(&mut self, of: &Resolved, wrt: &Resolved) -> Result<Coloring, Error> {
        let jacobian = self
            .total_jacobian
            .as_ref()
            .ok_or_else(|| Error::Setup("total jacobian is not linearized".to_owned()))?;

        let pattern = jacobian.pattern();
        let structure = pattern
            .iter()
            .fold(Fingerprint::new().word(pattern.len() as u64), |fp, &(r, c)| {
                fp.word(r as u64).word(c as u64)
            })
            .indices(&of.slots);
        let structure = of
            .scales
            .iter()
            .fold(structure, |fp, scale| fp.word(scale.to_bits()))
            .indices(&wrt.slots)
            .finish();

        let config = &self.options.totals.coloring;
        let signature = Signature::new((of.len(), wrt.len()), structure, config);
        let matrix = jacobian.matrix();
        let coloring = self
            .coloring
            .get_or_compute(&signature, || {
                let pattern = Pattern::detect(of.len(), wrt.len(), config, |rng| sample(matrix, of, wrt, rng))?;
                Coloring::compute(&pattern, config)
            })?
            .clone();
        Ok(coloring)
    }

    pub(crate) fn resolve_of(&self, names: &[&str]) -> Result<Resolved, Error> {
        let mut resolved = Resolved::empty();
        for &name in names {
            let id = self.store.id(name)?;
            if let Some(slots) = self.store.slot_range(id) {
                resolved.push(name, slots, 1.0);
                continue;
            }
            let (unit, var) = split(name)?;
            let link = self
                .links
                .get(&Target::new(unit, var))
                .ok_or_else(|| weft_core::Error::UnknownVariable(name.to_owned()))?;
            let source = self.store.id(&link.source.to_string())?;
            let slots = self
                .store
                .slot_range(source)
                .ok_or_else(|| weft_core::Error::UnknownVariable(link.source.to_string()))?;
            resolved.push(name, slots, link.scale);
        }
        Ok(resolved)
    }

    pub(crate) fn resolve_wrt(&self, names: &[&str]) -> Result<Resolved, Error> {
        let mut resolved = Resolved::empty();
        for &name in names {
            let id = self.store.id(name)?;
            let slots = self
                .store
                .slot_range(id)
                .filter(|_| self.store.kind(id) == VarKind::Input)
                .ok_or_else(|| weft_core::Error::NotIndependent(name.to_owned()))?;
            resolved.push(name, slots, 1.0);
        }
        Ok(resolved)
    }
}

fn solve(
    solver: &mut dyn LinearSolver,
    op: &dyn LinearOperator,
    rhs: &[f64],
    mode: Mode,
) -> Result<Vec<f64>, linear::Error> {
    let LinearSolution {
        status,
        x,
        iters,
        residual_norm,
    } = solver.solve(op, rhs, mode)?;
    if status != linear::Status::Converged {
        warn!(?mode, ?status, iters, residual_norm, "total derivative solve did not converge");
    }
    Ok(x)
}

/// Solves for the dense totals of `of` with respect to `wrt`, one solve
/// per column in forward mode or per row in reverse mode.
pub(crate) fn solve_totals(
    solver: &mut dyn LinearSolver,
    op: &dyn LinearOperator,
    of: &Resolved,
    wrt: &Resolved,
    mode: Mode,
) -> Result<Array2<f64>, linear::Error> {
    let mut values = Array2::zeros((of.len(), wrt.len()));
    let mut rhs = vec![0.0; op.dim()];
    match mode {
        Mode::Fwd => {
            for (j, &slot) in wrt.slots.iter().enumerate() {
                rhs.fill(0.0);
                rhs[slot] = 1.0;
                let x = solve(solver, op, &rhs, mode)?;
                for (i, (&row, &scale)) in of.slots.iter().zip(&of.scales).enumerate() {
                    values[[i, j]] = scale * x[row];
                }
            }
        }
        Mode::Rev => {
            for (i, (&slot, &scale)) in of.slots.iter().zip(&of.scales).enumerate() {
                rhs.fill(0.0);
                rhs[slot] = 1.0;
                let lambda = solve(solver, op, &rhs, mode)?;
                for (j, &col) in wrt.slots.iter().enumerate() {
                    values[[i, j]] = scale * lambda[col];
                }
            }
        }
    }
    Ok(values)
}

/// One dense total Jacobian of a randomized copy of `matrix`.
fn sample(matrix: &CsMat<f64>, of: &Resolved, wrt: &Resolved, rng: &mut StdRng) -> Result<Vec<f64>, linear::Error> {
    let mut randomized = matrix.clone();
    for value in randomized.data_mut() {
        *value = rng.gen_range(1.0..2.0);
    }
    let op = Assembled(&randomized);
    let mut direct = Direct::new();
    direct.setup(&op)?;
    let values = solve_totals(&mut direct, &op, of, wrt, Mode::Fwd)?;
    Ok(values.iter().copied().collect())
}

/// A bare sparse matrix as a linear operator.
pub(crate) struct Assembled<'a>(pub(crate) &'a CsMat<f64>);

impl LinearOperator for Assembled<'_> {
    fn dim(&self) -> usize {
        self.0.rows()
    }

    fn apply(&self, mode: Mode, x: &[f64], y: &mut [f64]) -> Result<(), EvalError> {
        y.fill(0.0);
        for (r, row) in self.0.outer_iterator().enumerate() {
            for (c, &v) in row.iter() {
                match mode {
                    Mode::Fwd => y[r] += v * x[c],
                    Mode::Rev => y[c] += v * x[r],
                }
            }
        }
        Ok(())
    }

    fn assembled(&self) -> Option<&CsMat<f64>> {
        Some(self.0)
    }
}
