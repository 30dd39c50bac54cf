//! Global Jacobian assembly from unit partials and connection routes.
//!
//! The Jacobian is square over a contiguous range of slots. Row `i` is the
//! residual of slot `i`; column `j` is the sensitivity to slot `j`. A unit's
//! entries with respect to its own outputs land on its own slots, and entries
//! with respect to an input land on the slot that feeds it, scaled by the unit
//! conversion factor. Entries whose column falls outside the range belong to
//! quantities held fixed during a block solve and are left out.
//!
//! Two equivalent representations are provided:
//!
//! - [`Jacobian`], an assembled CSR matrix whose structure is fixed at
//!   construction and whose values are refreshed in place.
//! - [`MatrixFree`], which forms products by asking each unit for its local
//!   Jacobian-vector product.

mod layout;
mod matrix_free;

#[cfg(test)]
mod tests;

pub use layout::{Layout, Route, UnitSlots};
pub use matrix_free::MatrixFree;

use std::ops::Range;

use sprs::{CsMat, TriMat};
use tracing::trace;

use crate::{EvalError, LinearOperator, Mode, unit::Column, UnitAdapter};

/// An assembled sparse Jacobian over a range of slots.
#[derive(Debug, Clone)]
pub struct Jacobian {
    range: Range<usize>,
    unit_ids: Vec<usize>,
    matrix: CsMat<f64>,
    positions: Vec<Option<usize>>,
    identity: Vec<usize>,
}

impl Jacobian {
    /// Builds the structure for `unit_ids` over `range` and fills in values.
    ///
    /// The structure is the union of every unit's declared entries composed
    /// with the connection routes, plus the identity on independent slots.
    #[must_use]
    pub fn new(layout: &Layout, units: &[UnitAdapter], unit_ids: Vec<usize>, range: Range<usize>) -> Self {
        let dim = range.len();
        let mut triplets = TriMat::new((dim, dim));
        let mut coordinates = Vec::new();
        visit(layout, units, &unit_ids, &range, |entry, _| {
            coordinates.push(entry);
            if let Some((r, c)) = entry {
                triplets.add_triplet(r, c, 1.0);
            }
        });

        let identity_coords: Vec<usize> = layout
            .independents()
            .iter()
            .flat_map(Clone::clone)
            .filter(|s| range.contains(s))
            .map(|s| s - range.start)
            .collect();
        for &i in &identity_coords {
            triplets.add_triplet(i, i, 1.0);
        }

        let mut matrix: CsMat<f64> = triplets.to_csr();
        let position = |m: &CsMat<f64>, r: usize, c: usize| m.nnz_index(r, c).map(|idx| idx.0);
        let positions = coordinates
            .iter()
            .map(|entry| entry.and_then(|(r, c)| position(&matrix, r, c)))
            .collect();
        let identity = identity_coords
            .iter()
            .filter_map(|&i| position(&matrix, i, i))
            .collect();
        matrix.data_mut().fill(0.0);

        let mut jacobian = Self {
            range,
            unit_ids,
            matrix,
            positions,
            identity,
        };
        jacobian.refresh(layout, units);
        jacobian
    }

    /// Rewrites every value from the units' current partials.
    ///
    /// The structure is untouched.
    pub fn refresh(&mut self, layout: &Layout, units: &[UnitAdapter]) {
        let data = self.matrix.data_mut();
        data.fill(0.0);
        for &p in &self.identity {
            data[p] += 1.0;
        }

        let positions = &self.positions;
        let mut k = 0;
        visit(layout, units, &self.unit_ids, &self.range, |_, value| {
            if let Some(Some(p)) = positions.get(k) {
                data[*p] += value;
            }
            k += 1;
        });
        trace!(nnz = data.len(), "refreshed jacobian");
    }

    /// Returns the assembled matrix, indexed relative to the slot range.
    #[must_use]
    pub fn matrix(&self) -> &CsMat<f64> {
        &self.matrix
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Returns the structural nonzeros as sorted `(row, col)` pairs.
    #[must_use]
    pub fn pattern(&self) -> Vec<(usize, usize)> {
        let mut pattern = Vec::with_capacity(self.matrix.nnz());
        for (r, row) in self.matrix.outer_iterator().enumerate() {
            for (c, _) in row.iter() {
                pattern.push((r, c));
            }
        }
        pattern
    }

    /// Overwrites `y` with `J x` or `Jᵀ x`.
    pub fn product(&self, mode: Mode, x: &[f64], y: &mut [f64]) {
        y.fill(0.0);
        for (r, row) in self.matrix.outer_iterator().enumerate() {
            for (c, &v) in row.iter() {
                match mode {
                    Mode::Fwd => y[r] += v * x[c],
                    Mode::Rev => y[c] += v * x[r],
                }
            }
        }
    }
}

impl LinearOperator for Jacobian {
    fn dim(&self) -> usize {
        self.range.len()
    }

    fn apply(&self, mode: Mode, x: &[f64], y: &mut [f64]) -> Result<(), EvalError> {
        self.product(mode, x, y);
        Ok(())
    }

    fn assembled(&self) -> Option<&CsMat<f64>> {
        Some(&self.matrix)
    }
}

/// Visits every unit entry as `(coordinate, value)`.
///
/// `coordinate` is `None` when the column lies outside `range`. The order
/// depends only on declarations, so structure and refresh passes line up.
fn visit(
    layout: &Layout,
    units: &[UnitAdapter],
    unit_ids: &[usize],
    range: &Range<usize>,
    mut f: impl FnMut(Option<(usize, usize)>, f64),
) {
    for &u in unit_ids {
        let slots = layout.unit(u);
        units[u].for_each_entry(|r, column, value| {
            let row = slots.outputs.start + r;
            let (col, scale) = match column {
                Column::Output(c) => (slots.outputs.start + c, 1.0),
                Column::Input(c) => (slots.routes[c].slot, slots.routes[c].scale),
            };
            let coordinate = (range.contains(&row) && range.contains(&col))
                .then(|| (row - range.start, col - range.start));
            f(coordinate, value * scale);
        });
    }
}
