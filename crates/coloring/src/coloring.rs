use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use weft_core::Mode;

use crate::{
    ColoringConfig, Direction, Error, Pattern, Recovery, Signature,
    greedy::Conflicts,
};

/// Groups of Jacobian columns and rows that can share a linear solve.
///
/// Each forward group is a set of columns seeded together in one forward
/// solve; each reverse group is a set of rows seeded together in one
/// reverse solve. Rows marked as reverse rows are recovered from reverse
/// products, every other entry from forward products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coloring {
    pattern: Pattern,
    fwd: Vec<Vec<usize>>,
    rev: Vec<Vec<usize>>,
    rev_rows: Vec<bool>,
    recovery: Recovery,
    signature: Option<Signature>,
}

/// Solve counts of a coloring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub fwd_solves: usize,
    pub rev_solves: usize,

    /// Solves needed without coloring in the cheaper single direction.
    pub naive_solves: usize,

    pub nnz: usize,
    pub density: f64,
}

impl Summary {
    #[must_use]
    pub fn total_solves(&self) -> usize {
        self.fwd_solves + self.rev_solves
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} fwd + {} rev = {} solves (naive {}), {} nonzeros, density {:.3}",
            self.fwd_solves,
            self.rev_solves,
            self.total_solves(),
            self.naive_solves,
            self.nnz,
            self.density,
        )
    }
}

impl Coloring {
    /// Colors a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn compute(pattern: &Pattern, config: &ColoringConfig) -> Result<Self, Error> {
        config.validate()?;
        let (nrows, _) = pattern.shape();
        let nonempty: Vec<bool> = (0..nrows).map(|r| !pattern.row(r).is_empty()).collect();
        let all_fwd = vec![false; nrows];

        let coloring = match config.direction {
            Direction::Fwd => Self::partition(pattern, all_fwd, Recovery::Direct),
            Direction::Rev => Self::partition(pattern, nonempty, Recovery::Direct),
            Direction::Auto => {
                let fwd = Self::partition(pattern, all_fwd, Recovery::Direct);
                let rev = Self::partition(pattern, nonempty, Recovery::Direct);
                if rev.solves() < fwd.solves() { rev } else { fwd }
            }
            Direction::Bidirectional => {
                // Greedy coloring is not monotone, so substitution also
                // tries the direct split of each candidate.
                let recoveries: &[Recovery] = match config.recovery {
                    Recovery::Direct => &[Recovery::Direct],
                    Recovery::Substitution => &[Recovery::Substitution, Recovery::Direct],
                };
                Self::candidates(pattern)
                    .into_iter()
                    .flat_map(|rev_rows| {
                        recoveries
                            .iter()
                            .map(move |&recovery| Self::partition(pattern, rev_rows.clone(), recovery))
                    })
                    .min_by_key(|c| (c.solves(), c.rev.len()))
                    .unwrap_or_else(|| Self::partition(pattern, vec![false; nrows], config.recovery))
            }
        };

        info!(direction = ?config.direction, summary = %coloring.summary(), "computed coloring");
        Ok(coloring)
    }

    /// Candidate sets of reverse rows for a bidirectional split.
    ///
    /// Dense rows are expensive to color in forward mode, and rows that only
    /// touch dense columns are cheap to leave there, so candidates come from
    /// thresholds on row counts and on the counts of the columns a row touches.
    fn candidates(pattern: &Pattern) -> Vec<Vec<bool>> {
        let (nrows, _) = pattern.shape();
        let row_counts: Vec<usize> = (0..nrows).map(|r| pattern.row(r).len()).collect();
        let col_counts: Vec<usize> = pattern.columns().iter().map(Vec::len).collect();

        let mut candidates = BTreeSet::new();
        candidates.insert(vec![false; nrows]);

        let thresholds: BTreeSet<usize> = row_counts.iter().copied().collect();
        for &t in &thresholds {
            candidates.insert(row_counts.iter().map(|&n| n >= t && n > 0).collect());
        }

        let thresholds: BTreeSet<usize> = col_counts.iter().copied().filter(|&n| n > 0).collect();
        for &s in &thresholds {
            candidates.insert(
                (0..nrows)
                    .map(|r| pattern.row(r).iter().any(|&c| col_counts[c] <= s))
                    .collect(),
            );
        }
        candidates.into_iter().collect()
    }

    /// Colors both sides of the split defined by `rev_rows`.
    fn partition(pattern: &Pattern, rev_rows: Vec<bool>, recovery: Recovery) -> Self {
        let (nrows, ncols) = pattern.shape();

        let mut fwd_conflicts = Conflicts::new(ncols);
        let mut fwd_cols = BTreeSet::new();
        for r in (0..nrows).filter(|&r| !rev_rows[r]) {
            fwd_conflicts.add_clique(pattern.row(r));
            fwd_cols.extend(pattern.row(r).iter().copied());
        }
        let fwd_cols: Vec<usize> = fwd_cols.into_iter().collect();
        let fwd = fwd_conflicts.color(&fwd_cols);

        let mut coloring = Self {
            pattern: pattern.clone(),
            fwd,
            rev: Vec::new(),
            rev_rows,
            recovery,
            signature: None,
        };

        let fwd_color = coloring.fwd_colors();
        let mut rev_conflicts = Conflicts::new(nrows);
        let mut rev_active = BTreeSet::new();
        for (c, rows) in pattern.columns().iter().enumerate() {
            let unknown: Vec<usize> = rows
                .iter()
                .copied()
                .filter(|&r| coloring.rev_rows[r] && !coloring.fwd_known(&fwd_color, r, c))
                .collect();
            rev_conflicts.add_clique(&unknown);
            rev_active.extend(unknown);
        }
        let rev_active: Vec<usize> = rev_active.into_iter().collect();
        coloring.rev = rev_conflicts.color(&rev_active);

        debug!(fwd = coloring.fwd.len(), rev = coloring.rev.len(), "partition colored");
        coloring
    }

    /// Returns the forward color of each column, if any.
    fn fwd_colors(&self) -> Vec<Option<usize>> {
        let (_, ncols) = self.pattern.shape();
        let mut colors = vec![None; ncols];
        for (k, group) in self.fwd.iter().enumerate() {
            for &c in group {
                colors[c] = Some(k);
            }
        }
        colors
    }

    fn rev_colors(&self) -> Vec<Option<usize>> {
        let (nrows, _) = self.pattern.shape();
        let mut colors = vec![None; nrows];
        for (k, group) in self.rev.iter().enumerate() {
            for &r in group {
                colors[r] = Some(k);
            }
        }
        colors
    }

    /// Returns `true` if entry `(row, col)` is read from a forward product.
    fn fwd_known(&self, fwd_color: &[Option<usize>], row: usize, col: usize) -> bool {
        if !self.rev_rows[row] {
            return true;
        }
        if self.recovery == Recovery::Direct {
            return false;
        }
        let Some(color) = fwd_color[col] else {
            return false;
        };
        self.pattern
            .row(row)
            .iter()
            .filter(|&&c| fwd_color[c] == Some(color))
            .count()
            == 1
    }

    fn solves(&self) -> usize {
        self.fwd.len() + self.rev.len()
    }

    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    #[must_use]
    pub fn recovery(&self) -> Recovery {
        self.recovery
    }

    /// Returns the seed groups for one direction: columns for forward
    /// solves, rows for reverse solves.
    #[must_use]
    pub fn groups(&self, mode: Mode) -> &[Vec<usize>] {
        match mode {
            Mode::Fwd => &self.fwd,
            Mode::Rev => &self.rev,
        }
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        let (nrows, ncols) = self.pattern.shape();
        Summary {
            fwd_solves: self.fwd.len(),
            rev_solves: self.rev.len(),
            naive_solves: nrows.min(ncols),
            nnz: self.pattern.nnz(),
            density: self.pattern.density(),
        }
    }

    /// Rebuilds the dense row-major matrix from compressed products.
    ///
    /// `fwd[k]` must be the product of the matrix with the sum of the unit
    /// columns in forward group `k` (one value per row), and `rev[k]` the
    /// product of the transpose with the sum of the unit rows in reverse
    /// group `k` (one value per column). Entries outside the pattern are zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the number or length of the products is wrong.
    pub fn recover(&self, fwd: &[Vec<f64>], rev: &[Vec<f64>]) -> Result<Vec<f64>, Error> {
        let (nrows, ncols) = self.pattern.shape();
        check_products(Mode::Fwd, &self.fwd, fwd, nrows)?;
        check_products(Mode::Rev, &self.rev, rev, ncols)?;

        let fwd_color = self.fwd_colors();
        let rev_color = self.rev_colors();
        let mut values = vec![0.0; nrows * ncols];
        let mut pending = Vec::new();

        for (r, c) in self.pattern.entries() {
            match (self.fwd_known(&fwd_color, r, c), fwd_color[c], rev_color[r]) {
                (true, Some(k), _) => values[r * ncols + c] = fwd[k][r],
                (false, _, Some(k)) => pending.push((r, c, k)),
                _ => {}
            }
        }

        // Reverse entries whose group mates are all forward-known or zero.
        for (r, c, k) in pending {
            let mates: f64 = self.rev[k]
                .iter()
                .filter(|&&m| m != r && self.pattern.contains(m, c))
                .map(|&m| values[m * ncols + c])
                .sum();
            values[r * ncols + c] = rev[k][c] - mates;
        }
        Ok(values)
    }

    /// Attaches the structural signature the coloring was computed for.
    #[must_use]
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Returns `true` if the coloring was computed for `signature`.
    #[must_use]
    pub fn is_valid_for(&self, signature: &Signature) -> bool {
        self.signature.as_ref() == Some(signature)
    }
}

fn check_products(mode: Mode, groups: &[Vec<usize>], products: &[Vec<f64>], len: usize) -> Result<(), Error> {
    if products.len() != groups.len() {
        return Err(Error::Products {
            mode,
            expected: groups.len(),
            found: products.len(),
        });
    }
    match products.iter().find(|p| p.len() != len) {
        Some(p) => Err(Error::Length {
            expected: len,
            found: p.len(),
        }),
        None => Ok(()),
    }
}
