use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ColoringConfig, Error};

/// Boolean nonzero structure of a rectangular matrix.
///
/// Entries are stored row by row with sorted, unique column indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    nrows: usize,
    ncols: usize,
    rows: Vec<Vec<usize>>,
}

impl Pattern {
    /// Creates a pattern from `(row, col)` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry lies outside the shape.
    pub fn new(nrows: usize, ncols: usize, entries: impl IntoIterator<Item = (usize, usize)>) -> Result<Self, Error> {
        let mut rows = vec![Vec::new(); nrows];
        for (r, c) in entries {
            if r >= nrows || c >= ncols {
                return Err(Error::OutOfBounds {
                    row: r,
                    col: c,
                    nrows,
                    ncols,
                });
            }
            rows[r].push(c);
        }
        for row in &mut rows {
            row.sort_unstable();
            row.dedup();
        }
        Ok(Self { nrows, ncols, rows })
    }

    /// Marks every entry of a row-major dense matrix whose magnitude exceeds `tol`.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` does not hold `nrows × ncols` entries.
    pub fn from_dense(nrows: usize, ncols: usize, values: &[f64], tol: f64) -> Result<Self, Error> {
        if values.len() != nrows * ncols {
            return Err(Error::Length {
                expected: nrows * ncols,
                found: values.len(),
            });
        }
        let rows = (0..nrows)
            .map(|r| (0..ncols).filter(|&c| values[r * ncols + c].abs() > tol).collect())
            .collect();
        Ok(Self { nrows, ncols, rows })
    }

    /// Detects the pattern by sampling the matrix at randomized points.
    ///
    /// `sample` is called `num_full_jacs` times with a shared seeded
    /// generator and must return the full row-major matrix. An entry is
    /// structural when the mean of its magnitudes across samples exceeds the
    /// configured tolerance, so a value that vanishes at one sample point
    /// does not hide a dependency.
    ///
    /// # Errors
    ///
    /// Returns an error if a sample fails or has the wrong length.
    pub fn detect<F, E>(nrows: usize, ncols: usize, config: &ColoringConfig, mut sample: F) -> Result<Self, Error>
    where
        F: FnMut(&mut StdRng) -> Result<Vec<f64>, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut sums = vec![0.0; nrows * ncols];
        let samples = config.num_full_jacs.max(1);

        for k in 0..samples {
            let values = sample(&mut rng).map_err(|e| Error::Sample(Box::new(e)))?;
            if values.len() != sums.len() {
                return Err(Error::Length {
                    expected: sums.len(),
                    found: values.len(),
                });
            }
            for (sum, v) in sums.iter_mut().zip(&values) {
                *sum += v.abs();
            }
            debug!(sample = k + 1, of = samples, "sparsity sample");
        }

        #[allow(clippy::cast_precision_loss)]
        let scale = 1.0 / samples as f64;
        for sum in &mut sums {
            *sum *= scale;
        }
        Self::from_dense(nrows, ncols, &sums, config.tol)
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    #[must_use]
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Fraction of entries that are structural nonzeros.
    #[must_use]
    pub fn density(&self) -> f64 {
        let size = self.nrows * self.ncols;
        if size == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let density = self.nnz() as f64 / size as f64;
        density
    }

    #[must_use]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.rows.get(row).is_some_and(|cols| cols.binary_search(&col).is_ok())
    }

    /// Returns the sorted column indices of a row.
    #[must_use]
    pub fn row(&self, row: usize) -> &[usize] {
        &self.rows[row]
    }

    /// Iterates over `(row, col)` entries in row-major order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(r, cols)| cols.iter().map(move |&c| (r, c)))
    }

    /// Returns the row indices of each column.
    #[must_use]
    pub fn columns(&self) -> Vec<Vec<usize>> {
        let mut cols = vec![Vec::new(); self.ncols];
        for (r, c) in self.entries() {
            cols[c].push(r);
        }
        cols
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        Self {
            nrows: self.ncols,
            ncols: self.nrows,
            rows: self.columns(),
        }
    }
}
