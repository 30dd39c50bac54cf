use std::ops::Range;

use faer::{Mat, prelude::*, solvers::PartialPivLu};
use weft_core::{LinearOperator, Mode};

use super::Error;

/// Pivots at or below this multiple of `n * ε * max|A|` mark the matrix as
/// numerically singular.
const PIVOT_FACTOR: f64 = 64.0;

/// LU factors of a dense square matrix.
///
/// Reverse mode solves with the transpose of the same factors.
pub(crate) struct DenseLu {
    n: usize,
    singular: bool,
    factors: Option<PartialPivLu<f64>>,
}

impl std::fmt::Debug for DenseLu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseLu")
            .field("n", &self.n)
            .field("singular", &self.singular)
            .finish_non_exhaustive()
    }
}

impl DenseLu {
    /// Factors the row-major `n × n` matrix in `values`.
    pub(crate) fn new(values: &[f64], n: usize) -> Self {
        let empty_row = (0..n).any(|i| values[i * n..(i + 1) * n].iter().all(|&v| v == 0.0));
        let empty_col = (0..n).any(|j| (0..n).all(|i| values[i * n + j] == 0.0));

        let factors = (n > 0).then(|| PartialPivLu::new(Mat::from_fn(n, n, |i, j| values[i * n + j]).as_ref()));
        let tiny_pivot = factors.as_ref().is_some_and(|lu| {
            let scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            #[allow(clippy::cast_precision_loss)]
            let threshold = PIVOT_FACTOR * n as f64 * f64::EPSILON * scale;
            let u = lu.compute_u();
            (0..n).any(|i| {
                let pivot = u.read(i, i).abs();
                pivot.is_nan() || pivot <= threshold
            })
        });

        Self {
            n,
            singular: empty_row || empty_col || tiny_pivot,
            factors,
        }
    }

    pub(crate) fn dim(&self) -> usize {
        self.n
    }

    pub(crate) fn is_singular(&self) -> bool {
        self.singular
    }

    /// Solves `A x = b` in forward mode or `Aᵀ x = b` in reverse mode.
    pub(crate) fn solve(&self, rhs: &[f64], mode: Mode) -> Result<Vec<f64>, Error> {
        if rhs.len() != self.n {
            return Err(Error::DimensionMismatch {
                expected: self.n,
                found: rhs.len(),
            });
        }
        if self.singular {
            return Err(Error::SingularJacobian);
        }
        let Some(lu) = &self.factors else {
            return Ok(Vec::new());
        };

        let b = Mat::from_fn(self.n, 1, |i, _| rhs[i]);
        let sol = match mode {
            Mode::Fwd => lu.solve(&b),
            Mode::Rev => lu.solve_transpose(&b),
        };
        let x: Vec<f64> = (0..self.n).map(|i| sol.read(i, 0)).collect();

        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularJacobian);
        }
        Ok(x)
    }
}

/// Extracts the diagonal block `range × range` of an operator, row-major.
///
/// Reads the assembled matrix when there is one and probes the operator
/// column by column otherwise.
pub(crate) fn dense_block(op: &dyn LinearOperator, range: Range<usize>) -> Result<Vec<f64>, Error> {
    let n = range.len();
    let mut values = vec![0.0; n * n];

    if let Some(matrix) = op.assembled() {
        let csr = matrix.is_csr();
        for (outer, vec) in matrix.outer_iterator().enumerate() {
            for (inner, &v) in vec.iter() {
                let (r, c) = if csr { (outer, inner) } else { (inner, outer) };
                if range.contains(&r) && range.contains(&c) {
                    values[(r - range.start) * n + (c - range.start)] += v;
                }
            }
        }
        return Ok(values);
    }

    let dim = op.dim();
    let mut x = vec![0.0; dim];
    let mut y = vec![0.0; dim];
    for (j, col) in range.clone().enumerate() {
        x[col] = 1.0;
        op.apply(Mode::Fwd, &x, &mut y)?;
        x[col] = 0.0;
        for (i, row) in range.clone().enumerate() {
            values[i * n + j] = y[row];
        }
    }
    Ok(values)
}
