use std::collections::HashMap;

use crate::PartialsError;

use super::declare::Method;

/// The variable a partial derivative is taken with respect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrt {
    /// Position of an input in the unit's input layout.
    Input(usize),

    /// Position of an output in the unit's output layout.
    Output(usize),
}

/// One declared partial derivative block, stored as coordinate lists.
///
/// Dense blocks enumerate every entry in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubJac {
    pub(crate) of: usize,
    pub(crate) wrt: Wrt,
    pub(crate) of_name: String,
    pub(crate) wrt_name: String,
    pub(crate) shape: (usize, usize),
    pub(crate) rows: Vec<usize>,
    pub(crate) cols: Vec<usize>,
    pub(crate) values: Vec<f64>,
    pub(crate) method: Method,
    pub(crate) constant: bool,
    pub(crate) dense: bool,
}

impl SubJac {
    #[must_use]
    pub fn of_name(&self) -> &str {
        &self.of_name
    }

    #[must_use]
    pub fn wrt_name(&self) -> &str {
        &self.wrt_name
    }

    #[must_use]
    pub fn wrt(&self) -> Wrt {
        self.wrt
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// Returns `(n_of, n_wrt)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Returns `(row, col, value)` for every declared entry.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// Returns `true` if `(row, col)` lies inside the declared structure.
    #[must_use]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.dense || self.rows.iter().zip(&self.cols).any(|(&r, &c)| r == row && c == col)
    }

    /// Returns the block as a row-major dense matrix.
    #[must_use]
    pub fn to_dense(&self) -> Vec<f64> {
        let (n_of, n_wrt) = self.shape;
        let mut dense = vec![0.0; n_of * n_wrt];
        for (r, c, v) in self.entries() {
            dense[r * n_wrt + c] += v;
        }
        dense
    }
}

/// Partial derivative storage for one unit.
///
/// Only declared `(of, wrt)` pairs can be written; anything else is an
/// [`PartialsError::Undeclared`] error rather than a silent drop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partials {
    subjacs: Vec<SubJac>,
    lookup: HashMap<(String, String), usize>,
}

impl Partials {
    pub(crate) fn insert(&mut self, subjac: SubJac) {
        let key = (subjac.of_name.clone(), subjac.wrt_name.clone());
        match self.lookup.get(&key) {
            Some(&i) => self.subjacs[i] = subjac,
            None => {
                self.lookup.insert(key, self.subjacs.len());
                self.subjacs.push(subjac);
            }
        }
    }

    fn index(&self, of: &str, wrt: &str) -> Result<usize, PartialsError> {
        self.lookup
            .get(&(of.to_owned(), wrt.to_owned()))
            .copied()
            .ok_or_else(|| PartialsError::Undeclared {
                of: of.to_owned(),
                wrt: wrt.to_owned(),
            })
    }

    /// Writes the values of a declared block.
    ///
    /// Dense blocks take `n_of * n_wrt` row-major values; sparse blocks take
    /// one value per declared coordinate, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair was not declared or the length is wrong.
    pub fn set(&mut self, of: &str, wrt: &str, values: &[f64]) -> Result<(), PartialsError> {
        let i = self.index(of, wrt)?;
        let subjac = &mut self.subjacs[i];
        if values.len() != subjac.values.len() {
            return Err(PartialsError::Length {
                of: of.to_owned(),
                wrt: wrt.to_owned(),
                expected: subjac.values.len(),
                found: values.len(),
            });
        }
        subjac.values.copy_from_slice(values);
        Ok(())
    }

    /// Returns a mutable view of a declared block's values.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair was not declared.
    pub fn values_mut(&mut self, of: &str, wrt: &str) -> Result<&mut [f64], PartialsError> {
        let i = self.index(of, wrt)?;
        Ok(&mut self.subjacs[i].values)
    }

    /// Returns the values of a declared block.
    #[must_use]
    pub fn get(&self, of: &str, wrt: &str) -> Option<&[f64]> {
        self.index(of, wrt).ok().map(|i| self.subjacs[i].values.as_slice())
    }

    /// Returns a declared block by name.
    #[must_use]
    pub fn subjac(&self, of: &str, wrt: &str) -> Option<&SubJac> {
        self.index(of, wrt).ok().map(|i| &self.subjacs[i])
    }

    /// Returns `true` if the pair was declared.
    #[must_use]
    pub fn is_declared(&self, of: &str, wrt: &str) -> bool {
        self.index(of, wrt).is_ok()
    }

    /// Iterates over all declared blocks.
    pub fn iter(&self) -> impl Iterator<Item = &SubJac> {
        self.subjacs.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut SubJac> {
        self.subjacs.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subjacs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjacs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal() -> SubJac {
        SubJac {
            of: 0,
            wrt: Wrt::Input(0),
            of_name: "y".into(),
            wrt_name: "x".into(),
            shape: (2, 2),
            rows: vec![0, 1],
            cols: vec![0, 1],
            values: vec![0.0, 0.0],
            method: Method::Exact,
            constant: false,
            dense: false,
        }
    }

    #[test]
    fn writes_declared_blocks() {
        let mut partials = Partials::default();
        partials.insert(diagonal());

        partials.set("y", "x", &[2.0, 3.0]).unwrap();

        assert_eq!(partials.get("y", "x"), Some(&[2.0, 3.0][..]));
        assert_eq!(
            partials.subjac("y", "x").unwrap().to_dense(),
            vec![2.0, 0.0, 0.0, 3.0]
        );
    }

    #[test]
    fn rejects_undeclared_pairs() {
        let mut partials = Partials::default();
        partials.insert(diagonal());

        let err = partials.set("y", "z", &[1.0]).unwrap_err();
        assert_eq!(
            err,
            PartialsError::Undeclared {
                of: "y".into(),
                wrt: "z".into()
            }
        );
    }

    #[test]
    fn rejects_wrong_lengths() {
        let mut partials = Partials::default();
        partials.insert(diagonal());

        let err = partials.set("y", "x", &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            PartialsError::Length {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }
}
