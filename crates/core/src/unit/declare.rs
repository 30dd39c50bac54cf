use serde::{Deserialize, Serialize};

use crate::Variable;

/// Finite-difference formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FdForm {
    #[default]
    Forward,
    Backward,
    Central,
}

/// How a finite-difference step is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepCalc {
    /// Use the step as given.
    #[default]
    Abs,

    /// Multiply the step by the magnitude of the perturbed entry.
    Rel,
}

/// Options for finite-difference approximation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FdOptions {
    pub form: FdForm,
    pub step: f64,
    pub step_calc: StepCalc,
}

impl Default for FdOptions {
    fn default() -> Self {
        Self {
            form: FdForm::Forward,
            step: 1e-6,
            step_calc: StepCalc::Abs,
        }
    }
}

impl FdOptions {
    /// Returns the step to use when perturbing an entry with value `x`.
    #[must_use]
    pub fn step_for(&self, x: f64) -> f64 {
        match self.step_calc {
            StepCalc::Abs => self.step,
            StepCalc::Rel if x == 0.0 => self.step,
            StepCalc::Rel => self.step * x.abs(),
        }
    }
}

/// Options for complex-step approximation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsOptions {
    pub step: f64,
}

impl Default for CsOptions {
    fn default() -> Self {
        Self { step: 1e-40 }
    }
}

/// How a partial derivative's values are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "method")]
pub enum Method {
    /// Written by the unit's own linearization.
    #[default]
    Exact,
    Fd(FdOptions),
    Cs(CsOptions),
}

impl Method {
    /// Forward finite difference with default options.
    #[must_use]
    pub fn fd() -> Self {
        Self::Fd(FdOptions::default())
    }

    /// Complex step with default options.
    #[must_use]
    pub fn cs() -> Self {
        Self::Cs(CsOptions::default())
    }

    #[must_use]
    pub fn is_approximated(&self) -> bool {
        !matches!(self, Self::Exact)
    }
}

/// Declared nonzero structure of one partial derivative block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Sparsity {
    /// Every entry may be nonzero; values are row-major.
    #[default]
    Dense,

    /// Only the listed `(rows[k], cols[k])` entries may be nonzero.
    Sparse { rows: Vec<usize>, cols: Vec<usize> },
}

/// A partial derivative declaration.
///
/// ```
/// use weft_core::{Method, Partial};
///
/// // Diagonal block whose values never change.
/// let identity = Partial::sparse(vec![0, 1, 2], vec![0, 1, 2]).constant(&[1.0]);
///
/// // Dense block approximated by central differences.
/// let approximated = Partial::dense().method(Method::fd());
/// # let _ = (identity, approximated);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Partial {
    pub(crate) sparsity: Sparsity,
    pub(crate) constant: Option<Vec<f64>>,
    pub(crate) method: Method,
}

impl Partial {
    /// Declares a dense block computed by the unit.
    #[must_use]
    pub fn dense() -> Self {
        Self::default()
    }

    /// Declares a sparse block with the given nonzero coordinates.
    #[must_use]
    pub fn sparse(rows: Vec<usize>, cols: Vec<usize>) -> Self {
        Self {
            sparsity: Sparsity::Sparse { rows, cols },
            ..Self::default()
        }
    }

    /// Fixes the values at declaration time.
    ///
    /// A single value is broadcast across every declared entry.
    #[must_use]
    pub fn constant(mut self, values: &[f64]) -> Self {
        self.constant = Some(values.to_vec());
        self
    }

    /// Sets how values are obtained.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Everything a unit declares during setup.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
    pub(crate) partials: Vec<(String, String, Partial)>,
}

impl Declarations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, var: Variable) -> &mut Self {
        self.inputs.push(var);
        self
    }

    pub fn add_output(&mut self, var: Variable) -> &mut Self {
        self.outputs.push(var);
        self
    }

    /// Declares the derivative of `of` with respect to `wrt`.
    ///
    /// Either name may be `"*"` to match every eligible variable. Later
    /// declarations replace earlier ones for the same pair.
    pub fn declare_partials(
        &mut self,
        of: impl Into<String>,
        wrt: impl Into<String>,
        partial: Partial,
    ) -> &mut Self {
        self.partials.push((of.into(), wrt.into(), partial));
        self
    }
}
