use std::{collections::BTreeMap, fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use weft_coloring::ColoringConfig;
use weft_solvers::{linear::LinearSolverConfig, nonlinear::NonlinearSolverConfig};

use crate::Error;

/// Solvers for one block of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockSolverOptions {
    pub nonlinear: NonlinearSolverConfig,
    pub linear: LinearSolverConfig,

    /// Keep an assembled Jacobian for the block. When `false`, linear
    /// solvers see a matrix-free operator built from unit products.
    pub assemble_jac: bool,
}

impl Default for BlockSolverOptions {
    fn default() -> Self {
        Self {
            nonlinear: NonlinearSolverConfig::default(),
            linear: LinearSolverConfig::default(),
            assemble_jac: true,
        }
    }
}

impl BlockSolverOptions {
    /// Newton with a direct linear solver and default settings.
    #[must_use]
    pub fn newton() -> Self {
        Self {
            nonlinear: NonlinearSolverConfig::Newton(Default::default()),
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns an error if either solver's options are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        self.nonlinear.validate()?;
        self.linear.validate()?;
        Ok(())
    }
}

/// How total derivatives are computed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalsOptions {
    /// Solver for the linear systems of the whole model.
    pub linear: LinearSolverConfig,

    /// Used by colored total derivative computations.
    pub coloring: ColoringConfig,

    /// Where to persist the coloring between runs.
    pub coloring_file: Option<PathBuf>,
}

/// Every solver setting of a model, loadable from TOML or JSON.
///
/// ```toml
/// strict_partials = 1e-8
///
/// [root.nonlinear]
/// type = "newton"
/// maxiter = 20
///
/// [root.nonlinear.line_search]
/// bound_enforcement = "wall"
///
/// [blocks.cycle.linear]
/// type = "gmres"
///
/// [totals.coloring]
/// direction = "bidirectional"
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Converges the whole model as one block with these solvers.
    pub root: Option<BlockSolverOptions>,

    /// Per-block solvers, keyed by the name of any unit in the block.
    pub blocks: BTreeMap<String, BlockSolverOptions>,

    pub totals: TotalsOptions,

    /// Tolerance for the strict partials check; off when unset.
    pub strict_partials: Option<f64>,
}

impl SolverOptions {
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for these options.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let options: Self = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON for these options.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a `.json` file, or TOML for any other extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_toml(&text),
        }
    }

    /// # Errors
    ///
    /// Returns an error if any solver or coloring option is invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(root) = &self.root {
            root.validate()?;
        }
        for block in self.blocks.values() {
            block.validate()?;
        }
        self.totals.linear.validate()?;
        self.totals
            .coloring
            .validate()
            .map_err(weft_coloring::Error::from)?;
        if let Some(tol) = self.strict_partials {
            if !tol.is_finite() || tol < 0.0 {
                return Err(Error::Setup(format!(
                    "strict_partials must be finite and non-negative, got {tol}"
                )));
            }
        }
        Ok(())
    }
}
