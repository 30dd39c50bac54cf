use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when validating a coloring config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tol must be finite and non-negative")]
    Tolerance,

    #[error("num_full_jacs must be at least 1")]
    Samples,
}

/// Which products a coloring may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Color columns only, recovering everything from forward solves.
    Fwd,

    /// Color rows only, recovering everything from reverse solves.
    Rev,

    /// The cheaper of `Fwd` and `Rev`.
    #[default]
    Auto,

    /// Split the matrix into a forward-colored and a reverse-colored part.
    Bidirectional,
}

/// How bidirectional colorings recover entries covered by both directions.
///
/// `Substitution` can need fewer solves than `Direct`, but recovers some
/// reverse entries by subtracting forward-recovered values from a compressed
/// product, which adds round-off error proportional to the magnitude of the
/// subtracted entries. Use it only when that error is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Every entry is read from a single compressed product.
    #[default]
    Direct,

    /// Reverse entries may be recovered by subtracting known values.
    Substitution,
}

/// Configuration for sparsity detection and coloring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColoringConfig {
    pub direction: Direction,
    pub recovery: Recovery,

    /// Mean magnitude at or below which a sampled entry is a structural zero.
    pub tol: f64,

    /// Number of randomized full Jacobians used to detect the sparsity.
    pub num_full_jacs: usize,

    /// Seed for the sampling generator.
    pub seed: u64,
}

impl Default for ColoringConfig {
    fn default() -> Self {
        Self {
            direction: Direction::default(),
            recovery: Recovery::default(),
            tol: 1e-25,
            num_full_jacs: 3,
            seed: 11,
        }
    }
}

impl ColoringConfig {
    /// # Errors
    ///
    /// Returns an error if `tol` is negative or non-finite, or if
    /// `num_full_jacs` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(ConfigError::Tolerance);
        }
        if self.num_full_jacs == 0 {
            return Err(ConfigError::Samples);
        }
        Ok(())
    }
}
