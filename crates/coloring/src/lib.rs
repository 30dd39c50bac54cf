//! Sparsity detection and coloring of total-derivative Jacobians.
//!
//! Computing a total Jacobian one column (forward) or one row (reverse) at a
//! time costs one linear solve per column or row. When the Jacobian is
//! sparse, columns with disjoint nonzero rows can be seeded together and
//! separated afterwards, and likewise for rows.
//!
//! The workflow is:
//!
//! 1. [`Pattern::detect`] samples the Jacobian at randomized points and keeps
//!    the entries whose mean magnitude exceeds a tolerance.
//! 2. [`Coloring::compute`] groups columns and/or rows by greedy coloring in
//!    incidence degree order. A [`Direction::Bidirectional`] coloring splits
//!    the matrix into a forward part and a reverse part when that needs fewer
//!    solves than either direction alone.
//! 3. The caller runs one solve per group ([`Coloring::groups`]) and
//!    [`Coloring::recover`] rebuilds the Jacobian from the compressed products.
//!
//! Colorings are tied to a [`Signature`] and can be persisted as JSON; a
//! [`ColoringCache`] reuses one only while the signature matches.

mod cache;
mod coloring;
mod config;
mod error;
mod greedy;
mod pattern;
mod signature;

#[cfg(test)]
mod tests;

pub use cache::ColoringCache;
pub use coloring::{Coloring, Summary};
pub use config::{ColoringConfig, ConfigError, Direction, Recovery};
pub use error::Error;
pub use pattern::Pattern;
pub use signature::{Fingerprint, Signature};
