//! Model assembly, nonlinear runs, and total derivatives.
//!
//! A [`Model`] collects units and the connections between them. Calling
//! [`Model::setup`] lays out every variable and groups the units into solver
//! blocks, producing a [`Problem`] that can be run and differentiated:
//!
//! - [`Problem::run_model`] converges each block in execution order
//! - [`Problem::compute_totals`] solves the linear system of the whole model
//!   in forward or reverse mode
//! - [`Problem::compute_totals_colored`] does the same with fewer solves when
//!   the total Jacobian is sparse
//! - [`Problem::check_partials`] and [`Problem::check_totals`] compare
//!   analytic derivatives against numerical ones
//! - [`Problem::list_inputs`], [`Problem::list_outputs`] and
//!   [`Problem::list_residuals`] report variables after a run
//!
//! Solvers are chosen per block through [`SolverOptions`], which can be
//! built in code or loaded from TOML or JSON.

mod block;
mod check;
mod error;
mod listing;
mod model;
mod options;
mod problem;
mod setup;
mod totals;


pub use check::{PartialCheck, TotalCheck};
pub use error::Error;
pub use listing::{ListFilter, VariableEntry};
pub use model::Model;
pub use options::{BlockSolverOptions, SolverOptions, TotalsOptions};
pub use problem::{BlockReport, Problem, ResidualEntry, RunReport};
pub use totals::Totals;
