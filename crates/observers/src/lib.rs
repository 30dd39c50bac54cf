//! Reusable observers for the Weft framework.
//!
//! Every Weft solver reports progress through an [`Observer`]. This crate
//! provides observers that work across solvers, written against the
//! capability traits in [`traits`]:
//!
//! - [`History`] records the residual norm of every iteration
//! - [`StopBelow`] stops a solver once its residual is small enough
//! - [`StopAfter`] stops a solver after a fixed number of iterations
//! - [`Trace`] logs every event through `tracing`
//!
//! [`Observer`]: weft_core::Observer

mod history;
mod stop;
mod trace;
pub mod traits;

pub use history::{History, Recorder};
pub use stop::{StopAfter, StopBelow};
pub use trace::Trace;
