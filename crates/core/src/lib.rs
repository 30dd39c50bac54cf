//! Core data model for the Weft framework.
//!
//! This crate defines the pieces every solver and driver builds on:
//!
//! - [`Variable`], [`VariableStore`]: named, shaped, unit-aware values and
//!   the flat storage that backs them
//! - [`ConnectionGraph`]: output-to-input links and the execution order of
//!   units, with coupled cycles grouped into [`Block`]s
//! - [`ExplicitUnit`], [`ImplicitUnit`], [`UnitAdapter`]: the evaluation
//!   contract for units and the wrapper that presents both kinds uniformly
//! - [`Jacobian`], [`MatrixFree`]: the global linearization, assembled or as
//!   a product operator
//! - [`LinearOperator`], [`NonlinearSystem`]: the seams solvers are written
//!   against
//! - [`Observer`]: receives solver events and optionally returns control actions

mod error;
mod graph;
mod jacobian;
mod observer;
pub mod physical;
mod store;
mod system;
mod unit;
mod variable;
mod vector;

pub use error::{Error, EvalError, PartialsError};
pub use graph::{Block, Connection, ConnectionGraph, Source, Target};
pub use jacobian::{Jacobian, Layout, MatrixFree, Route, UnitSlots};
pub use observer::Observer;
pub use store::{VarId, VariableStore};
pub use system::{LinearOperator, Mode, NonlinearSystem};
pub use unit::{
    Capabilities, Column, CsOptions, Declarations, ExplicitUnit, FdForm, FdOptions, ImplicitUnit,
    JacVec, Method, Partial, Partials, Sparsity, StepCalc, SubJac, UnitAdapter, UnitKind, Wrt,
};
pub use variable::{VarKind, Variable};
pub use vector::{VarLayout, Vector, VectorMut};
