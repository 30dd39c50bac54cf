use thiserror::Error;

use crate::physical::UnitsError;

/// Structural and bookkeeping errors raised while building or querying a model.
///
/// These are detected eagerly (at declaration, connection, or setup time) and
/// are always fatal.
#[derive(Debug, Error)]
pub enum Error {
    #[error("shape mismatch for '{name}': expected {expected} values, found {found}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Units(#[from] UnitsError),

    #[error("input '{target}' is already connected to '{existing}', cannot connect '{source_name}'")]
    DuplicateConnection {
        target: String,
        existing: String,
        source_name: String,
    },

    #[error("no variable named '{0}'")]
    UnknownVariable(String),

    #[error("no unit named '{0}'")]
    UnknownUnit(String),

    #[error("unit '{0}' is declared more than once")]
    DuplicateUnit(String),

    #[error("variable '{0}' is declared more than once")]
    DuplicateVariable(String),

    #[error("invalid partial declaration in '{unit}' for ({of}, {wrt}): {reason}")]
    InvalidPartial {
        unit: String,
        of: String,
        wrt: String,
        reason: String,
    },

    #[error("unit '{0}' requested complex step but cannot evaluate with complex values")]
    ComplexStepUnsupported(String),

    #[error("'{0}' is not an independent variable")]
    NotIndependent(String),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Errors raised by a unit while evaluating or linearizing.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The unit cannot be evaluated at the current point.
    ///
    /// Nonlinear solvers with a line search treat this as a signal to
    /// backtrack rather than fail.
    #[error("analysis error in '{unit}': {message}")]
    Analysis { unit: String, message: String },

    #[error("evaluation failed in '{unit}': {source}")]
    Fatal {
        unit: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Partials(#[from] PartialsError),

    #[error("unit '{unit}' has a nonzero derivative of '{of}' with respect to '{wrt}' at ({row}, {col}) outside its declared sparsity")]
    UndeclaredNonzero {
        unit: String,
        of: String,
        wrt: String,
        row: usize,
        col: usize,
    },

    #[error("unit '{unit}' does not support {capability}")]
    Unsupported {
        unit: String,
        capability: &'static str,
    },
}

impl EvalError {
    /// Creates an analysis error, which solvers may recover from.
    ///
    /// The owning unit's name is filled in by the adapter.
    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis {
            unit: String::new(),
            message: message.into(),
        }
    }

    /// Wraps an arbitrary error as a fatal evaluation failure.
    pub fn fatal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Fatal {
            unit: String::new(),
            source: Box::new(source),
        }
    }

    /// Creates the error returned by capability methods a unit does not provide.
    #[must_use]
    pub fn unsupported(capability: &'static str) -> Self {
        Self::Unsupported {
            unit: String::new(),
            capability,
        }
    }

    /// Returns `true` if a solver may backtrack instead of failing.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Analysis { .. })
    }

    /// Fills in the unit name for errors raised without one.
    #[must_use]
    pub fn in_unit(self, name: &str) -> Self {
        match self {
            Self::Analysis { unit, message } if unit.is_empty() => Self::Analysis {
                unit: name.to_owned(),
                message,
            },
            Self::Fatal { unit, source } if unit.is_empty() => Self::Fatal {
                unit: name.to_owned(),
                source,
            },
            Self::Unsupported { unit, capability } if unit.is_empty() => Self::Unsupported {
                unit: name.to_owned(),
                capability,
            },
            other => other,
        }
    }
}

/// Errors raised when writing partial derivatives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartialsError {
    #[error("partial ({of}, {wrt}) was not declared")]
    Undeclared { of: String, wrt: String },

    #[error("partial ({of}, {wrt}) expects {expected} values, found {found}")]
    Length {
        of: String,
        wrt: String,
        expected: usize,
        found: usize,
    },
}
