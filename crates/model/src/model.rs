use std::collections::HashMap;

use tracing::{debug, warn};
use weft_core::{
    ConnectionGraph, ExplicitUnit, ImplicitUnit, Source, Target, UnitAdapter, Variable, physical,
};

use crate::{BlockSolverOptions, Error, SolverOptions};

/// A resolved connection with its unit conversion, `input = scale * output + offset`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Link {
    pub(crate) source: Source,
    pub(crate) scale: f64,
    pub(crate) offset: f64,
}

/// Builds a model from units and connections.
///
/// Variables are addressed as `"unit.variable"`. Connections are checked as
/// they are made: both ends must exist, sizes must agree, and declared units
/// must be convertible. Call [`Model::setup`] to get a runnable
/// [`Problem`](crate::Problem).
///
/// ```
/// use weft_core::{Declarations, EvalError, ExplicitUnit, Variable, Vector, VectorMut};
/// use weft_model::Model;
///
/// struct Double;
///
/// impl ExplicitUnit for Double {
///     fn declare(&self, decl: &mut Declarations) {
///         decl.add_input(Variable::new("x")).add_output(Variable::new("y"));
///     }
///
///     fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
///         outputs.set("y", 2.0 * inputs.value("x"));
///         Ok(())
///     }
/// }
///
/// let mut model = Model::new();
/// model.add_explicit("a", Double)?.add_explicit("b", Double)?;
/// model.connect("a.y", "b.x")?;
///
/// let mut problem = model.setup()?;
/// problem.set("a.x", &[3.0])?;
/// problem.run_model()?;
/// assert_eq!(problem.get("b.y")?, &[12.0]);
/// # Ok::<(), weft_model::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Model {
    pub(crate) units: Vec<UnitAdapter>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) graph: ConnectionGraph,
    pub(crate) links: HashMap<Target, Link>,
    pub(crate) options: SolverOptions,
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an explicit unit under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or the unit's declarations are invalid.
    pub fn add_explicit(&mut self, name: &str, unit: impl ExplicitUnit + 'static) -> Result<&mut Self, Error> {
        self.add_unit(UnitAdapter::explicit(name, unit)?)
    }

    /// Adds an implicit unit under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or the unit's declarations are invalid.
    pub fn add_implicit(&mut self, name: &str, unit: impl ImplicitUnit + 'static) -> Result<&mut Self, Error> {
        self.add_unit(UnitAdapter::implicit(name, unit)?)
    }

    /// Adds an already wrapped unit.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit with the same name exists or the name
    /// contains a `.`.
    pub fn add_unit(&mut self, unit: UnitAdapter) -> Result<&mut Self, Error> {
        let name = unit.name().to_owned();
        if self.index.contains_key(&name) {
            return Err(weft_core::Error::DuplicateUnit(name).into());
        }
        if name.is_empty() || name.contains('.') {
            return Err(Error::Setup(format!("invalid unit name '{name}'")));
        }
        self.graph
            .add_unit(&name, unit.input_layout().names().map(str::to_owned));
        self.index.insert(name, self.units.len());
        self.units.push(unit);
        Ok(self)
    }

    /// Connects an output to an input, as `"unit.output"` and `"unit.input"`.
    ///
    /// When both variables declare units, values are converted on transfer.
    /// When only one side does, the value is passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if either end does not exist, the sizes differ, the
    /// units are incompatible, or the input already has a source.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<&mut Self, Error> {
        let (src_unit, src_var) = self.output(source)?;
        let (tgt_unit, tgt_var) = self.input(target)?;

        if src_var.size() != tgt_var.size() {
            return Err(weft_core::Error::ShapeMismatch {
                name: target.to_owned(),
                expected: tgt_var.size(),
                found: src_var.size(),
            }
            .into());
        }

        let (scale, offset) = match (src_var.unit_expr(), tgt_var.unit_expr()) {
            (Some(from), Some(to)) => physical::conversion(from, to).map_err(weft_core::Error::from)?,
            (Some(_), None) | (None, Some(_)) => {
                warn!(source, target, "connecting a variable with units to one without");
                (1.0, 0.0)
            }
            (None, None) => (1.0, 0.0),
        };

        let source_end = Source::new(src_unit, src_var.name());
        let target_end = Target::new(tgt_unit, tgt_var.name());
        self.graph
            .add_connection(source_end.clone(), target_end.clone())?;
        debug!(source, target, scale, offset, "connected");
        self.links.insert(
            target_end,
            Link {
                source: source_end,
                scale,
                offset,
            },
        );
        Ok(self)
    }

    /// Sets the solvers for the block containing `unit`.
    pub fn set_solver(&mut self, unit: &str, options: BlockSolverOptions) -> &mut Self {
        self.options.blocks.insert(unit.to_owned(), options);
        self
    }

    /// Converges the whole model as a single block with these solvers.
    pub fn set_root_solver(&mut self, options: BlockSolverOptions) -> &mut Self {
        self.options.root = Some(options);
        self
    }

    /// Replaces every solver setting.
    pub fn set_options(&mut self, options: SolverOptions) -> &mut Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    #[must_use]
    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    /// Returns every input without a source, as `"unit.input"`.
    ///
    /// These keep their default values and become the model's independent
    /// variables.
    #[must_use]
    pub fn unconnected_inputs(&self) -> Vec<String> {
        self.graph.validate().iter().map(ToString::to_string).collect()
    }

    fn unit<'p>(&self, path: &'p str) -> Result<(&'p str, &UnitAdapter, &'p str), Error> {
        let (unit, var) = split(path)?;
        let index = self
            .index
            .get(unit)
            .ok_or_else(|| weft_core::Error::UnknownUnit(unit.to_owned()))?;
        Ok((unit, &self.units[*index], var))
    }

    fn output<'p>(&self, path: &'p str) -> Result<(&'p str, &Variable), Error> {
        let (name, unit, var) = self.unit(path)?;
        let position = unit
            .output_layout()
            .position(var)
            .ok_or_else(|| weft_core::Error::UnknownVariable(path.to_owned()))?;
        Ok((name, &unit.output_vars()[position]))
    }

    fn input<'p>(&self, path: &'p str) -> Result<(&'p str, &Variable), Error> {
        let (name, unit, var) = self.unit(path)?;
        let position = unit
            .input_layout()
            .position(var)
            .ok_or_else(|| weft_core::Error::UnknownVariable(path.to_owned()))?;
        Ok((name, &unit.input_vars()[position]))
    }
}

/// Splits `"unit.variable"` at the first `.`.
pub(crate) fn split(path: &str) -> Result<(&str, &str), Error> {
    path.split_once('.')
        .filter(|(unit, var)| !unit.is_empty() && !var.is_empty())
        .ok_or_else(|| weft_core::Error::UnknownVariable(path.to_owned()).into())
}
