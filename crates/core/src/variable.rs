use serde::{Deserialize, Serialize};

/// Whether a variable is read by a unit or produced by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarKind {
    Input,
    Output,
}

/// Declared metadata for one input or output of a unit.
///
/// Built with chained setters:
///
/// ```
/// use weft_core::Variable;
///
/// let z = Variable::new("z").shape(&[2]).units("m").value(&[1.0, 2.0]).lower(0.0);
/// assert_eq!(z.size(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    shape: Vec<usize>,
    units: Option<String>,
    value: Vec<f64>,
    lower: Option<f64>,
    upper: Option<f64>,
    #[serde(default)]
    tags: Vec<String>,
}

impl Variable {
    /// Creates a scalar variable with value `1.0` and no units or bounds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: vec![1],
            units: None,
            value: vec![1.0],
            lower: None,
            upper: None,
            tags: Vec::new(),
        }
    }

    /// Sets the shape, resetting the default value to ones.
    #[must_use]
    pub fn shape(mut self, shape: &[usize]) -> Self {
        self.shape = shape.to_vec();
        self.value = vec![1.0; self.size()];
        self
    }

    /// Sets the physical units.
    #[must_use]
    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Sets the default value.
    ///
    /// A single value is broadcast across the variable's shape.
    #[must_use]
    pub fn value(mut self, value: &[f64]) -> Self {
        self.value = if value.len() == 1 {
            vec![value[0]; self.size()]
        } else {
            value.to_vec()
        };
        self
    }

    /// Sets a lower bound applied to every entry during nonlinear solves.
    #[must_use]
    pub fn lower(mut self, lower: f64) -> Self {
        self.lower = Some(lower);
        self
    }

    /// Sets an upper bound applied to every entry during nonlinear solves.
    #[must_use]
    pub fn upper(mut self, upper: f64) -> Self {
        self.upper = Some(upper);
        self
    }

    /// Adds a tag used to filter variable listings.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of scalar entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    #[must_use]
    pub fn unit_expr(&self) -> Option<&str> {
        self.units.as_deref()
    }

    #[must_use]
    pub fn default_value(&self) -> &[f64] {
        &self.value
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the `(lower, upper)` bounds, infinite when unset.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64) {
        (
            self.lower.unwrap_or(f64::NEG_INFINITY),
            self.upper.unwrap_or(f64::INFINITY),
        )
    }
}
