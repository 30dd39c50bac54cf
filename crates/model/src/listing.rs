use weft_core::{VarKind, Variable};

use crate::Problem;

/// Selects which variables a listing reports.
///
/// An empty filter accepts everything. Tags accept a variable carrying any
/// of them. Include and exclude patterns are matched against both the full
/// `"unit.variable"` name and the name within the unit, with `*` matching
/// any run of characters and `?` any single character.
///
/// ```
/// use weft_model::ListFilter;
///
/// let filter = ListFilter::new().tag("design").exclude("*.z");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    tags: Vec<String>,
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl ListFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.push(pattern.into());
        self
    }

    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    fn accepts(&self, name: &str, meta: &Variable) -> bool {
        let local = name.split_once('.').map_or(name, |(_, v)| v);
        let matches = |pattern: &String| glob(pattern, name) || glob(pattern, local);

        (self.tags.is_empty() || meta.tags().iter().any(|t| self.tags.contains(t)))
            && (self.includes.is_empty() || self.includes.iter().any(matches))
            && !self.excludes.iter().any(matches)
    }
}

/// One variable in a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableEntry {
    pub name: String,
    pub value: Vec<f64>,
    pub units: Option<String>,
    pub tags: Vec<String>,

    /// Residual norm of an output; `None` for inputs.
    pub residual_norm: Option<f64>,
}

impl Problem {
    /// Lists the inputs accepted by `filter`, in declaration order.
    #[must_use]
    pub fn list_inputs(&self, filter: &ListFilter) -> Vec<VariableEntry> {
        self.list(VarKind::Input, filter)
    }

    /// Lists the outputs accepted by `filter` with their residual norms, in
    /// declaration order.
    #[must_use]
    pub fn list_outputs(&self, filter: &ListFilter) -> Vec<VariableEntry> {
        self.list(VarKind::Output, filter)
    }

    fn list(&self, kind: VarKind, filter: &ListFilter) -> Vec<VariableEntry> {
        self.store
            .ids()
            .filter(|&id| self.store.kind(id) == kind)
            .filter_map(|id| {
                let name = self.store.name(id);
                let meta = self.store.meta(id);
                if !filter.accepts(name, meta) {
                    return None;
                }
                let value = self.store.get(name).ok()?.to_vec();
                let residual_norm = match kind {
                    VarKind::Input => None,
                    VarKind::Output => Some(
                        self.store
                            .residual(name)
                            .ok()?
                            .iter()
                            .map(|r| r * r)
                            .sum::<f64>()
                            .sqrt(),
                    ),
                };
                Some(VariableEntry {
                    name: name.to_owned(),
                    value,
                    units: meta.unit_expr().map(str::to_owned),
                    tags: meta.tags().to_vec(),
                    residual_norm,
                })
            })
            .collect()
    }
}

/// Matches `text` against a pattern where `*` is any run and `?` any one character.
fn glob(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    ti = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::glob;

    #[test]
    fn glob_patterns() {
        assert!(glob("a", "a"));
        assert!(!glob("a", "ab"));
        assert!(glob("*", ""));
        assert!(glob("comp?.x", "comp2.x"));
        assert!(glob("*.x", "comp1.x"));
        assert!(glob("c*p*.?", "comp1.x"));
        assert!(!glob("*.y", "comp1.x"));
        assert!(glob("a*b*c", "aXbYbZc"));
    }
}
