use std::{collections::HashMap, ops::Range};

use crate::{Error, VarKind, Variable, physical};

/// Handle to a variable registered in a [`VariableStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    kind: VarKind,
    meta: Variable,
    input_range: Option<Range<usize>>,
    slot_range: Option<Range<usize>>,
}

/// Holds the numeric values of every variable, keyed by hierarchical name.
///
/// Values live in three flat buffers:
///
/// - **slots**: every output, plus each independent input, in registration
///   order. These are the unknowns and design variables of the linear system.
/// - **residuals**: one entry per slot.
/// - **inputs**: every input, as last transferred from its source.
///
/// Mutation is always local to the named buffer; nothing is broadcast across
/// units until the owner runs a transfer.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    entries: Vec<Entry>,
    index: HashMap<String, VarId>,
    slots: Vec<f64>,
    residuals: Vec<f64>,
    inputs: Vec<f64>,
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, entry: Entry) -> Result<VarId, Error> {
        if self.index.contains_key(&entry.name) {
            return Err(Error::DuplicateVariable(entry.name));
        }
        let id = VarId(self.entries.len());
        self.index.insert(entry.name.clone(), id);
        self.entries.push(entry);
        Ok(id)
    }

    /// Registers an output, allocating its slots and initial value.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn add_output(&mut self, name: impl Into<String>, meta: &Variable) -> Result<VarId, Error> {
        let start = self.slots.len();
        let id = self.register(Entry {
            name: name.into(),
            kind: VarKind::Output,
            meta: meta.clone(),
            input_range: None,
            slot_range: Some(start..start + meta.size()),
        })?;
        self.slots.extend_from_slice(meta.default_value());
        self.residuals.resize(self.slots.len(), 0.0);
        Ok(id)
    }

    /// Registers an input in the input buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn add_input(&mut self, name: impl Into<String>, meta: &Variable) -> Result<VarId, Error> {
        let start = self.inputs.len();
        let id = self.register(Entry {
            name: name.into(),
            kind: VarKind::Input,
            meta: meta.clone(),
            input_range: Some(start..start + meta.size()),
            slot_range: None,
        })?;
        self.inputs.extend_from_slice(meta.default_value());
        Ok(id)
    }

    /// Gives an unconnected input its own slots so it can act as a design variable.
    ///
    /// Returns the slot range. Calling it again returns the existing range.
    pub fn make_independent(&mut self, id: VarId) -> Range<usize> {
        let entry = &self.entries[id.0];
        if let Some(range) = &entry.slot_range {
            return range.clone();
        }
        let input_range = entry.input_range.clone().unwrap_or(0..0);
        let start = self.slots.len();
        let range = start..start + input_range.len();
        self.slots.extend_from_slice(&self.inputs[input_range]);
        self.residuals.resize(self.slots.len(), 0.0);
        self.entries[id.0].slot_range = Some(range.clone());
        range
    }

    /// Looks up a variable by name.
    ///
    /// # Errors
    ///
    /// Returns an error if no variable has this name.
    pub fn id(&self, name: &str) -> Result<VarId, Error> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownVariable(name.to_owned()))
    }

    #[must_use]
    pub fn name(&self, id: VarId) -> &str {
        &self.entries[id.0].name
    }

    #[must_use]
    pub fn kind(&self, id: VarId) -> VarKind {
        self.entries[id.0].kind
    }

    #[must_use]
    pub fn meta(&self, id: VarId) -> &Variable {
        &self.entries[id.0].meta
    }

    /// Returns the slot range for outputs and independent inputs.
    #[must_use]
    pub fn slot_range(&self, id: VarId) -> Option<Range<usize>> {
        self.entries[id.0].slot_range.clone()
    }

    /// Returns the input buffer range for inputs.
    #[must_use]
    pub fn input_range(&self, id: VarId) -> Option<Range<usize>> {
        self.entries[id.0].input_range.clone()
    }

    /// Returns `true` for inputs that own slots.
    #[must_use]
    pub fn is_independent(&self, id: VarId) -> bool {
        let entry = &self.entries[id.0];
        entry.kind == VarKind::Input && entry.slot_range.is_some()
    }

    fn value_of(&self, id: VarId) -> &[f64] {
        let entry = &self.entries[id.0];
        match (&entry.input_range, &entry.slot_range) {
            (Some(r), _) => &self.inputs[r.clone()],
            (None, Some(r)) => &self.slots[r.clone()],
            (None, None) => &[],
        }
    }

    /// Returns a variable's value.
    ///
    /// # Errors
    ///
    /// Returns an error if no variable has this name.
    pub fn get(&self, name: &str) -> Result<&[f64], Error> {
        let id = self.id(name)?;
        Ok(self.value_of(id))
    }

    /// Replaces a variable's value.
    ///
    /// # Errors
    ///
    /// Returns an error if no variable has this name or the length differs
    /// from the declared shape.
    pub fn set(&mut self, name: &str, value: &[f64]) -> Result<(), Error> {
        let id = self.id(name)?;
        self.set_by_id(id, value)
    }

    fn set_by_id(&mut self, id: VarId, value: &[f64]) -> Result<(), Error> {
        let entry = &self.entries[id.0];
        let expected = entry.meta.size();
        if value.len() != expected {
            return Err(Error::ShapeMismatch {
                name: entry.name.clone(),
                expected,
                found: value.len(),
            });
        }
        if let Some(r) = entry.input_range.clone() {
            self.inputs[r].copy_from_slice(value);
        }
        if let Some(r) = self.entries[id.0].slot_range.clone() {
            self.slots[r].copy_from_slice(value);
        }
        Ok(())
    }

    /// Returns a variable's value expressed in `units`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unknown, has no units, or its units
    /// cannot be converted to `units`.
    pub fn get_in_units(&self, name: &str, units: &str) -> Result<Vec<f64>, Error> {
        let id = self.id(name)?;
        let declared = self.declared_units(id, units)?;
        let (scale, offset) = physical::conversion(declared, units)?;
        Ok(self.value_of(id).iter().map(|v| scale * v + offset).collect())
    }

    /// Replaces a variable's value, given in `units`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names, wrong lengths, or incompatible units.
    pub fn set_in_units(&mut self, name: &str, value: &[f64], units: &str) -> Result<(), Error> {
        let id = self.id(name)?;
        let declared = self.declared_units(id, units)?;
        let (scale, offset) = physical::conversion(units, declared)?;
        let converted: Vec<f64> = value.iter().map(|v| scale * v + offset).collect();
        self.set_by_id(id, &converted)
    }

    fn declared_units(&self, id: VarId, requested: &str) -> Result<&str, Error> {
        self.entries[id.0].meta.unit_expr().ok_or_else(|| {
            physical::UnitsError::Incompatible {
                from: "None".into(),
                to: requested.to_owned(),
            }
            .into()
        })
    }

    /// Returns the residual of an output or independent input.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unknown or owns no slots.
    pub fn residual(&self, name: &str) -> Result<&[f64], Error> {
        let id = self.id(name)?;
        self.entries[id.0]
            .slot_range
            .clone()
            .map(|r| &self.residuals[r])
            .ok_or_else(|| Error::UnknownVariable(format!("{name} (residual)")))
    }

    /// Concatenates the values of `subset` into one flat vector.
    #[must_use]
    pub fn as_vector(&self, subset: &[VarId]) -> Vec<f64> {
        subset
            .iter()
            .flat_map(|&id| self.value_of(id).iter().copied())
            .collect()
    }

    /// Scatters a flat vector produced by [`VariableStore::as_vector`] back.
    ///
    /// # Errors
    ///
    /// Returns an error if the length does not match the subset.
    pub fn from_vector(&mut self, subset: &[VarId], flat: &[f64]) -> Result<(), Error> {
        let expected: usize = subset.iter().map(|&id| self.entries[id.0].meta.size()).sum();
        if flat.len() != expected {
            let names: Vec<&str> = subset.iter().map(|&id| self.name(id)).collect();
            return Err(Error::ShapeMismatch {
                name: names.join(", "),
                expected,
                found: flat.len(),
            });
        }
        let mut offset = 0;
        for &id in subset {
            let size = self.entries[id.0].meta.size();
            self.set_by_id(id, &flat[offset..offset + size])?;
            offset += size;
        }
        Ok(())
    }

    /// Copies independent slot values into the input buffer.
    pub fn sync_independents(&mut self) {
        for entry in &self.entries {
            if let (VarKind::Input, Some(slots), Some(inputs)) =
                (entry.kind, &entry.slot_range, &entry.input_range)
            {
                self.inputs[inputs.clone()].copy_from_slice(&self.slots[slots.clone()]);
            }
        }
    }

    /// Iterates over all registered variables.
    pub fn ids(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.entries.len()).map(VarId)
    }

    #[must_use]
    pub fn n_slots(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn slots(&self) -> &[f64] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [f64] {
        &mut self.slots
    }

    #[must_use]
    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn residuals_mut(&mut self) -> &mut [f64] {
        &mut self.residuals
    }

    #[must_use]
    pub fn inputs(&self) -> &[f64] {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut [f64] {
        &mut self.inputs
    }

    /// Returns the slot, residual, and input buffers at once.
    pub fn buffers_mut(&mut self) -> (&mut [f64], &mut [f64], &mut [f64]) {
        (&mut self.slots, &mut self.residuals, &mut self.inputs)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::physical::UnitsError;

    fn store() -> VariableStore {
        let mut store = VariableStore::new();
        store
            .add_output("a.y", &Variable::new("y").shape(&[2]).units("m"))
            .unwrap();
        store
            .add_input("b.x", &Variable::new("x").shape(&[2]).units("cm"))
            .unwrap();
        store
    }

    #[test]
    fn set_checks_shape() {
        let mut store = store();
        store.set("a.y", &[1.0, 2.0]).unwrap();
        assert_eq!(store.get("a.y").unwrap(), &[1.0, 2.0]);

        let err = store.set("a.y", &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn converts_units_on_access() {
        let mut store = store();
        store.set_in_units("a.y", &[1.0, 2.5], "km").unwrap();
        assert_relative_eq!(store.get("a.y").unwrap()[1], 2500.0);
        assert_relative_eq!(store.get_in_units("a.y", "ft").unwrap()[0], 1000.0 / 0.3048);

        let err = store.get_in_units("a.y", "s").unwrap_err();
        assert!(matches!(err, Error::Units(UnitsError::Incompatible { .. })));
    }

    #[test]
    fn vectors_round_trip_through_subsets() {
        let mut store = store();
        let ids = [store.id("b.x").unwrap(), store.id("a.y").unwrap()];
        store.from_vector(&ids, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        assert_eq!(store.get("b.x").unwrap(), &[1.0, 2.0]);
        assert_eq!(store.as_vector(&ids), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(store.from_vector(&ids, &[1.0]).is_err());
    }

    #[test]
    fn independent_inputs_own_slots() {
        let mut store = store();
        let x = store.id("b.x").unwrap();
        let range = store.make_independent(x);
        assert_eq!(range, 2..4);
        assert_eq!(store.n_slots(), 4);

        store.set("b.x", &[7.0, 8.0]).unwrap();
        assert_eq!(&store.slots()[2..4], &[7.0, 8.0]);

        store.slots_mut()[2] = 9.0;
        store.sync_independents();
        assert_eq!(store.get("b.x").unwrap(), &[9.0, 8.0]);
    }

    #[test]
    fn unknown_names_are_errors() {
        let store = store();
        assert!(matches!(
            store.get("c.z").unwrap_err(),
            Error::UnknownVariable(_)
        ));
    }
}
