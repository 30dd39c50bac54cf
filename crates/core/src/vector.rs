use std::{
    collections::HashMap,
    ops::{Index, IndexMut, Range},
};

/// Maps variable names to contiguous ranges of a flat buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarLayout {
    names: Vec<String>,
    ranges: Vec<Range<usize>>,
    lookup: HashMap<String, usize>,
    size: usize,
}

impl VarLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a variable of `size` entries and returns its position.
    ///
    /// Returns `None` if the name is already present.
    pub fn push(&mut self, name: impl Into<String>, size: usize) -> Option<usize> {
        let name = name.into();
        if self.lookup.contains_key(&name) {
            return None;
        }
        let position = self.names.len();
        self.lookup.insert(name.clone(), position);
        self.names.push(name);
        self.ranges.push(self.size..self.size + size);
        self.size += size;
        Some(position)
    }

    /// Returns the position of a variable by name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Returns the buffer range of a variable by name.
    #[must_use]
    pub fn range(&self, name: &str) -> Option<Range<usize>> {
        self.position(name).map(|i| self.ranges[i].clone())
    }

    /// Returns the buffer range of the variable at `position`.
    #[must_use]
    pub fn range_at(&self, position: usize) -> Range<usize> {
        self.ranges[position].clone()
    }

    #[must_use]
    pub fn name_at(&self, position: usize) -> &str {
        &self.names[position]
    }

    /// Returns `(position, offset)` of the variable holding flat entry `index`.
    #[must_use]
    pub fn locate(&self, index: usize) -> Option<(usize, usize)> {
        self.ranges
            .iter()
            .position(|r| r.contains(&index))
            .map(|p| (p, index - self.ranges[p].start))
    }

    /// Returns the variable names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the total number of scalar entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A read-only named view over a unit's flat buffer.
///
/// Indexing by an unknown name panics, like indexing a `HashMap`; use
/// [`Vector::get`] when the name may be absent.
#[derive(Debug, Clone, Copy)]
pub struct Vector<'a, T = f64> {
    layout: &'a VarLayout,
    data: &'a [T],
}

impl<'a, T> Vector<'a, T> {
    /// Creates a view; `data` must cover `layout.size()` entries.
    #[must_use]
    pub fn new(layout: &'a VarLayout, data: &'a [T]) -> Self {
        debug_assert_eq!(layout.size(), data.len());
        Self { layout, data }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a [T]> {
        self.layout.range(name).map(|r| &self.data[r])
    }

    /// Returns the underlying flat buffer.
    #[must_use]
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    #[must_use]
    pub fn layout(&self) -> &'a VarLayout {
        self.layout
    }
}

impl<T: Copy> Vector<'_, T> {
    /// Returns the first entry of a variable, for scalar access.
    ///
    /// # Panics
    ///
    /// Panics if no variable has this name.
    #[must_use]
    pub fn value(&self, name: &str) -> T {
        self[name][0]
    }
}

impl<T> Index<&str> for Vector<'_, T> {
    type Output = [T];

    fn index(&self, name: &str) -> &[T] {
        match self.layout.range(name) {
            Some(r) => &self.data[r],
            None => panic!("no variable named '{name}'"),
        }
    }
}

/// A mutable named view over a unit's flat buffer.
#[derive(Debug)]
pub struct VectorMut<'a, T = f64> {
    layout: &'a VarLayout,
    data: &'a mut [T],
}

impl<'a, T> VectorMut<'a, T> {
    /// Creates a view; `data` must cover `layout.size()` entries.
    #[must_use]
    pub fn new(layout: &'a VarLayout, data: &'a mut [T]) -> Self {
        debug_assert_eq!(layout.size(), data.len());
        Self { layout, data }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut [T]> {
        self.layout.range(name).map(|r| &mut self.data[r])
    }

    /// Writes `value` into the first entry of a variable.
    ///
    /// # Panics
    ///
    /// Panics if no variable has this name.
    pub fn set(&mut self, name: &str, value: T) {
        self[name][0] = value;
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &*self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut *self.data
    }

    /// Reborrows as a read-only view.
    #[must_use]
    pub fn as_vector(&self) -> Vector<'_, T> {
        Vector {
            layout: self.layout,
            data: &*self.data,
        }
    }
}

impl<T> Index<&str> for VectorMut<'_, T> {
    type Output = [T];

    fn index(&self, name: &str) -> &[T] {
        match self.layout.range(name) {
            Some(r) => &self.data[r],
            None => panic!("no variable named '{name}'"),
        }
    }
}

impl<T> IndexMut<&str> for VectorMut<'_, T> {
    fn index_mut(&mut self, name: &str) -> &mut [T] {
        match self.layout.range(name) {
            Some(r) => &mut self.data[r],
            None => panic!("no variable named '{name}'"),
        }
    }
}
