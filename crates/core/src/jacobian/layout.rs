use std::ops::Range;

/// Where one scalar input reads its value from: `input = scale * slot + offset`.
///
/// Only `scale` matters for derivatives; the offset of an affine unit
/// conversion is kept by the owner of the transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub slot: usize,
    pub scale: f64,
    pub offset: f64,
}

/// Slot bookkeeping for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSlots {
    /// The unit's outputs (and residual rows) in the slot vector.
    pub outputs: Range<usize>,

    /// The unit's inputs in the store's input buffer.
    pub inputs: Range<usize>,

    /// One route per scalar input, in input-buffer order.
    pub routes: Vec<Route>,
}

/// The global arrangement of slots shared by the Jacobian and its consumers.
///
/// Slots are every output entry followed by every independent input entry.
/// Independent slots have identity residual rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    size: usize,
    units: Vec<UnitSlots>,
    independents: Vec<Range<usize>>,
}

impl Layout {
    #[must_use]
    pub fn new(size: usize, units: Vec<UnitSlots>, independents: Vec<Range<usize>>) -> Self {
        Self {
            size,
            units,
            independents,
        }
    }

    /// Returns the total number of slots.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn units(&self) -> &[UnitSlots] {
        &self.units
    }

    #[must_use]
    pub fn unit(&self, index: usize) -> &UnitSlots {
        &self.units[index]
    }

    /// Returns the slot ranges of independent inputs.
    #[must_use]
    pub fn independents(&self) -> &[Range<usize>] {
        &self.independents
    }

    /// Returns `true` if `slot` belongs to an independent input.
    #[must_use]
    pub fn is_independent(&self, slot: usize) -> bool {
        self.independents.iter().any(|r| r.contains(&slot))
    }
}
