//! Builder-style construction for collections.

use crate::collection::Collection;

/// Builder for [`Collection`] configuration.
///
/// The field encoding is fixed at build time: packed collections trade field
/// write speed for a much smaller per-item footprint.
#[derive(Debug, Default)]
pub struct CollectionBuilder {
    packed: bool,
}

impl CollectionBuilder {
    /// Creates a builder for an unpacked collection.
    pub fn new() -> CollectionBuilder {
        CollectionBuilder::default()
    }

    /// Selects the packed field codec for every item in the collection.
    pub fn packed(mut self, packed: bool) -> CollectionBuilder {
        self.packed = packed;
        self
    }

    pub fn build(self) -> Collection {
        Collection::new(self.packed)
    }
}
