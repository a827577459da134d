//! Collection items: an identifier, a [`GeoObject`], and a field vector.
//!
//! Fields are a sparse sequence of 64-bit floats. Depending on the owning
//! collection they are stored either packed (variable-length codec, see
//! [`packed`]) or unpacked (eight bytes per slot). Absent indices read as
//! zero and trailing zeros are never materialized.

use bytes::Bytes;

use crate::object::GeoObject;

pub(crate) mod packed;
pub(crate) mod unpacked;

const MAX_ID_BYTES: usize = 1 << 30;

#[derive(Debug, Clone)]
enum FieldData {
    Packed(Vec<u8>),
    Unpacked(Vec<f64>),
}

/// One keyed entry in a collection.
///
/// The identifier and object are fixed at construction; only the field
/// vector mutates in place. The collection owns every item it holds and
/// hands out `&Item` views that are valid until the next mutation.
#[derive(Debug, Clone)]
pub struct Item {
    id: Bytes,
    obj: GeoObject,
    fields: FieldData,
}

impl Item {
    pub(crate) fn new(id: impl Into<Bytes>, obj: GeoObject, packed: bool) -> Item {
        let id = id.into();
        assert!(id.len() < MAX_ID_BYTES, "item id too large");
        let fields = if packed {
            FieldData::Packed(Vec::new())
        } else {
            FieldData::Unpacked(Vec::new())
        };
        Item { id, obj, fields }
    }

    /// The item's identifier.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub(crate) fn id_bytes(&self) -> Bytes {
        self.id.clone()
    }

    /// The item's object.
    pub fn obj(&self) -> &GeoObject {
        &self.obj
    }

    /// Consumes the item, returning its object.
    pub fn into_obj(self) -> GeoObject {
        self.obj
    }

    /// True when the field vector uses the packed codec.
    pub fn packed(&self) -> bool {
        matches!(self.fields, FieldData::Packed(_))
    }

    pub(crate) fn fields_byte_len(&self) -> usize {
        match &self.fields {
            FieldData::Packed(buf) => buf.len(),
            FieldData::Unpacked(values) => values.len() * 8,
        }
    }

    /// True when the item carries any field bytes.
    pub fn has_fields(&self) -> bool {
        self.fields_byte_len() > 0
    }

    /// Memory weight and point count.
    ///
    /// Spatial objects weigh sixteen bytes per point; string values weigh
    /// their byte length. Field bytes and the identifier are added to both.
    pub fn weight_and_points(&self) -> (usize, usize) {
        let (mut weight, points) = if self.obj.is_spatial() {
            let points = self.obj.num_points();
            (points * 16, points)
        } else {
            (self.obj.string_value().map_or(0, <[u8]>::len), 0)
        };
        weight += self.fields_byte_len() + self.id.len();
        (weight, points)
    }

    /// Writes `value` at `index`, growing the storage as needed. Returns
    /// false when neither the stored value nor the stored length changes.
    pub fn set_field(&mut self, index: usize, value: f64) -> bool {
        match &mut self.fields {
            FieldData::Packed(buf) => packed::set_field(buf, index, value),
            FieldData::Unpacked(values) => unpacked::set_field(values, index, value),
        }
    }

    /// The value at `index`, or zero at or past the stored length.
    pub fn get_field(&self, index: usize) -> f64 {
        match &self.fields {
            FieldData::Packed(buf) => packed::get_field(buf, index),
            FieldData::Unpacked(values) => unpacked::get_field(values, index),
        }
    }

    /// Iterates field values. `None` visits every stored field; `Some(n)`
    /// visits exactly `n` slots, yielding zero past the stored length. The
    /// callback returning false stops early.
    pub fn for_each_field(&self, count: Option<usize>, mut f: impl FnMut(f64) -> bool) {
        match &self.fields {
            FieldData::Packed(buf) => packed::for_each(buf, count, &mut f),
            FieldData::Unpacked(values) => unpacked::for_each(values, count, &mut f),
        }
    }

    /// All stored field values as a vector.
    pub fn field_values(&self) -> Vec<f64> {
        let mut values = Vec::new();
        self.for_each_field(None, |v| {
            values.push(v);
            true
        });
        values
    }

    /// Replaces the field vector with `values`.
    pub(crate) fn copy_over_fields(&mut self, values: &[f64]) {
        match &mut self.fields {
            FieldData::Packed(buf) => *buf = packed::generate_packed(values),
            FieldData::Unpacked(stored) => *stored = values.to_vec(),
        }
    }

    /// Replaces the field vector with a copy of `other`'s. Matching storage
    /// modes copy the raw block; mismatched modes decode and re-encode.
    pub(crate) fn copy_fields_from(&mut self, other: &Item) {
        if self.packed() == other.packed() {
            self.fields = other.fields.clone();
        } else {
            self.copy_over_fields(&other.field_values());
        }
    }

    /// Borrowed field view, or `None` when the item has no fields.
    pub fn fields(&self) -> Option<Fields<'_>> {
        if self.has_fields() {
            Some(Fields { item: self })
        } else {
            None
        }
    }
}

/// Read-only view over an item's fields.
///
/// Valid only until the owning collection is next mutated.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    item: &'a Item,
}

impl Fields<'_> {
    /// The value at `index`, or zero past the stored length.
    pub fn get(&self, index: usize) -> f64 {
        self.item.get_field(index)
    }

    /// Iterates field values; see [`Item::for_each_field`].
    pub fn for_each(&self, count: Option<usize>, f: impl FnMut(f64) -> bool) {
        self.item.for_each_field(count, f)
    }
}
