//! The collection façade: keyed objects with identifier, value, and spatial
//! indexes plus live memory-cost accounting.
//!
//! A collection is single-writer/single-reader by contract and holds no
//! internal lock; the host wraps it in its own read/write lock. Long scans
//! stay scheduler-friendly by yielding every [`YIELD_STEP`] results.

use bytes::Bytes;
use geo::{coord, Rect};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::arena::{Arena, ItemRef};
use crate::btree::BTree;
use crate::geodesy;
use crate::item::{Fields, Item};
use crate::object::GeoObject;
use crate::rtree::BoxIndex;
use crate::values::{ValueKey, ValueTree};

/// Iterators yield to the scheduler every this many results.
pub const YIELD_STEP: u64 = 255;

/// Caller-owned pagination state.
///
/// At query entry the collection reads the offset and skips that many
/// results, stepping the cursor once by the whole offset; afterwards it
/// steps by one for every result examined.
pub trait Cursor {
    fn offset(&self) -> u64;
    fn step(&mut self, count: u64);
}

/// Serializable snapshot of the collection counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Number of items.
    pub count: usize,
    /// Number of string-value items.
    pub string_count: usize,
    /// Number of coordinates across all spatial items.
    pub point_count: usize,
    /// Approximate in-memory cost in bytes.
    pub total_weight: usize,
}

/// An in-memory collection of keyed geometries and string values.
///
/// # Example
///
/// ```rust
/// use locus::{Collection, GeoObject, Point};
///
/// let mut col = Collection::new(false);
/// col.set("truck:1", GeoObject::Point(Point::new(-112.26, 33.52)), None, &[]);
/// col.set("truck:2", GeoObject::Point(Point::new(-112.20, 33.50)), None, &[]);
/// assert_eq!(col.count(), 2);
/// ```
pub struct Collection {
    arena: Arena,
    items: BTree,       // items sorted by id
    index: BoxIndex,    // spatial items indexed by bounding box
    values: ValueTree,  // non-spatial items sorted by value+id
    packed: bool,
    field_map: FxHashMap<String, usize>,
    weight: usize,
    points: usize,
    objects: usize,  // spatial item count
    nobjects: usize, // string item count
}

impl Collection {
    /// Creates an empty collection. `packed` selects the field encoding for
    /// every item this collection will hold.
    pub fn new(packed: bool) -> Collection {
        Collection {
            arena: Arena::new(),
            items: BTree::default(),
            index: BoxIndex::new(),
            values: ValueTree::default(),
            packed,
            field_map: FxHashMap::default(),
            weight: 0,
            points: 0,
            objects: 0,
            nobjects: 0,
        }
    }

    /// Number of items in the collection.
    pub fn count(&self) -> usize {
        self.objects + self.nobjects
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Number of string-value items.
    pub fn string_count(&self) -> usize {
        self.nobjects
    }

    /// Number of coordinates across all spatial items.
    pub fn point_count(&self) -> usize {
        self.points
    }

    /// Approximate in-memory cost of the collection in bytes.
    pub fn total_weight(&self) -> usize {
        self.weight
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            count: self.count(),
            string_count: self.string_count(),
            point_count: self.point_count(),
            total_weight: self.total_weight(),
        }
    }

    /// Bounds of all spatial items as `(min_x, min_y, max_x, max_y)`, or all
    /// zeros when there are none.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        match self.index.bounds() {
            Some((min, max)) => (min[0], min[1], max[0], max[1]),
            None => (0.0, 0.0, 0.0, 0.0),
        }
    }

    fn add_item(&mut self, r: ItemRef) {
        let item = self.arena.get(r);
        if item.obj().is_spatial() {
            if !item.obj().is_empty() {
                if let Some(rect) = item.obj().rect() {
                    self.index.insert(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                        r,
                    );
                }
            }
            self.objects += 1;
        } else {
            self.values
                .insert(ValueKey::new(item.obj().value_bytes(), item.id_bytes()), r);
            self.nobjects += 1;
        }
        let (weight, points) = item.weight_and_points();
        self.weight += weight;
        self.points += points;
    }

    fn del_item(&mut self, r: ItemRef) {
        let item = self.arena.get(r);
        if item.obj().is_spatial() {
            if !item.obj().is_empty() {
                if let Some(rect) = item.obj().rect() {
                    self.index.delete(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                        r,
                    );
                }
            }
            self.objects -= 1;
        } else {
            self.values
                .remove(&ValueKey::new(item.obj().value_bytes(), item.id_bytes()));
            self.nobjects -= 1;
        }
        let (weight, points) = item.weight_and_points();
        self.weight -= weight;
        self.points -= points;
    }

    /// Adds or replaces an object.
    ///
    /// If an item with the same id already existed, the new item adopts the
    /// old item's fields before the optional `field_names`/`values` are
    /// applied; with `field_names == None` and a non-empty `values`, the
    /// values are copied in verbatim. Returns the replaced item, if any, and
    /// a view of the new item's fields.
    pub fn set(
        &mut self,
        id: impl Into<Bytes>,
        obj: GeoObject,
        field_names: Option<&[&str]>,
        values: &[f64],
    ) -> (Option<Item>, Option<Fields<'_>>) {
        let new_ref = self.arena.insert(Item::new(id, obj, self.packed));
        let old_item = match self.items.set(&self.arena, new_ref) {
            Some(old_ref) => {
                self.del_item(old_ref);
                let old_item = self.arena.remove(old_ref);
                if old_item.has_fields() {
                    self.arena.get_mut(new_ref).copy_fields_from(&old_item);
                }
                Some(old_item)
            }
            None => None,
        };

        match field_names {
            None if !values.is_empty() => {
                self.arena.get_mut(new_ref).copy_over_fields(values);
            }
            Some(names) if !names.is_empty() => {
                self.apply_fields(new_ref, names, values, false);
            }
            _ => {}
        }

        self.add_item(new_ref);
        (old_item, self.arena.get(new_ref).fields())
    }

    /// Removes an item, returning it. `None` when the id is absent.
    pub fn delete(&mut self, id: &[u8]) -> Option<Item> {
        let old_ref = self.items.delete(&self.arena, id)?;
        self.del_item(old_ref);
        Some(self.arena.remove(old_ref))
    }

    /// Looks up an item by id.
    pub fn get(&self, id: &[u8]) -> Option<&Item> {
        let r = self.items.get(&self.arena, id)?;
        Some(self.arena.get(r))
    }

    /// Sets one field on an existing item, keeping the weight counter in
    /// step. Returns the item and whether the field actually changed, or
    /// `None` when the id is absent.
    pub fn set_field(&mut self, id: &[u8], name: &str, value: f64) -> Option<(&Item, bool)> {
        let r = self.items.get(&self.arena, id)?;
        let updated = self.apply_field(r, name, value, true);
        Some((self.arena.get(r), updated))
    }

    /// Sets multiple fields on an existing item. Missing values read as
    /// zero. Returns the item and the number of fields that changed.
    pub fn set_fields(
        &mut self,
        id: &[u8],
        names: &[&str],
        values: &[f64],
    ) -> Option<(&Item, usize)> {
        let r = self.items.get(&self.arena, id)?;
        let updated = self.apply_fields(r, names, values, true);
        Some((self.arena.get(r), updated))
    }

    fn field_index(&mut self, name: &str) -> usize {
        if let Some(&index) = self.field_map.get(name) {
            return index;
        }
        let index = self.field_map.len();
        self.field_map.insert(name.to_owned(), index);
        index
    }

    fn apply_field(&mut self, r: ItemRef, name: &str, value: f64, update_weight: bool) -> bool {
        let index = self.field_index(name);
        let prev_weight = if update_weight {
            self.arena.get(r).weight_and_points().0
        } else {
            0
        };
        let updated = self.arena.get_mut(r).set_field(index, value);
        if update_weight && updated {
            let next_weight = self.arena.get(r).weight_and_points().0;
            self.weight = self.weight - prev_weight + next_weight;
        }
        updated
    }

    fn apply_fields(
        &mut self,
        r: ItemRef,
        names: &[&str],
        values: &[f64],
        update_weight: bool,
    ) -> usize {
        let mut updated = 0;
        for (i, name) in names.iter().enumerate() {
            let value = values.get(i).copied().unwrap_or(0.0);
            if self.apply_field(r, name, value, update_weight) {
                updated += 1;
            }
        }
        updated
    }

    /// The field-name → index map. Indices are dense, assigned on first use,
    /// and stable for the lifetime of the collection.
    pub fn field_map(&self) -> &FxHashMap<String, usize> {
        &self.field_map
    }

    /// Field names ordered by index.
    pub fn field_arr(&self) -> Vec<String> {
        let mut arr = vec![String::new(); self.field_map.len()];
        for (name, &index) in &self.field_map {
            arr[index] = name.clone();
        }
        arr
    }

    /// Iterates items in id order. Returns false when the callback stopped
    /// the scan.
    pub fn scan(
        &self,
        desc: bool,
        cursor: Option<&mut dyn Cursor>,
        mut f: impl FnMut(&Item) -> bool,
    ) -> bool {
        let mut pager = Pager::new(cursor);
        let mut keepon = true;
        let mut iter = |r: ItemRef| {
            if !pager.tick() {
                return true;
            }
            keepon = f(self.arena.get(r));
            keepon
        };
        if desc {
            self.items.reverse(&mut iter);
        } else {
            self.items.scan(&mut iter);
        }
        keepon
    }

    /// Iterates items with ids in `[start, end)` ascending, or `(end, start]`
    /// descending.
    pub fn scan_range(
        &self,
        start: &[u8],
        end: &[u8],
        desc: bool,
        cursor: Option<&mut dyn Cursor>,
        mut f: impl FnMut(&Item) -> bool,
    ) -> bool {
        let mut pager = Pager::new(cursor);
        let mut keepon = true;
        let mut iter = |r: ItemRef| {
            if !pager.tick() {
                return true;
            }
            let item = self.arena.get(r);
            if !desc {
                if item.id() >= end {
                    return false;
                }
            } else if item.id() <= end {
                return false;
            }
            keepon = f(item);
            keepon
        };
        if desc {
            self.items.descend(&self.arena, start, &mut iter);
        } else {
            self.items.ascend(&self.arena, start, &mut iter);
        }
        keepon
    }

    /// Iterates items starting at `pivot` inclusive, ascending or
    /// descending.
    pub fn scan_greater_or_equal(
        &self,
        pivot: &[u8],
        desc: bool,
        cursor: Option<&mut dyn Cursor>,
        mut f: impl FnMut(&Item) -> bool,
    ) -> bool {
        let mut pager = Pager::new(cursor);
        let mut keepon = true;
        let mut iter = |r: ItemRef| {
            if !pager.tick() {
                return true;
            }
            keepon = f(self.arena.get(r));
            keepon
        };
        if desc {
            self.items.descend(&self.arena, pivot, &mut iter);
        } else {
            self.items.ascend(&self.arena, pivot, &mut iter);
        }
        keepon
    }

    /// Iterates string items in `(value, id)` order.
    pub fn search_values(
        &self,
        desc: bool,
        cursor: Option<&mut dyn Cursor>,
        mut f: impl FnMut(&Item) -> bool,
    ) -> bool {
        let mut pager = Pager::new(cursor);
        let mut keepon = true;
        let mut iter = |r: ItemRef| {
            if !pager.tick() {
                return true;
            }
            keepon = f(self.arena.get(r));
            keepon
        };
        if desc {
            self.values.descend(&mut iter);
        } else {
            self.values.ascend(&mut iter);
        }
        keepon
    }

    /// Iterates string items with values in `[start, end)` ascending, or
    /// `[end, start)` descending.
    pub fn search_values_range(
        &self,
        start: &[u8],
        end: &[u8],
        desc: bool,
        cursor: Option<&mut dyn Cursor>,
        mut f: impl FnMut(&Item) -> bool,
    ) -> bool {
        let mut pager = Pager::new(cursor);
        let mut keepon = true;
        let mut iter = |r: ItemRef| {
            if !pager.tick() {
                return true;
            }
            keepon = f(self.arena.get(r));
            keepon
        };
        if desc {
            self.values.descend_range(start, end, &mut iter);
        } else {
            self.values.ascend_range(start, end, &mut iter);
        }
        keepon
    }

    fn geo_search(&self, rect: Rect, mut f: impl FnMut(&Item) -> bool) -> bool {
        let mut alive = true;
        self.index.search(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
            |entry| {
                alive = f(self.arena.get(entry.item));
                alive
            },
        );
        alive
    }

    fn geo_sparse(
        &self,
        rect: Rect,
        sparse: u8,
        mut f: impl FnMut(&Item) -> (bool, bool),
    ) -> bool {
        let mut matches: FxHashSet<Bytes> = FxHashSet::default();
        let mut iter = |item: &Item| -> (bool, bool) {
            if matches.contains(item.id()) {
                return (false, true);
            }
            let (matched, ok) = f(item);
            if matched {
                matches.insert(item.id_bytes());
            }
            (matched, ok)
        };
        self.geo_sparse_inner(rect, sparse, &mut iter)
    }

    fn geo_sparse_inner(
        &self,
        rect: Rect,
        sparse: u8,
        iter: &mut impl FnMut(&Item) -> (bool, bool),
    ) -> bool {
        if sparse > 0 {
            let w = rect.max().x - rect.min().x;
            let h = rect.max().y - rect.min().y;
            // quadrants in NW, NE, SW, SE order
            let quads = [
                Rect::new(
                    coord! { x: rect.min().x, y: rect.min().y + h / 2.0 },
                    coord! { x: rect.min().x + w / 2.0, y: rect.max().y },
                ),
                Rect::new(
                    coord! { x: rect.min().x + w / 2.0, y: rect.min().y + h / 2.0 },
                    coord! { x: rect.max().x, y: rect.max().y },
                ),
                Rect::new(
                    coord! { x: rect.min().x, y: rect.min().y },
                    coord! { x: rect.min().x + w / 2.0, y: rect.min().y + h / 2.0 },
                ),
                Rect::new(
                    coord! { x: rect.min().x + w / 2.0, y: rect.min().y },
                    coord! { x: rect.max().x, y: rect.min().y + h / 2.0 },
                ),
            ];
            for quad in quads {
                if !self.geo_sparse_inner(quad, sparse - 1, iter) {
                    return false;
                }
            }
            return true;
        }
        let mut alive = true;
        self.geo_search(rect, |item| {
            let (matched, ok) = iter(item);
            if !ok {
                alive = false;
                return false;
            }
            // a match ends this quadrant's search
            !matched
        });
        alive
    }

    /// Yields every item fully contained within `obj`. With `sparse > 0` the
    /// query rectangle is subdivided into quadrants to that depth and each
    /// leaf quadrant contributes at most one match.
    pub fn within(
        &self,
        obj: &GeoObject,
        sparse: u8,
        cursor: Option<&mut dyn Cursor>,
        mut f: impl FnMut(&Item) -> bool,
    ) -> bool {
        let Some(rect) = query_rect(obj) else {
            return true;
        };
        let mut pager = Pager::new(cursor);
        if sparse > 0 {
            return self.geo_sparse(rect, sparse, |item| {
                if !pager.tick() {
                    return (false, true);
                }
                if item.obj().within(obj) {
                    (true, f(item))
                } else {
                    (false, true)
                }
            });
        }
        self.geo_search(rect, |item| {
            if !pager.tick() {
                return true;
            }
            if item.obj().within(obj) {
                f(item)
            } else {
                true
            }
        })
    }

    /// Yields every item intersecting `obj`. Sparse mode works as in
    /// [`Collection::within`].
    pub fn intersects(
        &self,
        obj: &GeoObject,
        sparse: u8,
        cursor: Option<&mut dyn Cursor>,
        mut f: impl FnMut(&Item) -> bool,
    ) -> bool {
        let Some(rect) = query_rect(obj) else {
            return true;
        };
        let mut pager = Pager::new(cursor);
        if sparse > 0 {
            return self.geo_sparse(rect, sparse, |item| {
                if !pager.tick() {
                    return (false, true);
                }
                if item.obj().intersects(obj) {
                    (true, f(item))
                } else {
                    (false, true)
                }
            });
        }
        self.geo_search(rect, |item| {
            if !pager.tick() {
                return true;
            }
            if item.obj().intersects(obj) {
                f(item)
            } else {
                true
            }
        })
    }

    /// Yields spatial items in non-decreasing box distance from the target's
    /// center. A circle target with a positive radius first probes the
    /// circle's bounding rectangle and yields nothing if the probe is empty.
    pub fn nearby(
        &self,
        target: &GeoObject,
        cursor: Option<&mut dyn Cursor>,
        mut f: impl FnMut(&Item) -> bool,
    ) -> bool {
        if let GeoObject::Circle(circle) = target {
            if circle.meters() > 0.0 {
                let rect = geodesy::rect_from_center(circle.center(), circle.meters());
                let mut exists = false;
                self.index.search(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                    |_| {
                        exists = true;
                        false
                    },
                );
                if !exists {
                    // no candidates
                    return true;
                }
            }
        }
        let center = target.center();
        let mut pager = Pager::new(cursor);
        let mut alive = true;
        self.index.nearby(
            [center.x(), center.y()],
            [center.x(), center.y()],
            |entry, _dist| {
                if !pager.tick() {
                    return true;
                }
                alive = f(self.arena.get(entry.item));
                alive
            },
        );
        alive
    }
}

/// The query rectangle for a spatial search, or `None` when the query has
/// nothing searchable.
fn query_rect(obj: &GeoObject) -> Option<Rect> {
    let rect = obj.rect()?;
    let finite = [rect.min().x, rect.min().y, rect.max().x, rect.max().y]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        log::warn!("rejecting spatial query with non-finite bounds");
        return None;
    }
    Some(rect)
}

/// Shared pagination and yield bookkeeping for the iterator entry points.
struct Pager<'a> {
    count: u64,
    offset: u64,
    cursor: Option<&'a mut dyn Cursor>,
}

impl<'a> Pager<'a> {
    fn new(mut cursor: Option<&'a mut dyn Cursor>) -> Pager<'a> {
        let mut offset = 0;
        if let Some(c) = cursor.as_mut() {
            offset = c.offset();
            c.step(offset);
        }
        Pager {
            count: 0,
            offset,
            cursor,
        }
    }

    // False while still skipping the cursor offset.
    fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count <= self.offset {
            return false;
        }
        if self.count & YIELD_STEP == YIELD_STEP {
            std::thread::yield_now();
        }
        if let Some(c) = self.cursor.as_mut() {
            c.step(1);
        }
        true
    }
}
