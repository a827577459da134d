//! Value-ordered index for non-spatial items.
//!
//! Items are keyed by `(value, id)` so lexical range scans never touch the
//! spatial index. Range bounds are expressed as synthetic keys with an empty
//! id, which sort before every real item carrying the same value.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::arena::ItemRef;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ValueKey {
    value: Bytes,
    id: Bytes,
}

impl ValueKey {
    pub fn new(value: Bytes, id: Bytes) -> ValueKey {
        ValueKey { value, id }
    }

    fn pivot(value: &[u8]) -> ValueKey {
        ValueKey {
            value: Bytes::copy_from_slice(value),
            id: Bytes::new(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ValueTree {
    map: BTreeMap<ValueKey, ItemRef>,
}

impl ValueTree {
    pub fn insert(&mut self, key: ValueKey, item: ItemRef) {
        self.map.insert(key, item);
    }

    pub fn remove(&mut self, key: &ValueKey) {
        self.map.remove(key);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn ascend(&self, mut f: impl FnMut(ItemRef) -> bool) {
        for &item in self.map.values() {
            if !f(item) {
                return;
            }
        }
    }

    pub fn descend(&self, mut f: impl FnMut(ItemRef) -> bool) {
        for &item in self.map.values().rev() {
            if !f(item) {
                return;
            }
        }
    }

    /// Visits items with value in `[start, end)` in ascending order.
    pub fn ascend_range(&self, start: &[u8], end: &[u8], mut f: impl FnMut(ItemRef) -> bool) {
        let lo = ValueKey::pivot(start);
        let hi = ValueKey::pivot(end);
        if lo >= hi {
            return;
        }
        for &item in self.map.range(lo..hi).map(|(_, r)| r) {
            if !f(item) {
                return;
            }
        }
    }

    /// Visits items with value in `[end, start)` in descending order.
    pub fn descend_range(&self, start: &[u8], end: &[u8], mut f: impl FnMut(ItemRef) -> bool) {
        let lo = ValueKey::pivot(end);
        let hi = ValueKey::pivot(start);
        if lo >= hi {
            return;
        }
        for &item in self.map.range(lo..hi).rev().map(|(_, r)| r) {
            if !f(item) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::item::Item;
    use crate::object::GeoObject;

    fn seed() -> (Arena, ValueTree, Vec<(&'static str, &'static str)>) {
        let pairs = vec![
            ("a", "apple"),
            ("b", "banana"),
            ("c", "banana"),
            ("d", "cherry"),
            ("e", "date"),
        ];
        let mut arena = Arena::new();
        let mut tree = ValueTree::default();
        for (id, value) in &pairs {
            let item = Item::new(
                Bytes::from_static(id.as_bytes()),
                GeoObject::string(*value),
                false,
            );
            let key = ValueKey::new(item.obj().value_bytes(), item.id_bytes());
            let r = arena.insert(item);
            tree.insert(key, r);
        }
        (arena, tree, pairs)
    }

    fn ids(arena: &Arena, refs: &[ItemRef]) -> Vec<String> {
        refs.iter()
            .map(|&r| String::from_utf8(arena.id(r).to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_ascend_orders_by_value_then_id() {
        let (arena, tree, _) = seed();
        let mut seen = Vec::new();
        tree.ascend(|r| {
            seen.push(r);
            true
        });
        assert_eq!(ids(&arena, &seen), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_descend() {
        let (arena, tree, _) = seed();
        let mut seen = Vec::new();
        tree.descend(|r| {
            seen.push(r);
            true
        });
        assert_eq!(ids(&arena, &seen), vec!["e", "d", "c", "b", "a"]);
    }

    #[test]
    fn test_ascend_range_half_open() {
        let (arena, tree, _) = seed();
        let mut seen = Vec::new();
        tree.ascend_range(b"banana", b"date", |r| {
            seen.push(r);
            true
        });
        assert_eq!(ids(&arena, &seen), vec!["b", "c", "d"]);

        // inverted bounds yield nothing
        seen.clear();
        tree.ascend_range(b"date", b"banana", |r| {
            seen.push(r);
            true
        });
        assert!(seen.is_empty());
    }

    #[test]
    fn test_descend_range() {
        let (arena, tree, _) = seed();
        let mut seen = Vec::new();
        tree.descend_range(b"date", b"banana", |r| {
            seen.push(r);
            true
        });
        assert_eq!(ids(&arena, &seen), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_remove() {
        let (arena, mut tree, _) = seed();
        let key = ValueKey::new(Bytes::from_static(b"banana"), Bytes::from_static(b"c"));
        tree.remove(&key);
        assert_eq!(tree.len(), 4);
        let mut seen = Vec::new();
        tree.ascend(|r| {
            seen.push(r);
            true
        });
        assert_eq!(ids(&arena, &seen), vec!["a", "b", "d", "e"]);
    }
}
