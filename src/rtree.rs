//! Bounding-box index over arena item references.
//!
//! Storage and rectangle queries ride on an R*-tree; the `nearby` traversal
//! is a best-first walk over the tree's nodes ordered by squared minimum
//! box-to-box distance, so entries surface in non-decreasing distance from
//! the query box.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rstar::{ParentNode, RTree, RTreeNode, RTreeObject, AABB};

use crate::arena::ItemRef;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BoxEntry {
    pub min: [f64; 2],
    pub max: [f64; 2],
    pub item: ItemRef,
}

impl RTreeObject for BoxEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

#[derive(Debug)]
pub(crate) struct BoxIndex {
    tree: RTree<BoxEntry>,
}

impl BoxIndex {
    pub fn new() -> BoxIndex {
        BoxIndex { tree: RTree::new() }
    }

    pub fn insert(&mut self, min: [f64; 2], max: [f64; 2], item: ItemRef) {
        self.tree.insert(BoxEntry { min, max, item });
    }

    /// Removes the entry matching both the box and the item reference.
    pub fn delete(&mut self, min: [f64; 2], max: [f64; 2], item: ItemRef) {
        self.tree.remove(&BoxEntry { min, max, item });
    }

    pub fn count(&self) -> usize {
        self.tree.size()
    }

    /// Yields every entry whose box intersects the query rectangle.
    pub fn search(&self, min: [f64; 2], max: [f64; 2], mut f: impl FnMut(&BoxEntry) -> bool) {
        let query = AABB::from_corners(min, max);
        for entry in self.tree.locate_in_envelope_intersecting(&query) {
            if !f(entry) {
                return;
            }
        }
    }

    /// Full traversal in storage order.
    pub fn scan(&self, mut f: impl FnMut(&BoxEntry) -> bool) {
        for entry in self.tree.iter() {
            if !f(entry) {
                return;
            }
        }
    }

    /// Overall bounds across all entries, or `None` when empty.
    pub fn bounds(&self) -> Option<([f64; 2], [f64; 2])> {
        if self.tree.size() == 0 {
            return None;
        }
        let envelope = self.tree.root().envelope();
        Some((envelope.lower(), envelope.upper()))
    }

    /// Yields entries in non-decreasing squared box distance from the query
    /// box, passing the distance alongside each entry.
    pub fn nearby(
        &self,
        min: [f64; 2],
        max: [f64; 2],
        mut f: impl FnMut(&BoxEntry, f64) -> bool,
    ) {
        if self.tree.size() == 0 {
            return;
        }
        let root = self.tree.root();
        let mut queue = BinaryHeap::new();
        queue.push(QueueEntry {
            dist: box_dist(min, max, &root.envelope()),
            node: QueueNode::Parent(root),
        });
        while let Some(QueueEntry { dist, node }) = queue.pop() {
            match node {
                QueueNode::Parent(parent) => {
                    for child in parent.children() {
                        match child {
                            RTreeNode::Leaf(entry) => queue.push(QueueEntry {
                                dist: box_dist(min, max, &entry.envelope()),
                                node: QueueNode::Leaf(entry),
                            }),
                            RTreeNode::Parent(inner) => queue.push(QueueEntry {
                                dist: box_dist(min, max, &inner.envelope()),
                                node: QueueNode::Parent(inner),
                            }),
                        }
                    }
                }
                QueueNode::Leaf(entry) => {
                    if !f(entry, dist) {
                        return;
                    }
                }
            }
        }
    }
}

/// Squared minimum distance between the query box and an envelope.
fn box_dist(qmin: [f64; 2], qmax: [f64; 2], envelope: &AABB<[f64; 2]>) -> f64 {
    let lower = envelope.lower();
    let upper = envelope.upper();
    let mut dist = 0.0;
    for axis in 0..2 {
        let min = qmin[axis].max(lower[axis]);
        let max = qmax[axis].min(upper[axis]);
        if min > max {
            dist += (min - max) * (min - max);
        }
    }
    dist
}

enum QueueNode<'a> {
    Parent(&'a ParentNode<BoxEntry>),
    Leaf(&'a BoxEntry),
}

struct QueueEntry<'a> {
    dist: f64,
    node: QueueNode<'a>,
}

impl PartialEq for QueueEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl Eq for QueueEntry<'_> {}

impl PartialOrd for QueueEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry<'_> {
    // reversed so the binary heap pops the smallest distance first
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.total_cmp(&self.dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::item::Item;
    use crate::object::GeoObject;
    use bytes::Bytes;
    use geo::Point;
    use rand::prelude::*;

    fn make_ref(arena: &mut Arena, i: usize) -> ItemRef {
        arena.insert(Item::new(
            Bytes::from(format!("{i}").into_bytes()),
            GeoObject::Point(Point::new(0.0, 0.0)),
            false,
        ))
    }

    fn rand_boxes(n: usize, points: bool) -> Vec<([f64; 2], [f64; 2])> {
        let mut rng = rand::thread_rng();
        (0..n)
            .map(|_| {
                let min = [
                    rng.gen::<f64>() * 340.0 - 170.0,
                    rng.gen::<f64>() * 160.0 - 80.0,
                ];
                let max = if points {
                    min
                } else {
                    [min[0] + rng.gen::<f64>(), min[1] + rng.gen::<f64>()]
                };
                (min, max)
            })
            .collect()
    }

    fn brute_dist(amin: [f64; 2], amax: [f64; 2], bmin: [f64; 2], bmax: [f64; 2]) -> f64 {
        let mut dist = 0.0;
        for axis in 0..2 {
            let min = amin[axis].max(bmin[axis]);
            let max = amax[axis].min(bmax[axis]);
            if min > max {
                dist += (min - max) * (min - max);
            }
        }
        dist
    }

    #[test]
    fn test_insert_search_delete() {
        let mut arena = Arena::new();
        let mut index = BoxIndex::new();
        let boxes = rand_boxes(1000, false);
        let refs: Vec<ItemRef> = (0..boxes.len()).map(|i| make_ref(&mut arena, i)).collect();
        for (i, &(min, max)) in boxes.iter().enumerate() {
            index.insert(min, max, refs[i]);
        }
        assert_eq!(index.count(), boxes.len());

        let qmin = [-50.0, -50.0];
        let qmax = [50.0, 50.0];
        let mut found = Vec::new();
        index.search(qmin, qmax, |entry| {
            found.push(entry.item);
            true
        });
        let expected: Vec<ItemRef> = boxes
            .iter()
            .enumerate()
            .filter(|(_, &(min, max))| brute_dist(qmin, qmax, min, max) == 0.0)
            .map(|(i, _)| refs[i])
            .collect();
        assert_eq!(found.len(), expected.len());
        for r in &expected {
            assert!(found.contains(r));
        }

        // delete half and re-check the count
        for (i, &(min, max)) in boxes.iter().enumerate().take(500) {
            index.delete(min, max, refs[i]);
        }
        assert_eq!(index.count(), 500);
        let mut scanned = 0;
        index.scan(|_| {
            scanned += 1;
            true
        });
        assert_eq!(scanned, 500);
    }

    #[test]
    fn test_bounds() {
        let mut arena = Arena::new();
        let mut index = BoxIndex::new();
        assert_eq!(index.bounds(), None);

        let a = make_ref(&mut arena, 0);
        let b = make_ref(&mut arena, 1);
        index.insert([1.0, 2.0], [1.0, 2.0], a);
        index.insert([3.0, 4.0], [3.0, 4.0], b);
        assert_eq!(index.bounds(), Some(([1.0, 2.0], [3.0, 4.0])));

        index.delete([3.0, 4.0], [3.0, 4.0], b);
        assert_eq!(index.bounds(), Some(([1.0, 2.0], [1.0, 2.0])));
    }

    #[test]
    fn test_nearby_orders_by_box_distance() {
        let mut arena = Arena::new();
        let mut index = BoxIndex::new();
        let boxes = rand_boxes(500, true);
        let refs: Vec<ItemRef> = (0..boxes.len()).map(|i| make_ref(&mut arena, i)).collect();
        for (i, &(min, max)) in boxes.iter().enumerate() {
            index.insert(min, max, refs[i]);
        }

        let target = [7.5, -3.25];
        let mut dists = Vec::new();
        index.nearby(target, target, |_, dist| {
            dists.push(dist);
            true
        });
        assert_eq!(dists.len(), boxes.len());
        for pair in dists.windows(2) {
            assert!(pair[0] <= pair[1]);
        }

        let mut expected: Vec<f64> = boxes
            .iter()
            .map(|&(min, max)| brute_dist(target, target, min, max))
            .collect();
        expected.sort_by(f64::total_cmp);
        assert_eq!(dists, expected);
    }

    #[test]
    fn test_nearby_early_exit() {
        let mut arena = Arena::new();
        let mut index = BoxIndex::new();
        for (i, &(min, max)) in rand_boxes(100, true).iter().enumerate() {
            let r = make_ref(&mut arena, i);
            index.insert(min, max, r);
        }
        let mut count = 0;
        index.nearby([0.0, 0.0], [0.0, 0.0], |_, _| {
            count += 1;
            count < 5
        });
        assert_eq!(count, 5);
    }
}
