//! Identifier-ordered B-tree over arena item references.
//!
//! Keys are derived on the fly from each item's identifier, so no key bytes
//! are duplicated in the tree. Nodes hold up to [`MAX_ITEMS`] entries and are
//! rebalanced by merge or rotation when they fall below the minimum fill.

use crate::arena::{Arena, ItemRef};

const MAX_ITEMS: usize = 31; // use an odd number
const MIN_ITEMS: usize = MAX_ITEMS * 40 / 100;

#[derive(Debug, Default)]
struct Node {
    items: Vec<ItemRef>,
    // empty for leaves, items.len()+1 for inner nodes
    children: Vec<Box<Node>>,
}

#[derive(Debug, Default)]
pub(crate) struct BTree {
    root: Option<Box<Node>>,
    length: usize,
}

impl Node {
    fn leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn find(&self, arena: &Arena, key: &[u8]) -> (usize, bool) {
        let (mut i, mut j) = (0, self.items.len());
        while i < j {
            let h = i + (j - i) / 2;
            if key >= arena.id(self.items[h]) {
                i = h + 1;
            } else {
                j = h;
            }
        }
        if i > 0 && arena.id(self.items[i - 1]) >= key {
            (i - 1, true)
        } else {
            (i, false)
        }
    }

    /// Splits a full node at the median. The median moves up to the caller
    /// and the keys after it become a new right sibling.
    fn split(&mut self) -> (ItemRef, Box<Node>) {
        let mid = MAX_ITEMS / 2;
        let mut right = Box::new(Node::default());
        right.items = self.items.split_off(mid + 1);
        let median = self.items.pop().expect("split of non-full node");
        if !self.leaf() {
            right.children = self.children.split_off(mid + 1);
        }
        (median, right)
    }

    fn set(&mut self, arena: &Arena, item: ItemRef) -> Option<ItemRef> {
        let (i, found) = self.find(arena, arena.id(item));
        if found {
            return Some(std::mem::replace(&mut self.items[i], item));
        }
        if self.leaf() {
            self.items.insert(i, item);
            return None;
        }
        let prev = self.children[i].set(arena, item);
        if prev.is_some() {
            return prev;
        }
        if self.children[i].items.len() == MAX_ITEMS {
            let (median, right) = self.children[i].split();
            self.items.insert(i, median);
            self.children.insert(i + 1, right);
        }
        None
    }

    // key == None deletes the maximum of the subtree
    fn delete(&mut self, arena: &Arena, key: Option<&[u8]>) -> Option<ItemRef> {
        let (mut i, found) = match key {
            None => (self.items.len() - 1, true),
            Some(key) => self.find(arena, key),
        };
        if self.leaf() {
            if found {
                return Some(self.items.remove(i));
            }
            return None;
        }

        let prev = if found {
            if key.is_none() {
                i += 1;
                self.children[i].delete(arena, None)
            } else {
                // delete-by-copy: promote the left subtree's maximum
                let max_item = self.children[i]
                    .delete(arena, None)
                    .expect("non-empty subtree");
                Some(std::mem::replace(&mut self.items[i], max_item))
            }
        } else {
            self.children[i].delete(arena, key)
        };
        prev?;

        if self.children[i].items.len() < MIN_ITEMS {
            self.rebalance(i);
        }
        prev
    }

    fn rebalance(&mut self, mut i: usize) {
        if i == self.items.len() {
            i -= 1;
        }
        let left_len = self.children[i].items.len();
        let right_len = self.children[i + 1].items.len();
        if left_len + right_len + 1 < MAX_ITEMS {
            // merge left + separator + right
            let separator = self.items.remove(i);
            let mut right = self.children.remove(i + 1);
            let left = &mut self.children[i];
            left.items.push(separator);
            left.items.append(&mut right.items);
            left.children.append(&mut right.children);
        } else if left_len > right_len {
            // rotate the left sibling's maximum through the separator
            let (a, b) = self.children.split_at_mut(i + 1);
            let left = &mut a[i];
            let right = &mut b[0];
            let separator =
                std::mem::replace(&mut self.items[i], left.items.pop().expect("non-empty"));
            right.items.insert(0, separator);
            if let Some(child) = left.children.pop() {
                right.children.insert(0, child);
            }
        } else {
            // rotate the right sibling's minimum through the separator
            let (a, b) = self.children.split_at_mut(i + 1);
            let left = &mut a[i];
            let right = &mut b[0];
            let separator = std::mem::replace(&mut self.items[i], right.items.remove(0));
            left.items.push(separator);
            if !right.children.is_empty() {
                left.children.push(right.children.remove(0));
            }
        }
    }

    fn scan<F: FnMut(ItemRef) -> bool>(&self, f: &mut F) -> bool {
        if self.leaf() {
            for &item in &self.items {
                if !f(item) {
                    return false;
                }
            }
            return true;
        }
        for (i, &item) in self.items.iter().enumerate() {
            if !self.children[i].scan(f) {
                return false;
            }
            if !f(item) {
                return false;
            }
        }
        self.children[self.items.len()].scan(f)
    }

    fn reverse<F: FnMut(ItemRef) -> bool>(&self, f: &mut F) -> bool {
        if self.leaf() {
            for &item in self.items.iter().rev() {
                if !f(item) {
                    return false;
                }
            }
            return true;
        }
        if !self.children[self.items.len()].reverse(f) {
            return false;
        }
        for i in (0..self.items.len()).rev() {
            if !f(self.items[i]) {
                return false;
            }
            if !self.children[i].reverse(f) {
                return false;
            }
        }
        true
    }

    fn ascend<F: FnMut(ItemRef) -> bool>(&self, arena: &Arena, pivot: &[u8], f: &mut F) -> bool {
        let (mut i, found) = self.find(arena, pivot);
        if !found && !self.leaf() && !self.children[i].ascend(arena, pivot, f) {
            return false;
        }
        while i < self.items.len() {
            if !f(self.items[i]) {
                return false;
            }
            if !self.leaf() && !self.children[i + 1].scan(f) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn descend<F: FnMut(ItemRef) -> bool>(&self, arena: &Arena, pivot: &[u8], f: &mut F) -> bool {
        let (i, found) = self.find(arena, pivot);
        let mut i = i as isize;
        if !found {
            if !self.leaf() && !self.children[i as usize].descend(arena, pivot, f) {
                return false;
            }
            i -= 1;
        }
        while i >= 0 {
            let idx = i as usize;
            if !f(self.items[idx]) {
                return false;
            }
            if !self.leaf() && !self.children[idx].reverse(f) {
                return false;
            }
            i -= 1;
        }
        true
    }
}

impl BTree {
    pub fn len(&self) -> usize {
        self.length
    }

    /// Inserts or replaces by the item's identifier, returning the previous
    /// entry if one existed.
    pub fn set(&mut self, arena: &Arena, item: ItemRef) -> Option<ItemRef> {
        let Some(root) = self.root.as_deref_mut() else {
            let mut node = Box::new(Node::default());
            node.items.push(item);
            self.root = Some(node);
            self.length = 1;
            return None;
        };
        let prev = root.set(arena, item);
        if prev.is_some() {
            return prev;
        }
        if root.items.len() == MAX_ITEMS {
            let mut old_root = self.root.take().expect("root exists");
            let (median, right) = old_root.split();
            let mut new_root = Box::new(Node::default());
            new_root.items.push(median);
            new_root.children.push(old_root);
            new_root.children.push(right);
            self.root = Some(new_root);
        }
        self.length += 1;
        None
    }

    pub fn get(&self, arena: &Arena, key: &[u8]) -> Option<ItemRef> {
        let mut node = self.root.as_deref()?;
        loop {
            let (i, found) = node.find(arena, key);
            if found {
                return Some(node.items[i]);
            }
            if node.leaf() {
                return None;
            }
            node = &node.children[i];
        }
    }

    pub fn delete(&mut self, arena: &Arena, key: &[u8]) -> Option<ItemRef> {
        let prev = self.root.as_deref_mut()?.delete(arena, Some(key))?;
        self.length -= 1;
        if self.length == 0 {
            self.root = None;
        } else {
            let collapse = {
                let root = self.root.as_deref().expect("root exists");
                root.items.is_empty() && !root.leaf()
            };
            if collapse {
                let mut old_root = self.root.take().expect("root exists");
                self.root = Some(old_root.children.remove(0));
            }
        }
        Some(prev)
    }

    /// In-order traversal; `f` returning false stops early.
    pub fn scan(&self, mut f: impl FnMut(ItemRef) -> bool) {
        if let Some(root) = &self.root {
            root.scan(&mut f);
        }
    }

    /// Reverse-order traversal.
    pub fn reverse(&self, mut f: impl FnMut(ItemRef) -> bool) {
        if let Some(root) = &self.root {
            root.reverse(&mut f);
        }
    }

    /// In-order traversal starting at the first key >= `pivot`.
    pub fn ascend(&self, arena: &Arena, pivot: &[u8], mut f: impl FnMut(ItemRef) -> bool) {
        if let Some(root) = &self.root {
            root.ascend(arena, pivot, &mut f);
        }
    }

    /// Reverse-order traversal starting at the last key <= `pivot`.
    pub fn descend(&self, arena: &Arena, pivot: &[u8], mut f: impl FnMut(ItemRef) -> bool) {
        if let Some(root) = &self.root {
            root.descend(arena, pivot, &mut f);
        }
    }
}
