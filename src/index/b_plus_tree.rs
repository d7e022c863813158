use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

use bincode::{Decode, Encode};

use crate::buffer::buffer_pool_manager::{BufferPoolManager, Frame};
use crate::common::comparator::KeyComparator;
use crate::common::page_id::{PageId, INVALID_PAGE_ID};
use crate::common::rid::Rid;
use crate::common::transaction::Transaction;
use crate::storage::internal_page::BPlusTreeInternalPage;
use crate::storage::leaf_page::BPlusTreeLeafPage;
use crate::storage::page::{corrupt_page, peek_page_type, PageType};

use super::iterator::IndexIterator;

/// A disk-resident B+ tree index keyed on `K`, with `size()` always in
/// `[min_size(), max_size()]` for every page but the root.
///
/// Structural changes (`insert`/`remove`) take `&mut self`: this crate runs
/// one writer at a time per tree rather than crabbing latches page by page,
/// so the root page id and the pages it reaches are never read and written
/// by two operations concurrently. Lookups and iteration only need `&self`.
pub struct BPlusTree<K: Clone + Debug + Encode + Decode> {
    bpm: Arc<BufferPoolManager>,
    comparator: Box<dyn KeyComparator<K>>,
    leaf_max_size: u32,
    internal_max_size: u32,
    root_page_id: PageId,
}

impl<K: Clone + Debug + Encode + Decode> BPlusTree<K> {
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        comparator: Box<dyn KeyComparator<K>>,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Self {
        BPlusTree {
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            root_page_id: INVALID_PAGE_ID,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Rehydrates a tree whose root was previously recorded (e.g. in a
    /// [`super::header_page::HeaderPage`]).
    pub fn with_root(mut self, root_page_id: PageId) -> Self {
        self.root_page_id = root_page_id;
        self
    }

    fn fetch_internal(&self, page_id: PageId) -> (Frame, BPlusTreeInternalPage<K>) {
        let frame = self
            .bpm
            .fetch_page(page_id)
            .expect("internal page must be resident");
        let bytes = *frame.read().unwrap();
        let page = BPlusTreeInternalPage::decode(page_id, &bytes);
        (frame, page)
    }

    fn fetch_leaf(&self, page_id: PageId) -> (Frame, BPlusTreeLeafPage<K>) {
        let frame = self
            .bpm
            .fetch_page(page_id)
            .expect("leaf page must be resident");
        let bytes = *frame.read().unwrap();
        let page = BPlusTreeLeafPage::decode(page_id, &bytes);
        (frame, page)
    }

    fn write_back_internal(&self, frame: &Frame, page: &BPlusTreeInternalPage<K>) {
        *frame.write().unwrap() = page.encode();
    }

    fn write_back_leaf(&self, frame: &Frame, page: &BPlusTreeLeafPage<K>) {
        *frame.write().unwrap() = page.encode();
    }

    /// Walks from the root to the leaf that would hold `key`, unpinning
    /// every internal page along the way and leaving the leaf pinned for
    /// the caller to unpin.
    fn find_leaf(&self, key: &K) -> Option<(Frame, BPlusTreeLeafPage<K>)> {
        if self.root_page_id == INVALID_PAGE_ID {
            return None;
        }
        let mut current_id = self.root_page_id;
        loop {
            let frame = self.bpm.fetch_page(current_id)?;
            let bytes = *frame.read().unwrap();
            match peek_page_type(&bytes)? {
                PageType::Leaf => {
                    let leaf = BPlusTreeLeafPage::decode(current_id, &bytes);
                    return Some((frame, leaf));
                }
                PageType::Internal => {
                    let internal = BPlusTreeInternalPage::decode(current_id, &bytes);
                    let next = internal.lookup(key, self.comparator.as_ref());
                    self.bpm.unpin_page(current_id, false);
                    current_id = next;
                }
            }
        }
    }

    pub fn get_value(&self, key: &K) -> Option<Rid> {
        let (_frame, leaf) = self.find_leaf(key)?;
        let result = leaf.lookup(key, self.comparator.as_ref());
        self.bpm.unpin_page(leaf.page_id, false);
        result
    }

    /// Inserts `key`/`rid`. Returns `false` if `key` is already present.
    pub fn insert(&mut self, key: K, rid: Rid, _txn: &Transaction) -> bool {
        if self.root_page_id == INVALID_PAGE_ID {
            return self.start_new_tree(key, rid);
        }

        let Some((leaf_frame, mut leaf)) = self.find_leaf(&key) else {
            return false;
        };
        if !leaf.insert(key, rid, self.comparator.as_ref()) {
            self.bpm.unpin_page(leaf.page_id, false);
            return false;
        }

        if !leaf.is_full() {
            self.write_back_leaf(&leaf_frame, &leaf);
            self.bpm.unpin_page(leaf.page_id, true);
            return true;
        }

        let (new_page_id, new_frame) = self
            .bpm
            .new_page()
            .expect("buffer pool exhausted while splitting a leaf");
        let (promoted_key, sibling) = leaf.split(new_page_id);
        self.write_back_leaf(&new_frame, &sibling);
        self.bpm.unpin_page(new_page_id, true);
        let old_page_id = leaf.page_id;
        let parent_id = leaf.parent_page_id();
        self.write_back_leaf(&leaf_frame, &leaf);
        self.bpm.unpin_page(old_page_id, true);

        self.insert_into_parent(old_page_id, promoted_key, new_page_id, parent_id);
        true
    }

    fn start_new_tree(&mut self, key: K, rid: Rid) -> bool {
        let (page_id, frame) = self
            .bpm
            .new_page()
            .expect("buffer pool exhausted starting a new tree");
        let mut leaf = BPlusTreeLeafPage::<K>::new(page_id, self.leaf_max_size, INVALID_PAGE_ID);
        leaf.insert(key, rid, self.comparator.as_ref());
        self.write_back_leaf(&frame, &leaf);
        self.bpm.unpin_page(page_id, true);
        self.root_page_id = page_id;
        true
    }

    /// Attaches `new_child` (reached via `key`) after `old_child` in the
    /// page at `parent_id`, growing a new root if `old_child` had none, and
    /// recursing up the parent chain if that insert overflows the parent.
    fn insert_into_parent(&mut self, old_child: PageId, key: K, new_child: PageId, parent_id: PageId) {
        if parent_id == INVALID_PAGE_ID {
            let (new_root_id, new_root_frame) = self
                .bpm
                .new_page()
                .expect("buffer pool exhausted growing a new root");
            let mut root =
                BPlusTreeInternalPage::<K>::new(new_root_id, self.internal_max_size, INVALID_PAGE_ID);
            root.populate_new_root(old_child, key, new_child);
            self.write_back_internal(&new_root_frame, &root);
            self.bpm.unpin_page(new_root_id, true);
            self.root_page_id = new_root_id;
            self.reparent(old_child, new_root_id);
            self.reparent(new_child, new_root_id);
            return;
        }

        let (parent_frame, mut parent) = self.fetch_internal(parent_id);
        parent.insert_node_after(old_child, key, new_child);
        self.reparent(new_child, parent_id);

        if !parent.is_full() {
            self.write_back_internal(&parent_frame, &parent);
            self.bpm.unpin_page(parent_id, true);
            return;
        }

        let (new_page_id, new_frame) = self
            .bpm
            .new_page()
            .expect("buffer pool exhausted splitting an internal page");
        let (promoted_key, sibling) = parent.split(new_page_id);
        for &child in sibling.children() {
            self.reparent(child, new_page_id);
        }
        self.write_back_internal(&new_frame, &sibling);
        self.bpm.unpin_page(new_page_id, true);
        let grandparent = parent.parent_page_id();
        self.write_back_internal(&parent_frame, &parent);
        self.bpm.unpin_page(parent_id, true);

        self.insert_into_parent(parent_id, promoted_key, new_page_id, grandparent);
    }

    fn reparent(&self, child_id: PageId, new_parent_id: PageId) {
        let frame = self
            .bpm
            .fetch_page(child_id)
            .expect("child page must be resident to reparent it");
        let bytes = *frame.read().unwrap();
        match peek_page_type(&bytes).unwrap_or_else(|| corrupt_page()) {
            PageType::Leaf => {
                let mut leaf = BPlusTreeLeafPage::<K>::decode(child_id, &bytes);
                leaf.set_parent_page_id(new_parent_id);
                self.write_back_leaf(&frame, &leaf);
            }
            PageType::Internal => {
                let mut internal = BPlusTreeInternalPage::<K>::decode(child_id, &bytes);
                internal.set_parent_page_id(new_parent_id);
                self.write_back_internal(&frame, &internal);
            }
        }
        self.bpm.unpin_page(child_id, true);
    }

    /// Removes `key`. Returns `false` if it wasn't present.
    pub fn remove(&mut self, key: &K, _txn: &Transaction) -> bool {
        if self.root_page_id == INVALID_PAGE_ID {
            return false;
        }
        let Some((leaf_frame, mut leaf)) = self.find_leaf(key) else {
            return false;
        };
        if !leaf.remove(key, self.comparator.as_ref()) {
            self.bpm.unpin_page(leaf.page_id, false);
            return false;
        }
        let page_id = leaf.page_id;
        self.write_back_leaf(&leaf_frame, &leaf);
        self.bpm.unpin_page(page_id, true);

        self.coalesce_or_redistribute_leaf(page_id);
        true
    }

    fn coalesce_or_redistribute_leaf(&mut self, page_id: PageId) {
        let (frame, mut leaf) = self.fetch_leaf(page_id);
        if leaf.is_root() {
            let empty = leaf.size() == 0;
            self.bpm.unpin_page(page_id, false);
            if empty {
                self.bpm.delete_page(page_id).ok();
                self.root_page_id = INVALID_PAGE_ID;
            }
            return;
        }
        if !leaf.is_underflow() {
            self.bpm.unpin_page(page_id, false);
            return;
        }

        let parent_id = leaf.parent_page_id();
        let (parent_frame, mut parent) = self.fetch_internal(parent_id);
        let index = parent
            .value_index(page_id)
            .expect("leaf must be a child of its recorded parent");

        if index > 0 {
            let left_id = parent.child_at(index - 1);
            let (left_frame, mut left) = self.fetch_leaf(left_id);
            if left.size() > left.min_size() {
                let new_key = left.move_last_to_front_of(&mut leaf);
                parent.set_key_at(index - 1, new_key);
                self.write_back_leaf(&left_frame, &left);
                self.bpm.unpin_page(left_id, true);
                self.write_back_leaf(&frame, &leaf);
                self.bpm.unpin_page(page_id, true);
                self.write_back_internal(&parent_frame, &parent);
                self.bpm.unpin_page(parent_id, true);
                return;
            }
            leaf.move_all_to(&mut left);
            self.write_back_leaf(&left_frame, &left);
            self.bpm.unpin_page(left_id, true);
            self.bpm.unpin_page(page_id, false);
            self.bpm.delete_page(page_id).ok();
            parent.remove(index);
            self.write_back_internal(&parent_frame, &parent);
            self.bpm.unpin_page(parent_id, true);
            self.coalesce_or_redistribute_internal(parent_id);
            return;
        }

        let right_id = parent.child_at(index + 1);
        let (right_frame, mut right) = self.fetch_leaf(right_id);
        if right.size() > right.min_size() {
            let new_key = right.move_first_to_end_of(&mut leaf);
            parent.set_key_at(index, new_key);
            self.write_back_leaf(&right_frame, &right);
            self.bpm.unpin_page(right_id, true);
            self.write_back_leaf(&frame, &leaf);
            self.bpm.unpin_page(page_id, true);
            self.write_back_internal(&parent_frame, &parent);
            self.bpm.unpin_page(parent_id, true);
            return;
        }
        right.move_all_to(&mut leaf);
        self.write_back_leaf(&frame, &leaf);
        self.bpm.unpin_page(page_id, true);
        self.bpm.unpin_page(right_id, false);
        self.bpm.delete_page(right_id).ok();
        parent.remove(index + 1);
        self.write_back_internal(&parent_frame, &parent);
        self.bpm.unpin_page(parent_id, true);
        self.coalesce_or_redistribute_internal(parent_id);
    }

    fn coalesce_or_redistribute_internal(&mut self, page_id: PageId) {
        let (frame, mut internal) = self.fetch_internal(page_id);
        if internal.is_root() {
            if internal.size() == 1 {
                let only_child = internal.first_child();
                self.bpm.unpin_page(page_id, false);
                self.bpm.delete_page(page_id).ok();
                self.reparent(only_child, INVALID_PAGE_ID);
                self.root_page_id = only_child;
            } else {
                self.bpm.unpin_page(page_id, false);
            }
            return;
        }
        if internal.size() >= internal.min_size() {
            self.bpm.unpin_page(page_id, false);
            return;
        }

        let parent_id = internal.parent_page_id();
        let (parent_frame, mut parent) = self.fetch_internal(parent_id);
        let index = parent
            .value_index(page_id)
            .expect("internal page must be a child of its recorded parent");

        if index > 0 {
            let left_id = parent.child_at(index - 1);
            let (left_frame, mut left) = self.fetch_internal(left_id);
            if left.size() > left.min_size() {
                let parent_key = parent.key_at(index - 1);
                let new_sep = left.move_last_to_front_of(&mut internal, parent_key);
                self.reparent(internal.first_child(), page_id);
                parent.set_key_at(index - 1, new_sep);
                self.write_back_internal(&left_frame, &left);
                self.bpm.unpin_page(left_id, true);
                self.write_back_internal(&frame, &internal);
                self.bpm.unpin_page(page_id, true);
                self.write_back_internal(&parent_frame, &parent);
                self.bpm.unpin_page(parent_id, true);
                return;
            }
            let parent_key = parent.key_at(index - 1);
            internal.move_all_to(&mut left, parent_key);
            let moved_children: Vec<PageId> = left.children().to_vec();
            self.write_back_internal(&left_frame, &left);
            self.bpm.unpin_page(left_id, true);
            for child in moved_children {
                self.reparent(child, left_id);
            }
            self.bpm.unpin_page(page_id, false);
            self.bpm.delete_page(page_id).ok();
            parent.remove(index);
            self.write_back_internal(&parent_frame, &parent);
            self.bpm.unpin_page(parent_id, true);
            self.coalesce_or_redistribute_internal(parent_id);
            return;
        }

        let right_id = parent.child_at(index + 1);
        let (right_frame, mut right) = self.fetch_internal(right_id);
        if right.size() > right.min_size() {
            let parent_key = parent.key_at(index);
            let new_sep = right.move_first_to_end_of(&mut internal, parent_key);
            let moved_child = *internal.children().last().expect("non-empty page");
            self.reparent(moved_child, page_id);
            parent.set_key_at(index, new_sep);
            self.write_back_internal(&right_frame, &right);
            self.bpm.unpin_page(right_id, true);
            self.write_back_internal(&frame, &internal);
            self.bpm.unpin_page(page_id, true);
            self.write_back_internal(&parent_frame, &parent);
            self.bpm.unpin_page(parent_id, true);
            return;
        }
        let parent_key = parent.key_at(index);
        right.move_all_to(&mut internal, parent_key);
        let moved_children: Vec<PageId> = internal.children().to_vec();
        self.write_back_internal(&frame, &internal);
        self.bpm.unpin_page(page_id, true);
        for child in moved_children {
            self.reparent(child, page_id);
        }
        self.bpm.unpin_page(right_id, false);
        self.bpm.delete_page(right_id).ok();
        parent.remove(index + 1);
        self.write_back_internal(&parent_frame, &parent);
        self.bpm.unpin_page(parent_id, true);
        self.coalesce_or_redistribute_internal(parent_id);
    }

    /// An iterator over every entry in key order.
    pub fn begin(&self) -> IndexIterator<K> {
        if self.root_page_id == INVALID_PAGE_ID {
            return IndexIterator::empty();
        }
        let mut current_id = self.root_page_id;
        loop {
            let frame = self
                .bpm
                .fetch_page(current_id)
                .expect("page must be resident");
            let bytes = *frame.read().unwrap();
            match peek_page_type(&bytes).unwrap_or_else(|| corrupt_page()) {
                PageType::Leaf => {
                    self.bpm.unpin_page(current_id, false);
                    return IndexIterator::new(Arc::clone(&self.bpm), current_id, 0);
                }
                PageType::Internal => {
                    let internal = BPlusTreeInternalPage::<K>::decode(current_id, &bytes);
                    self.bpm.unpin_page(current_id, false);
                    current_id = internal.first_child();
                }
            }
        }
    }

    /// An iterator starting at the first entry not less than `key`.
    pub fn begin_at(&self, key: &K) -> IndexIterator<K> {
        let Some((_frame, leaf)) = self.find_leaf(key) else {
            return IndexIterator::empty();
        };
        let pos = leaf
            .keys()
            .iter()
            .position(|k| self.comparator.compare(k, key) != Ordering::Less)
            .unwrap_or(leaf.size());
        self.bpm.unpin_page(leaf.page_id, false);
        IndexIterator::new(Arc::clone(&self.bpm), leaf.page_id, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::comparator::NaturalOrderComparator;
    use crate::disk::disk_manager::DiskManager;

    fn new_tree(leaf_max: u32, internal_max: u32) -> BPlusTree<i32> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        let bpm = Arc::new(BufferPoolManager::new(64, DiskManager::new(path.to_str().unwrap())));
        BPlusTree::new(bpm, Box::new(NaturalOrderComparator::new()), leaf_max, internal_max)
    }

    #[test]
    fn insert_and_get_value_single_leaf() {
        let mut tree = new_tree(4, 4);
        let txn = Transaction::none();
        for i in 0..3 {
            assert!(tree.insert(i, Rid::new(i as i64, 0), &txn));
        }
        for i in 0..3 {
            assert_eq!(tree.get_value(&i), Some(Rid::new(i as i64, 0)));
        }
        assert_eq!(tree.get_value(&99), None);
    }

    #[test]
    fn insert_duplicate_key_is_rejected() {
        let mut tree = new_tree(4, 4);
        let txn = Transaction::none();
        assert!(tree.insert(1, Rid::new(1, 0), &txn));
        assert!(!tree.insert(1, Rid::new(2, 0), &txn));
    }

    /// S4 — inserting enough keys to overflow a leaf's max size grows the
    /// tree past one level and every key stays reachable afterward.
    #[test]
    fn insert_past_leaf_capacity_splits_and_stays_searchable() {
        let mut tree = new_tree(4, 4);
        let txn = Transaction::none();
        for i in 0..50 {
            assert!(tree.insert(i, Rid::new(i as i64, 0), &txn));
        }
        for i in 0..50 {
            assert_eq!(tree.get_value(&i), Some(Rid::new(i as i64, 0)), "missing key {i}");
        }
    }

    /// S5 — an in-order scan visits every inserted key exactly once, in
    /// ascending order, regardless of insertion order.
    #[test]
    fn full_scan_yields_sorted_keys() {
        let mut tree = new_tree(4, 4);
        let txn = Transaction::none();
        let values = [40, 10, 30, 20, 50, 5, 35, 25, 15, 45];
        for &v in &values {
            tree.insert(v, Rid::new(v as i64, 0), &txn);
        }
        let collected: Vec<i32> = tree.begin().map(|(k, _)| k).collect();
        let mut expected = values.to_vec();
        expected.sort();
        assert_eq!(collected, expected);
    }

    #[test]
    fn begin_at_starts_at_first_key_not_less_than_target() {
        let mut tree = new_tree(4, 4);
        let txn = Transaction::none();
        for v in [10, 20, 30, 40, 50] {
            tree.insert(v, Rid::new(v as i64, 0), &txn);
        }
        let collected: Vec<i32> = tree.begin_at(&25).map(|(k, _)| k).collect();
        assert_eq!(collected, vec![30, 40, 50]);
    }

    /// S6 — removing every inserted key empties the tree back to nothing.
    #[test]
    fn remove_everything_leaves_an_empty_tree() {
        let mut tree = new_tree(4, 4);
        let txn = Transaction::none();
        for i in 0..30 {
            tree.insert(i, Rid::new(i as i64, 0), &txn);
        }
        for i in 0..30 {
            assert!(tree.remove(&i, &txn), "failed to remove {i}");
        }
        assert!(tree.is_empty());
        assert_eq!(tree.get_value(&0), None);
    }

    #[test]
    fn remove_triggers_merge_and_redistribute_paths() {
        let mut tree = new_tree(4, 4);
        let txn = Transaction::none();
        for i in 0..40 {
            tree.insert(i, Rid::new(i as i64, 0), &txn);
        }
        // Remove a scattered subset so some leaves underflow via borrowing
        // and others via merging.
        for i in (0..40).step_by(2) {
            tree.remove(&i, &txn);
        }
        for i in 0..40 {
            if i % 2 == 0 {
                assert_eq!(tree.get_value(&i), None);
            } else {
                assert_eq!(tree.get_value(&i), Some(Rid::new(i as i64, 0)));
            }
        }
    }

    #[test]
    fn remove_missing_key_returns_false() {
        let mut tree = new_tree(4, 4);
        let txn = Transaction::none();
        tree.insert(1, Rid::new(1, 0), &txn);
        assert!(!tree.remove(&99, &txn));
    }
}
