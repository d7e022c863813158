use std::cmp::Ordering;
use std::fmt::Debug;

use bincode::{Decode, Encode};

use crate::common::comparator::KeyComparator;
use crate::common::page_id::PageId;
use crate::disk::disk_manager::PAGE_SIZE;

use super::page::{bincode_config, corrupt_page, decode_header_checked, BPlusTreePageHeader, PageType};

/// Derives `max_size` for an internal page whose keys encode to `key_size`
/// bytes: `(PAGE_SIZE - header_size) / entry_size`, where each entry is one
/// key plus one child [`PageId`].
pub fn derive_max_size(key_size: usize) -> u32 {
    let header_size = bincode::encode_to_vec(
        BPlusTreePageHeader {
            page_type: PageType::Internal,
            size: 0,
            max_size: 0,
            parent_page_id: 0,
        },
        bincode_config(),
    )
    .expect("header encodes")
    .len();
    let entry_size = key_size + std::mem::size_of::<PageId>();
    ((PAGE_SIZE - header_size) / entry_size) as u32
}

/// A non-leaf page: `size` child pointers separated by `size - 1` keys.
/// `children[i]` holds every key in `[keys[i-1], keys[i])` (with the first
/// and last child unbounded on their open side), so `keys[i]` never needs a
/// matching child of its own the way a leaf's keys pair with RIDs.
pub struct BPlusTreeInternalPage<K: Clone + Debug + Encode + Decode> {
    pub page_id: PageId,
    header: BPlusTreePageHeader,
    keys: Vec<K>,
    children: Vec<PageId>,
}

impl<K: Clone + Debug + Encode + Decode> BPlusTreeInternalPage<K> {
    pub fn new(page_id: PageId, max_size: u32, parent_page_id: PageId) -> Self {
        BPlusTreeInternalPage {
            page_id,
            header: BPlusTreePageHeader {
                page_type: PageType::Internal,
                size: 0,
                max_size,
                parent_page_id,
            },
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.children.len()
    }

    pub fn max_size(&self) -> usize {
        self.header.max_size as usize
    }

    pub fn min_size(&self) -> usize {
        self.max_size().div_ceil(2)
    }

    pub fn is_full(&self) -> bool {
        self.size() > self.max_size()
    }

    pub fn is_underflow(&self) -> bool {
        self.size() < self.min_size()
    }

    pub fn parent_page_id(&self) -> PageId {
        self.header.parent_page_id
    }

    pub fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        self.header.parent_page_id = parent_page_id;
    }

    pub fn is_root(&self) -> bool {
        self.header.is_root()
    }

    pub fn children(&self) -> &[PageId] {
        &self.children
    }

    pub fn first_child(&self) -> PageId {
        self.children[0]
    }

    pub fn child_at(&self, index: usize) -> PageId {
        self.children[index]
    }

    pub fn value_index(&self, child: PageId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    pub fn key_at(&self, index: usize) -> K {
        self.keys[index].clone()
    }

    pub fn set_key_at(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    fn find_child_index(&self, key: &K, cmp: &dyn KeyComparator<K>) -> usize {
        let mut lo = 0usize;
        let mut hi = self.keys.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(&self.keys[mid], key) != Ordering::Greater {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Returns the child that may contain `key`.
    pub fn lookup(&self, key: &K, cmp: &dyn KeyComparator<K>) -> PageId {
        self.children[self.find_child_index(key, cmp)]
    }

    /// Turns a freshly allocated root into `old_child | key | new_child`.
    pub fn populate_new_root(&mut self, old_child: PageId, key: K, new_child: PageId) {
        self.children = vec![old_child, new_child];
        self.keys = vec![key];
        self.header.size = 2;
    }

    /// Inserts `new_child` immediately after `old_child`, with `key` as the
    /// new separator between them.
    pub fn insert_node_after(&mut self, old_child: PageId, key: K, new_child: PageId) {
        let idx = self
            .value_index(old_child)
            .expect("old_child must already be present");
        self.keys.insert(idx, key);
        self.children.insert(idx + 1, new_child);
        self.header.size = self.children.len() as u32;
    }

    /// Splits an overfull page in half, returning the key that should be
    /// promoted to the parent and the new sibling holding the upper half.
    /// The promoted key is removed from both halves, as it now only lives
    /// in the parent.
    pub fn split(&mut self, new_page_id: PageId) -> (K, BPlusTreeInternalPage<K>) {
        let size = self.children.len();
        let mid = size / 2;

        let mut upper_keys = self.keys.split_off(mid - 1);
        let promoted_key = upper_keys.remove(0);
        let upper_children = self.children.split_off(mid);
        self.header.size = self.children.len() as u32;

        let mut sibling =
            BPlusTreeInternalPage::new(new_page_id, self.header.max_size, self.header.parent_page_id);
        sibling.children = upper_children;
        sibling.keys = upper_keys;
        sibling.header.size = sibling.children.len() as u32;

        (promoted_key, sibling)
    }

    /// Removes the child at `index` along with its separator key.
    pub fn remove(&mut self, index: usize) {
        if index == 0 {
            if !self.keys.is_empty() {
                self.keys.remove(0);
            }
        } else {
            self.keys.remove(index - 1);
        }
        self.children.remove(index);
        self.header.size = self.children.len() as u32;
    }

    /// Drains all of `self` into `recipient` (which holds the keys/children
    /// to `self`'s left), reinserting `middle_key` as the separator between
    /// them. Used when a merge empties `self` into its left sibling.
    pub fn move_all_to(&mut self, recipient: &mut Self, middle_key: K) {
        recipient.keys.push(middle_key);
        recipient.keys.append(&mut self.keys);
        recipient.children.append(&mut self.children);
        recipient.header.size = recipient.children.len() as u32;
        self.header.size = 0;
    }

    /// Borrows `self`'s first child onto the end of `recipient` (its left
    /// sibling), during redistribution. Returns the key that should replace
    /// the parent's separator between the two pages.
    pub fn move_first_to_end_of(&mut self, recipient: &mut Self, parent_key: K) -> K {
        let first_child = self.children.remove(0);
        let new_parent_key = self.keys.remove(0);
        recipient.keys.push(parent_key);
        recipient.children.push(first_child);
        recipient.header.size = recipient.children.len() as u32;
        self.header.size = self.children.len() as u32;
        new_parent_key
    }

    /// Borrows `self`'s last child onto the front of `recipient` (its right
    /// sibling), during redistribution. Returns the key that should replace
    /// the parent's separator between the two pages.
    pub fn move_last_to_front_of(&mut self, recipient: &mut Self, parent_key: K) -> K {
        let last_child = self.children.pop().expect("non-empty page");
        let new_parent_key = self.keys.pop().expect("non-empty page");
        recipient.keys.insert(0, parent_key);
        recipient.children.insert(0, last_child);
        recipient.header.size = recipient.children.len() as u32;
        self.header.size = self.children.len() as u32;
        new_parent_key
    }

    pub fn encode(&self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        let cfg = bincode_config();
        let mut offset =
            bincode::encode_into_slice(&self.header, &mut buf, cfg).expect("header fits in page");
        for child in &self.children {
            offset +=
                bincode::encode_into_slice(child, &mut buf[offset..], cfg).expect("children fit");
        }
        for key in &self.keys {
            offset += bincode::encode_into_slice(key, &mut buf[offset..], cfg).expect("keys fit");
        }
        buf
    }

    pub fn decode(page_id: PageId, bytes: &[u8; PAGE_SIZE]) -> Self {
        let cfg = bincode_config();
        let (header, mut offset) = decode_header_checked(bytes, Some(PageType::Internal));

        let num_children = header.size as usize;
        let mut children = Vec::with_capacity(num_children);
        for _ in 0..num_children {
            let (child, n): (PageId, usize) =
                bincode::decode_from_slice(&bytes[offset..], cfg).unwrap_or_else(|_| corrupt_page());
            children.push(child);
            offset += n;
        }

        let num_keys = num_children.saturating_sub(1);
        let mut keys = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            let (key, n): (K, usize) =
                bincode::decode_from_slice(&bytes[offset..], cfg).unwrap_or_else(|_| corrupt_page());
            keys.push(key);
            offset += n;
        }

        BPlusTreeInternalPage {
            page_id,
            header,
            keys,
            children,
        }
    }
}
