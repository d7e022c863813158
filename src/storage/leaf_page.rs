use std::cmp::Ordering;
use std::fmt::Debug;

use bincode::{Decode, Encode};

use crate::common::comparator::KeyComparator;
use crate::common::page_id::{PageId, INVALID_PAGE_ID};
use crate::common::rid::{Rid, RID_SIZE};
use crate::disk::disk_manager::PAGE_SIZE;

use super::page::{bincode_config, corrupt_page, decode_header_checked, BPlusTreePageHeader, PageType};

#[derive(Copy, Clone, Decode, Encode)]
struct LeafFooter {
    next_page_id: PageId,
}

/// Derives `max_size` for a leaf page whose keys encode to `key_size` bytes:
/// `(PAGE_SIZE - header_size - footer_size) / entry_size`. Each entry is one
/// key plus one [`Rid`], and the footer carries the `next_page_id`
/// linked-list pointer.
pub fn derive_max_size(key_size: usize) -> u32 {
    let cfg = bincode_config();
    let header_size = bincode::encode_to_vec(
        BPlusTreePageHeader {
            page_type: PageType::Leaf,
            size: 0,
            max_size: 0,
            parent_page_id: 0,
        },
        cfg,
    )
    .expect("header encodes")
    .len();
    let footer_size = bincode::encode_to_vec(LeafFooter { next_page_id: 0 }, cfg)
        .expect("footer encodes")
        .len();
    let entry_size = key_size + RID_SIZE;
    ((PAGE_SIZE - header_size - footer_size) / entry_size) as u32
}

/// A leaf page: parallel `keys`/`rids` arrays plus a forward pointer to the
/// next leaf, so a full index scan never has to touch an internal page.
pub struct BPlusTreeLeafPage<K: Clone + Debug + Encode + Decode> {
    pub page_id: PageId,
    header: BPlusTreePageHeader,
    next_page_id: PageId,
    keys: Vec<K>,
    rids: Vec<Rid>,
}

impl<K: Clone + Debug + Encode + Decode> BPlusTreeLeafPage<K> {
    pub fn new(page_id: PageId, max_size: u32, parent_page_id: PageId) -> Self {
        BPlusTreeLeafPage {
            page_id,
            header: BPlusTreePageHeader {
                page_type: PageType::Leaf,
                size: 0,
                max_size,
                parent_page_id,
            },
            next_page_id: INVALID_PAGE_ID,
            keys: Vec::new(),
            rids: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.keys.len()
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

    pub fn next_page_id(&self) -> PageId {
        self.next_page_id
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn key_at(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub fn rid_at(&self, index: usize) -> Rid {
        self.rids[index]
    }

    pub fn first_key(&self) -> Option<&K> {
        self.keys.first()
    }

    /// Position of `key`, and whether it is actually present there (vs. the
    /// position it would be inserted at).
    fn find_pos(&self, key: &K, cmp: &dyn KeyComparator<K>) -> (usize, bool) {
        let mut lo = 0usize;
        let mut hi = self.keys.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(&self.keys[mid], key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let exists = lo < self.keys.len() && cmp.compare(&self.keys[lo], key) == Ordering::Equal;
        (lo, exists)
    }

    pub fn lookup(&self, key: &K, cmp: &dyn KeyComparator<K>) -> Option<Rid> {
        let (pos, exists) = self.find_pos(key, cmp);
        exists.then(|| self.rids[pos])
    }

    /// Returns `false` without modifying the page if `key` is already
    /// present — leaf keys are unique.
    pub fn insert(&mut self, key: K, rid: Rid, cmp: &dyn KeyComparator<K>) -> bool {
        let (pos, exists) = self.find_pos(&key, cmp);
        if exists {
            return false;
        }
        self.keys.insert(pos, key);
        self.rids.insert(pos, rid);
        self.header.size = self.keys.len() as u32;
        true
    }

    pub fn remove(&mut self, key: &K, cmp: &dyn KeyComparator<K>) -> bool {
        let (pos, exists) = self.find_pos(key, cmp);
        if !exists {
            return false;
        }
        self.keys.remove(pos);
        self.rids.remove(pos);
        self.header.size = self.keys.len() as u32;
        true
    }

    /// Splits an overfull leaf, keeping the lower half and returning the
    /// first key of the new sibling (the separator to promote, copied
    /// rather than removed: leaves keep every key they hold).
    pub fn split(&mut self, new_page_id: PageId) -> (K, BPlusTreeLeafPage<K>) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid);
        let right_rids = self.rids.split_off(mid);
        self.header.size = self.keys.len() as u32;

        let mut sibling =
            BPlusTreeLeafPage::new(new_page_id, self.header.max_size, self.header.parent_page_id);
        let first_key = right_keys[0].clone();
        sibling.keys = right_keys;
        sibling.rids = right_rids;
        sibling.header.size = sibling.keys.len() as u32;
        sibling.next_page_id = self.next_page_id;
        self.next_page_id = new_page_id;

        (first_key, sibling)
    }

    /// Drains all of `self` into `recipient`, its left sibling, and splices
    /// the linked list around `self`.
    pub fn move_all_to(&mut self, recipient: &mut Self) {
        recipient.keys.append(&mut self.keys);
        recipient.rids.append(&mut self.rids);
        recipient.header.size = recipient.keys.len() as u32;
        recipient.next_page_id = self.next_page_id;
        self.header.size = 0;
    }

    /// Borrows `self`'s first entry onto the end of `recipient` (its left
    /// sibling). Returns `self`'s new first key, which replaces the
    /// parent's separator.
    pub fn move_first_to_end_of(&mut self, recipient: &mut Self) -> K {
        let key = self.keys.remove(0);
        let rid = self.rids.remove(0);
        recipient.keys.push(key);
        recipient.rids.push(rid);
        recipient.header.size = recipient.keys.len() as u32;
        self.header.size = self.keys.len() as u32;
        self.keys[0].clone()
    }

    /// Borrows `self`'s last entry onto the front of `recipient` (its right
    /// sibling). Returns the moved key, which becomes the new separator.
    pub fn move_last_to_front_of(&mut self, recipient: &mut Self) -> K {
        let key = self.keys.pop().expect("non-empty page");
        let rid = self.rids.pop().expect("non-empty page");
        recipient.keys.insert(0, key.clone());
        recipient.rids.insert(0, rid);
        recipient.header.size = recipient.keys.len() as u32;
        self.header.size = self.keys.len() as u32;
        key
    }

    pub fn encode(&self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        let cfg = bincode_config();
        let mut offset =
            bincode::encode_into_slice(&self.header, &mut buf, cfg).expect("header fits in page");
        offset += bincode::encode_into_slice(
            LeafFooter {
                next_page_id: self.next_page_id,
            },
            &mut buf[offset..],
            cfg,
        )
        .expect("footer fits");
        for key in &self.keys {
            offset += bincode::encode_into_slice(key, &mut buf[offset..], cfg).expect("keys fit");
        }
        for rid in &self.rids {
            offset += bincode::encode_into_slice(rid, &mut buf[offset..], cfg).expect("rids fit");
        }
        buf
    }

    pub fn decode(page_id: PageId, bytes: &[u8; PAGE_SIZE]) -> Self {
        let cfg = bincode_config();
        let (header, mut offset) = decode_header_checked(bytes, Some(PageType::Leaf));
        let (footer, n): (LeafFooter, usize) =
            bincode::decode_from_slice(&bytes[offset..], cfg).unwrap_or_else(|_| corrupt_page());
        offset += n;

        let num_entries = header.size as usize;
        let mut keys = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            let (key, n): (K, usize) =
                bincode::decode_from_slice(&bytes[offset..], cfg).unwrap_or_else(|_| corrupt_page());
            keys.push(key);
            offset += n;
        }
        let mut rids = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            let (rid, n): (Rid, usize) =
                bincode::decode_from_slice(&bytes[offset..], cfg).unwrap_or_else(|_| corrupt_page());
            rids.push(rid);
            offset += n;
        }

        BPlusTreeLeafPage {
            page_id,
            header,
            next_page_id: footer.next_page_id,
            keys,
            rids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::comparator::NaturalOrderComparator;

    fn cmp() -> NaturalOrderComparator<i32> {
        NaturalOrderComparator::new()
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let mut page = BPlusTreeLeafPage::<i32>::new(1, 4, -1);
        page.insert(30, Rid::new(1, 0), &cmp());
        page.insert(10, Rid::new(1, 1), &cmp());
        page.insert(20, Rid::new(1, 2), &cmp());
        assert_eq!(page.keys(), &[10, 20, 30]);
    }

    #[test]
    fn insert_duplicate_key_is_rejected() {
        let mut page = BPlusTreeLeafPage::<i32>::new(1, 4, -1);
        assert!(page.insert(10, Rid::new(1, 0), &cmp()));
        assert!(!page.insert(10, Rid::new(1, 1), &cmp()));
        assert_eq!(page.size(), 1);
    }

    #[test]
    fn lookup_and_remove() {
        let mut page = BPlusTreeLeafPage::<i32>::new(1, 4, -1);
        page.insert(10, Rid::new(1, 0), &cmp());
        page.insert(20, Rid::new(1, 1), &cmp());
        assert_eq!(page.lookup(&20, &cmp()), Some(Rid::new(1, 1)));
        assert!(page.remove(&10, &cmp()));
        assert!(!page.remove(&10, &cmp()));
        assert_eq!(page.lookup(&10, &cmp()), None);
    }

    #[test]
    fn split_preserves_sorted_halves_and_links_siblings() {
        let mut page = BPlusTreeLeafPage::<i32>::new(1, 4, -1);
        for (k, v) in [(10, 0), (20, 1), (30, 2), (40, 3), (50, 4)] {
            page.insert(k, Rid::new(1, v), &cmp());
        }
        let (promoted, sibling) = page.split(2);
        assert_eq!(page.keys(), &[10, 20]);
        assert_eq!(sibling.keys(), &[30, 40, 50]);
        assert_eq!(promoted, 30);
        assert_eq!(page.next_page_id(), 2);
        assert_eq!(sibling.next_page_id(), INVALID_PAGE_ID);
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut page = BPlusTreeLeafPage::<i32>::new(5, 4, 9);
        page.insert(1, Rid::new(1, 0), &cmp());
        page.insert(2, Rid::new(1, 1), &cmp());
        let bytes = page.encode();
        let decoded = BPlusTreeLeafPage::<i32>::decode(5, &bytes);
        assert_eq!(decoded.keys(), page.keys());
        assert_eq!(decoded.parent_page_id(), 9);
    }

    #[test]
    fn derive_max_size_fits_exactly_within_page_size() {
        let key_size = bincode::encode_to_vec(0i32, bincode_config()).unwrap().len();
        let max = derive_max_size(key_size) as usize;
        let mut page = BPlusTreeLeafPage::<i32>::new(1, max as u32, -1);
        for i in 0..max as i32 {
            assert!(page.insert(i, Rid::new(i as i64, 0), &cmp()));
        }
        let bytes = page.encode();
        let decoded = BPlusTreeLeafPage::<i32>::decode(1, &bytes);
        assert_eq!(decoded.size(), max);
    }
}
