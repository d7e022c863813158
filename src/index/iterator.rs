use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use bincode::{Decode, Encode};

use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::common::page_id::{PageId, INVALID_PAGE_ID};
use crate::common::rid::Rid;
use crate::storage::leaf_page::BPlusTreeLeafPage;

/// Forward-only scan over a tree's leaves in key order. Does not hold a
/// page pinned between calls to `next` — each step pins just long enough to
/// read one entry, matching the rest of this crate's policy of never
/// holding a pin across anything but a single page access.
pub struct IndexIterator<K: Clone + Debug + Encode + Decode> {
    bpm: Option<Arc<BufferPoolManager>>,
    page_id: PageId,
    index: usize,
    _marker: PhantomData<K>,
}

impl<K: Clone + Debug + Encode + Decode> IndexIterator<K> {
    pub fn empty() -> Self {
        IndexIterator {
            bpm: None,
            page_id: INVALID_PAGE_ID,
            index: 0,
            _marker: PhantomData,
        }
    }

    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, index: usize) -> Self {
        IndexIterator {
            bpm: Some(bpm),
            page_id,
            index,
            _marker: PhantomData,
        }
    }

    pub fn is_end(&self) -> bool {
        self.page_id == INVALID_PAGE_ID
    }
}

impl<K: Clone + Debug + Encode + Decode> Iterator for IndexIterator<K> {
    type Item = (K, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        let bpm = self.bpm.as_ref()?;
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }
            let frame = bpm.fetch_page(self.page_id)?;
            let bytes = *frame.read().unwrap();
            let leaf = BPlusTreeLeafPage::<K>::decode(self.page_id, &bytes);
            bpm.unpin_page(self.page_id, false);

            if self.index < leaf.size() {
                let item = (leaf.key_at(self.index).clone(), leaf.rid_at(self.index));
                self.index += 1;
                return Some(item);
            }
            self.page_id = leaf.next_page_id();
            self.index = 0;
        }
    }
}
