use std::collections::HashMap;

use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::common::page_id::{PageId, HEADER_PAGE_ID};
use crate::disk::disk_manager::PAGE_SIZE;
use crate::storage::page::bincode_config;

/// Deliberately minimal: a name-to-root-page-id map, persisted at the
/// reserved page id every index-bearing database has at page zero. No
/// table metadata, no schema, no catalog beyond this single lookup — those
/// belong to a layer this crate does not implement.
pub struct HeaderPage {
    records: HashMap<String, PageId>,
}

impl HeaderPage {
    pub fn empty() -> Self {
        HeaderPage {
            records: HashMap::new(),
        }
    }

    pub fn load(bpm: &BufferPoolManager) -> Self {
        let Some(frame) = bpm.fetch_page(HEADER_PAGE_ID) else {
            return Self::empty();
        };
        let bytes = *frame.read().unwrap();
        bpm.unpin_page(HEADER_PAGE_ID, false);
        Self::decode(&bytes)
    }

    pub fn save(&self, bpm: &BufferPoolManager) {
        let frame = bpm
            .fetch_page(HEADER_PAGE_ID)
            .expect("header page must always be fetchable");
        *frame.write().unwrap() = self.encode();
        bpm.unpin_page(HEADER_PAGE_ID, true);
        bpm.flush_page(HEADER_PAGE_ID);
    }

    pub fn root_id_of(&self, index_name: &str) -> Option<PageId> {
        self.records.get(index_name).copied()
    }

    /// Returns `false` without modifying anything if `index_name` is
    /// already registered.
    pub fn insert_record(&mut self, index_name: &str, root_page_id: PageId) -> bool {
        if self.records.contains_key(index_name) {
            return false;
        }
        self.records.insert(index_name.to_owned(), root_page_id);
        true
    }

    pub fn update_root_id(&mut self, index_name: &str, root_page_id: PageId) -> bool {
        let Some(entry) = self.records.get_mut(index_name) else {
            return false;
        };
        *entry = root_page_id;
        true
    }

    pub fn delete_record(&mut self, index_name: &str) -> bool {
        self.records.remove(index_name).is_some()
    }

    fn encode(&self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        let bytes = bincode::encode_to_vec(&self.records, bincode_config())
            .expect("header records fit in one page");
        buf[..bytes.len()].copy_from_slice(&bytes);
        buf
    }

    fn decode(bytes: &[u8; PAGE_SIZE]) -> Self {
        match bincode::decode_from_slice::<HashMap<String, PageId>, _>(bytes, bincode_config()) {
            Ok((records, _)) => HeaderPage { records },
            // A page that was allocated but never written (all zero bytes)
            // is a legitimately empty header, not corruption.
            Err(_) if bytes.iter().all(|&b| b == 0) => HeaderPage::empty(),
            Err(_) => crate::storage::page::corrupt_page(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::disk_manager::DiskManager;

    fn temp_pool() -> BufferPoolManager {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        BufferPoolManager::new(4, DiskManager::new(path.to_str().unwrap()))
    }

    #[test]
    fn insert_then_lookup() {
        let mut header = HeaderPage::empty();
        assert!(header.insert_record("my_index", 5));
        assert!(!header.insert_record("my_index", 9));
        assert_eq!(header.root_id_of("my_index"), Some(5));
    }

    #[test]
    fn save_then_load_round_trips_through_the_pool() {
        let pool = temp_pool();
        let mut header = HeaderPage::empty();
        header.insert_record("idx_a", 11);
        header.insert_record("idx_b", 22);
        header.save(&pool);

        let reloaded = HeaderPage::load(&pool);
        assert_eq!(reloaded.root_id_of("idx_a"), Some(11));
        assert_eq!(reloaded.root_id_of("idx_b"), Some(22));
    }
}
