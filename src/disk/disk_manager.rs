use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
};

use crate::common::error::StorageError;
use crate::common::page_id::{PageId, INVALID_PAGE_ID};

pub const PAGE_SIZE: usize = 4096;

/// The simple page-level façade the rest of the crate treats as an external
/// collaborator: allocate/deallocate fixed-size slots in a single backing
/// file, and read/write a page's worth of bytes at a time.
pub struct DiskManager {
    file: File,
    next_page_id: PageId,
    free_page_ids: Vec<PageId>,
}

impl DiskManager {
    pub fn new(db_file_path: &str) -> DiskManager {
        if !std::path::Path::new(db_file_path).exists() {
            File::create(db_file_path).expect("could not create the database file");
        }
        let file = File::options()
            .read(true)
            .write(true)
            .open(db_file_path)
            .expect("could not open the database file");

        // Page 0 is reserved for the header page and is never handed out by
        // `allocate_page`, even on a brand new file.
        let next_page_id = ((file.metadata().map(|m| m.len()).unwrap_or(0) as usize
            / PAGE_SIZE) as PageId)
            .max(1);

        DiskManager {
            file,
            next_page_id,
            free_page_ids: Vec::new(),
        }
    }

    /// Allocates a new page slot, preferring to recycle an id freed by
    /// [`Self::deallocate_page`] before extending the file — the same
    /// optimization the original buffer pool manager's `AddToFreeList` /
    /// `DeallocatePage` pairing relies on.
    pub fn allocate_page(&mut self) -> PageId {
        if let Some(pid) = self.free_page_ids.pop() {
            log::trace!("disk: recycling freed page {pid}");
            return pid;
        }
        if self.next_page_id == PageId::MAX {
            panic!("{}", StorageError::OutOfMemory);
        }
        let pid = self.next_page_id;
        self.next_page_id += 1;
        log::trace!("disk: allocated new page {pid}");
        pid
    }

    pub fn deallocate_page(&mut self, page_id: PageId) {
        debug_assert_ne!(page_id, INVALID_PAGE_ID);
        self.free_page_ids.push(page_id);
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8; PAGE_SIZE]) {
        self.file
            .seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))
            .expect("seek failed");
        self.file.write_all(data).expect("write failed");
        self.file.flush().expect("flush failed");
    }

    pub fn read_page(&mut self, page_id: PageId) -> [u8; PAGE_SIZE] {
        let mut buffer = [0u8; PAGE_SIZE];
        self.file
            .seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))
            .expect("seek failed");
        // A page that was allocated but never written reads back as zeros.
        match self.file.read_exact(&mut buffer) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {}
            Err(e) => panic!("read failed: {e}"),
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        // leak the tempdir so the file outlives this function; tests below
        // each use a fresh path and the OS cleans up on process exit.
        std::mem::forget(dir);
        path.to_str().unwrap().to_owned()
    }

    #[test]
    fn allocate_is_monotonic_and_nonnegative() {
        let mut dm = DiskManager::new(&temp_path());
        let a = dm.allocate_page();
        let b = dm.allocate_page();
        assert!(a >= 0);
        assert!(b > a);
    }

    #[test]
    fn allocate_never_hands_out_the_reserved_header_page() {
        let mut dm = DiskManager::new(&temp_path());
        for _ in 0..4 {
            assert_ne!(dm.allocate_page(), crate::common::page_id::HEADER_PAGE_ID);
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut dm = DiskManager::new(&temp_path());
        let pid = dm.allocate_page();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xCD;
        dm.write_page(pid, &data);
        let read_back = dm.read_page(pid);
        assert_eq!(read_back[0], 0xAB);
        assert_eq!(read_back[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn deallocate_recycles_id() {
        let mut dm = DiskManager::new(&temp_path());
        let a = dm.allocate_page();
        dm.deallocate_page(a);
        let b = dm.allocate_page();
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic(expected = "allocation failed")]
    fn allocate_page_id_space_exhaustion_is_fatal() {
        let mut dm = DiskManager::new(&temp_path());
        dm.next_page_id = PageId::MAX;
        dm.allocate_page();
    }
}
