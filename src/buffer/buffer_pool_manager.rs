use std::sync::{Arc, Mutex, RwLock};

use crate::common::error::{StorageError, StorageResult};
use crate::common::page_id::{FrameId, PageId, INVALID_PAGE_ID};
use crate::container::extendible_hash::ExtendibleHash;
use crate::disk::disk_manager::{DiskManager, PAGE_SIZE};

use super::lru_replacer::LRUReplacer;

/// A page's bytes, shared out to callers behind a lock so the pool can hand
/// out a handle without holding its own lock for the caller's whole read or
/// write.
pub type Frame = Arc<RwLock<[u8; PAGE_SIZE]>>;

struct FrameMeta {
    page_id: PageId,
    pin_count: usize,
    dirty: bool,
    data: Frame,
}

impl FrameMeta {
    fn empty() -> Self {
        FrameMeta {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            dirty: false,
            data: Arc::new(RwLock::new([0u8; PAGE_SIZE])),
        }
    }
}

struct PoolState {
    frames: Vec<FrameMeta>,
    free_list: Vec<FrameId>,
}

/// Fixed-size cache of disk pages. Every `fetch_page`/`new_page` call that
/// succeeds increments the returned frame's pin count; callers must balance
/// it with exactly one `unpin_page` call, on every exit path, or the frame
/// can never become a victim again.
///
/// Holds one coarse lock over its frame table and free list for the
/// duration of each operation, including the disk I/O a miss or an eviction
/// triggers — there is no latch crabbing here, matching the rest of this
/// crate's concurrency model.
pub struct BufferPoolManager {
    state: Mutex<PoolState>,
    page_table: ExtendibleHash<PageId, FrameId>,
    replacer: LRUReplacer<FrameId>,
    disk_manager: Mutex<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> BufferPoolManager {
        assert!(pool_size > 0, "pool size must be positive");
        let frames = (0..pool_size).map(|_| FrameMeta::empty()).collect();
        BufferPoolManager {
            state: Mutex::new(PoolState {
                frames,
                free_list: (0..pool_size).collect(),
            }),
            page_table: ExtendibleHash::new(4),
            replacer: LRUReplacer::new(pool_size),
            disk_manager: Mutex::new(disk_manager),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.state.lock().unwrap().frames.len()
    }

    /// Finds a frame to hold a page about to be read or allocated: first the
    /// free list, then the replacer's oldest victim, flushing it first if
    /// dirty. `None` means every frame is pinned — `StorageError::OutOfFrames`.
    fn acquire_frame(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Some(frame_id);
        }
        let frame_id = self.replacer.victim()?;
        let victim_page_id = state.frames[frame_id].page_id;
        if state.frames[frame_id].dirty {
            let bytes = *state.frames[frame_id].data.read().unwrap();
            self.disk_manager
                .lock()
                .unwrap()
                .write_page(victim_page_id, &bytes);
        }
        self.page_table.remove(&victim_page_id);
        Some(frame_id)
    }

    /// Pins and returns the page's frame, reading it from disk on a miss.
    /// `None` if every frame is currently pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Option<Frame> {
        let mut state = self.state.lock().unwrap();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &mut state.frames[frame_id];
            frame.pin_count += 1;
            if frame.pin_count == 1 {
                self.replacer.erase(&frame_id);
            }
            return Some(frame.data.clone());
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let bytes = self.disk_manager.lock().unwrap().read_page(page_id);
        let data: Frame = Arc::new(RwLock::new(bytes));
        state.frames[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            dirty: false,
            data: data.clone(),
        };
        self.page_table.insert(page_id, frame_id);
        log::trace!("buffer pool: fetched page {page_id} into frame {frame_id}");
        Some(data)
    }

    /// Allocates a fresh page on disk, pins it, and returns its id and
    /// zeroed frame. `None` if every frame is currently pinned.
    pub fn new_page(&self) -> Option<(PageId, Frame)> {
        let mut state = self.state.lock().unwrap();
        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = self.disk_manager.lock().unwrap().allocate_page();
        let data: Frame = Arc::new(RwLock::new([0u8; PAGE_SIZE]));
        state.frames[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            dirty: false,
            data: data.clone(),
        };
        self.page_table.insert(page_id, frame_id);
        log::trace!("buffer pool: allocated page {page_id} in frame {frame_id}");
        Some((page_id, data))
    }

    /// Drops one pin on `page_id`. `is_dirty` is OR'd into the frame's dirty
    /// flag — once true it stays true until the next flush. Returns `false`
    /// if the page isn't resident or is already unpinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &mut state.frames[frame_id];
        if frame.pin_count == 0 {
            return false;
        }
        frame.dirty |= is_dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.insert(frame_id);
        }
        true
    }

    /// Writes a resident page's bytes to disk regardless of pin count,
    /// clearing its dirty flag. Returns `false` if the page isn't resident.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let bytes = *state.frames[frame_id].data.read().unwrap();
        self.disk_manager.lock().unwrap().write_page(page_id, &bytes);
        state.frames[frame_id].dirty = false;
        true
    }

    pub fn flush_all_pages(&self) {
        let mut state = self.state.lock().unwrap();
        for frame_id in 0..state.frames.len() {
            if state.frames[frame_id].page_id == INVALID_PAGE_ID || !state.frames[frame_id].dirty {
                continue;
            }
            let page_id = state.frames[frame_id].page_id;
            let bytes = *state.frames[frame_id].data.read().unwrap();
            self.disk_manager.lock().unwrap().write_page(page_id, &bytes);
            state.frames[frame_id].dirty = false;
        }
    }

    /// Removes a page from the pool and frees its backing disk slot.
    /// Succeeds as a no-op (`Ok(false)`) if the page wasn't resident, and
    /// refuses (`Err(PinnedOnDelete)`) if it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> StorageResult<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        if state.frames[frame_id].pin_count > 0 {
            return Err(StorageError::PinnedOnDelete);
        }
        self.replacer.erase(&frame_id);
        self.page_table.remove(&page_id);
        state.frames[frame_id] = FrameMeta::empty();
        state.free_list.push(frame_id);
        self.disk_manager.lock().unwrap().deallocate_page(page_id);
        Ok(true)
    }

    #[cfg(test)]
    fn pin_count_of(&self, page_id: PageId) -> Option<usize> {
        let state = self.state.lock().unwrap();
        let frame_id = self.page_table.find(&page_id)?;
        Some(state.frames[frame_id].pin_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_pool(pool_size: usize) -> BufferPoolManager {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        BufferPoolManager::new(pool_size, DiskManager::new(path.to_str().unwrap()))
    }

    #[test]
    fn new_page_then_fetch_returns_same_frame() {
        let pool = temp_pool(4);
        let (page_id, frame) = pool.new_page().unwrap();
        frame.write().unwrap()[0] = 0x42;
        pool.unpin_page(page_id, true);

        let fetched = pool.fetch_page(page_id).unwrap();
        assert_eq!(fetched.read().unwrap()[0], 0x42);
        pool.unpin_page(page_id, false);
    }

    #[test]
    fn fetch_increments_pin_count_across_calls() {
        let pool = temp_pool(4);
        let (page_id, _) = pool.new_page().unwrap();
        pool.fetch_page(page_id);
        assert_eq!(pool.pin_count_of(page_id), Some(2));
        pool.unpin_page(page_id, false);
        assert_eq!(pool.pin_count_of(page_id), Some(1));
    }

    #[test]
    fn all_frames_pinned_exhausts_pool() {
        let pool = temp_pool(2);
        let (p0, _) = pool.new_page().unwrap();
        let (p1, _) = pool.new_page().unwrap();
        assert!(pool.new_page().is_none());
        pool.unpin_page(p0, false);
        pool.unpin_page(p1, false);
    }

    /// S1 — with every frame pinned once and then unpinned in order
    /// `p0, p1, p2`, the next allocation evicts `p0` first.
    #[test]
    fn eviction_order_follows_unpin_order() {
        let pool = temp_pool(3);
        let (p0, _) = pool.new_page().unwrap();
        let (p1, _) = pool.new_page().unwrap();
        let (p2, _) = pool.new_page().unwrap();
        pool.unpin_page(p0, false);
        pool.unpin_page(p1, false);
        pool.unpin_page(p2, false);

        pool.new_page().unwrap();
        assert!(pool.fetch_page(p0).is_none() || pool.pin_count_of(p0).is_none());
        assert!(pool.pin_count_of(p1).is_some());
        assert!(pool.pin_count_of(p2).is_some());
    }

    /// S2 — a dirty page that gets evicted is written back to disk before
    /// its frame is reused, so a later fetch of the same page id sees the
    /// write even though it went through a full evict/reload cycle.
    #[test]
    fn dirty_page_is_written_back_on_eviction() {
        let pool = temp_pool(1);
        let (p0, frame0) = pool.new_page().unwrap();
        frame0.write().unwrap()[0] = 0x99;
        pool.unpin_page(p0, true);

        // Only one frame: allocating again forces p0 out.
        let (p1, _) = pool.new_page().unwrap();
        pool.unpin_page(p1, false);

        let reloaded = pool.fetch_page(p0).unwrap();
        assert_eq!(reloaded.read().unwrap()[0], 0x99);
        pool.unpin_page(p0, false);
    }

    #[test]
    fn delete_page_refuses_while_pinned() {
        let pool = temp_pool(2);
        let (page_id, _) = pool.new_page().unwrap();
        assert_eq!(
            pool.delete_page(page_id),
            Err(StorageError::PinnedOnDelete)
        );
        pool.unpin_page(page_id, false);
        assert_eq!(pool.delete_page(page_id), Ok(true));
    }

    #[test]
    fn delete_page_of_absent_page_is_ok_false() {
        let pool = temp_pool(2);
        assert_eq!(pool.delete_page(999), Ok(false));
    }

    #[test]
    fn flush_page_clears_dirty_without_unpinning() {
        let pool = temp_pool(2);
        let (page_id, frame) = pool.new_page().unwrap();
        frame.write().unwrap()[0] = 7;
        pool.unpin_page(page_id, true);
        assert!(pool.flush_page(page_id));
        assert_eq!(pool.pin_count_of(page_id), Some(0));
    }
}
