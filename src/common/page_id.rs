/// Page identifier as handed out by [`crate::disk::disk_manager::DiskManager`].
///
/// `i64` rather than an unsigned type so that `INVALID_PAGE_ID` is a plain
/// sentinel instead of requiring an `Option` wrapper everywhere a page id is
/// threaded through the tree and buffer pool.
pub type PageId = i64;

/// A slot in the buffer pool's frame array.
pub type FrameId = usize;

pub const INVALID_PAGE_ID: PageId = -1;

/// Page id under which the root→page-id records of every index live.
pub const HEADER_PAGE_ID: PageId = 0;
