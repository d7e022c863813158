use bincode::{Decode, Encode};

use crate::common::error::StorageError;
use crate::common::page_id::PageId;
use crate::disk::disk_manager::PAGE_SIZE;

/// Distinguishes the two page kinds. Stored as a single-byte tag at a fixed
/// offset so a reader can decide how to decode the rest of the page before
/// touching the body.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Decode, Encode)]
#[repr(u8)]
pub enum PageType {
    Internal = 0,
    Leaf = 1,
}

/// Fields common to every B+ tree page, stored first so a reader can decode
/// just this much to find out which page kind follows.
#[derive(Copy, Clone, Debug, Decode, Encode)]
pub struct BPlusTreePageHeader {
    pub page_type: PageType,
    pub size: u32,
    pub max_size: u32,
    pub parent_page_id: PageId,
}

impl BPlusTreePageHeader {
    pub fn is_leaf(&self) -> bool {
        self.page_type == PageType::Leaf
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id == crate::common::page_id::INVALID_PAGE_ID
    }
}

pub fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// A page's header failed to decode, or decoded to a value that could never
/// have been written by this crate (wrong type tag, size past `max_size`).
/// There is no WAL to roll back to, so the only sound response is to stop
/// rather than keep operating on bytes that don't mean what the tree thinks
/// they mean.
pub fn corrupt_page() -> ! {
    panic!("{}", StorageError::CorruptPage)
}

/// Decodes a page header and checks `size <= max_size` and, if `expected` is
/// given, that the page tag matches. Panics with [`StorageError::CorruptPage`]
/// on any violation.
pub fn decode_header_checked(
    bytes: &[u8; PAGE_SIZE],
    expected: Option<PageType>,
) -> (BPlusTreePageHeader, usize) {
    let (header, offset): (BPlusTreePageHeader, usize) =
        bincode::decode_from_slice(bytes, bincode_config()).unwrap_or_else(|_| corrupt_page());
    if header.size > header.max_size {
        corrupt_page();
    }
    if let Some(expected) = expected {
        if header.page_type != expected {
            corrupt_page();
        }
    }
    (header, offset)
}

/// Reads just the page type tag out of a frame's raw bytes, without
/// decoding the rest of the header or body.
pub fn peek_page_type(bytes: &[u8; PAGE_SIZE]) -> Option<PageType> {
    let (header, _): (BPlusTreePageHeader, usize) =
        bincode::decode_from_slice(bytes, bincode_config()).ok()?;
    Some(header.page_type)
}
