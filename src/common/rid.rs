use bincode::{Decode, Encode};

use super::page_id::PageId;

/// Record identifier: the page a tuple lives on plus its slot within that
/// page. Leaf entries of the B+ tree store one of these per key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Decode, Encode)]
pub struct Rid {
    page_id: PageId,
    slot_id: u32,
}

pub const RID_SIZE: usize = 12;

impl Rid {
    pub fn new(page_id: PageId, slot_id: u32) -> Rid {
        Rid { page_id, slot_id }
    }
}
