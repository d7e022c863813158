pub mod comparator;
pub mod error;
pub mod page_id;
pub mod rid;
pub mod transaction;
