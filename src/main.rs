use std::sync::Arc;

use rand::Rng;

use storage_core::buffer::buffer_pool_manager::BufferPoolManager;
use storage_core::common::comparator::NaturalOrderComparator;
use storage_core::common::rid::Rid;
use storage_core::common::transaction::Transaction;
use storage_core::disk::disk_manager::DiskManager;
use storage_core::index::b_plus_tree::BPlusTree;
use storage_core::index::header_page::HeaderPage;
use storage_core::storage::page::bincode_config;
use storage_core::storage::{internal_page, leaf_page};

const POOL_SIZE: usize = 64;
const INDEX_NAME: &str = "demo_index";

fn main() {
    env_logger::init();

    let disk_manager = DiskManager::new("resources/db_save_files/test.mdb");
    let bpm = Arc::new(BufferPoolManager::new(POOL_SIZE, disk_manager));

    // Derive each page type's capacity from how many fixed-size i32 keys
    // actually fit in a page, rather than guessing a size.
    let key_size = bincode::encode_to_vec(0i32, bincode_config())
        .expect("key encodes")
        .len();
    let leaf_max_size = leaf_page::derive_max_size(key_size);
    let internal_max_size = internal_page::derive_max_size(key_size);

    let mut header = HeaderPage::load(&bpm);
    let mut tree = BPlusTree::new(
        Arc::clone(&bpm),
        Box::new(NaturalOrderComparator::new()),
        leaf_max_size,
        internal_max_size,
    );
    if let Some(root_page_id) = header.root_id_of(INDEX_NAME) {
        tree = tree.with_root(root_page_id);
    }

    let txn = Transaction::new(1);
    let mut rng = rand::thread_rng();
    let mut inserted = 0;
    for _ in 0..10_000 {
        let key: i32 = rng.gen_range(0..1_000_000);
        if tree.insert(key, Rid::new(key as i64, 0), &txn) {
            inserted += 1;
        }
    }
    log::info!(
        "inserted {inserted} distinct keys, root page id {}",
        tree.root_page_id()
    );

    let scanned = tree.begin().count();
    log::info!("in-order scan visited {scanned} entries");

    if !header.insert_record(INDEX_NAME, tree.root_page_id()) {
        header.update_root_id(INDEX_NAME, tree.root_page_id());
    }
    header.save(&bpm);
    bpm.flush_all_pages();
}
