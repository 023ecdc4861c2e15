pub mod buffer_pool;
pub mod config;
pub mod disk_manager;
pub mod errors;
pub mod indexes;
pub mod pages;

pub use buffer_pool::{ArcBufferPool, BufferPoolManager};
pub use disk_manager::{DiskManager, FileDiskManager, MemoryDiskManager};
pub use errors::Error;
pub use indexes::b_plus_tree::{
    BPlusTree, DefaultComparator, GenericKey, IndexIterator, KeyComparator, Rid,
};
pub use pages::{traits::Storable, PageId, INVALID_PAGE, PAGE_SIZE};

/// Debug-build tracing, silent unless `LATCHTREE_TRACE` is set.
#[macro_export]
macro_rules! printdbg {
    ($val: expr $(, $args: expr)*) => {
        if cfg!(debug_assertions) && *$crate::config::TRACE_ENABLED {
            println!($val $(, $args)*)
        }
    };
}

#[macro_export]
macro_rules! get_caller_name {
    () => {{
        let mut bt = backtrace::Backtrace::new_unresolved();
        bt.resolve();
        let frames = bt.frames();
        if frames.len() > 1 {
            let caller_frame = &frames[1];
            if let Some(symbol) = caller_frame.symbols().first() {
                if let Some(name) = symbol.name() {
                    name.to_string()
                } else {
                    "Unknown Caller".to_string()
                }
            } else {
                "Unknown Caller".to_string()
            }
        } else {
            "No Caller Found".to_string() // In case the stack isn't deep enough
        }
    }};
}
