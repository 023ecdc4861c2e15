use crate::pages::PageId;
use lazy_static::lazy_static;

/// Frames allocated by [`crate::BufferPoolManager::with_defaults`].
pub const DEFAULT_POOL_SIZE: usize = 1_000;

/// Directory used by [`crate::FileDiskManager`] when no path is given.
pub const DEFAULT_DATA_DIR: &str = "data/pages/";

/// Page holding the `index name -> root page id` records.
/// Disk managers never hand this id out from `allocate_page`.
pub const HEADER_PAGE_ID: PageId = 0;

pub const TRACE_ENV_VAR: &str = "LATCHTREE_TRACE";

lazy_static! {
    pub static ref TRACE_ENABLED: bool = std::env::var(TRACE_ENV_VAR)
        .map(|v| !v.is_empty() && v != "0")
        .unwrap_or(false);
}
