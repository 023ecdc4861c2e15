pub mod header_page;
pub mod indexes;
pub mod traits;

pub const PAGE_SIZE: usize = 4096; // 4 KBs
pub const INVALID_PAGE: PageId = -1;

pub type PageId = i64;

/// Raw content of one page, as cached by a buffer pool frame
/// and exchanged with the disk manager.
pub type PageData = [u8; PAGE_SIZE];
