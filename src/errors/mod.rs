use crate::pages::indexes::b_plus_tree::PageType;
use crate::pages::PageId;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Internal(String),
    /// Every frame is pinned, nothing can be evicted.
    PoolExhausted,
    InvalidPageId(PageId),
    /// Another fetch of the page failed to read it from disk.
    PageLoadFailed(PageId),
    PageTypeMismatch {
        page_id: PageId,
        expected: PageType,
        actual: PageType,
    },
    HeaderFull,
    Unsupported(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(context) => write!(f, "Internal Error: {context}."),
            Error::PoolExhausted => write!(f, "Buffer pool exhausted: all frames are pinned."),
            Error::InvalidPageId(page_id) => write!(f, "Invalid page id {page_id}."),
            Error::PageLoadFailed(page_id) => write!(f, "Page {page_id} could not be read."),
            Error::PageTypeMismatch {
                page_id,
                expected,
                actual,
            } => write!(
                f,
                "Expected page {page_id} to be {expected:?}, but got {actual:?}."
            ),
            Error::HeaderFull => write!(f, "Header page has no room for another record."),
            Error::Unsupported(context) => write!(f, "Unsupported: {context}."),
        }
    }
}

impl std::error::Error for Error {}
