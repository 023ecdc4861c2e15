mod memory;

pub use memory::MemoryDiskManager;

use crate::config::{DEFAULT_DATA_DIR, HEADER_PAGE_ID};
use crate::errors::Error;
use crate::pages::{PageData, PageId, PAGE_SIZE};
use crate::printdbg;
use anyhow::Result;
use std::fs::OpenOptions;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

/// Page-granular storage below the buffer pool.
///
/// The pool serializes every call through its own lock, so implementations
/// only need `&mut self`.
pub trait DiskManager: Send {
    /// Fills `data` with the page's bytes. A page that was never written reads as zeroes.
    fn read_page(&mut self, page_id: PageId, data: &mut PageData) -> Result<()>;

    fn write_page(&mut self, page_id: PageId, data: &PageData) -> Result<()>;

    /// Hands out a fresh page id. Never returns the header page id.
    fn allocate_page(&mut self) -> Result<PageId>;

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()>;
}

/// Stores every page as its own file, named after the page id, inside one directory.
#[derive(Debug)]
pub struct FileDiskManager {
    path: PathBuf,
    next_page_id: PageId,
}

// TODO: Find a way to do Direct IO
impl FileDiskManager {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        // resume allocation after the highest page already on disk
        let mut max_page_id = HEADER_PAGE_ID;
        for entry in std::fs::read_dir(&path)? {
            let entry = entry?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<PageId>().ok())
            {
                max_page_id = max_page_id.max(id);
            }
        }

        printdbg!(
            "Opened disk storage at {:?}, next page id {}",
            path,
            max_page_id + 1
        );

        Ok(Self {
            path,
            next_page_id: max_page_id + 1,
        })
    }

    pub fn with_default_path() -> Result<Self> {
        Self::new(DEFAULT_DATA_DIR)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_path(&self, page_id: PageId) -> Result<PathBuf> {
        if page_id < 0 {
            return Err(Error::InvalidPageId(page_id).into());
        }
        Ok(self.path.join(page_id.to_string()))
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&mut self, page_id: PageId, data: &mut PageData) -> Result<()> {
        let path = self.page_path(page_id)?;
        if !path.exists() {
            data.fill(0);
            return Ok(());
        }

        let mut file = OpenOptions::new().read(true).open(path)?;
        file.read_exact(data)?;
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, data: &PageData) -> Result<()> {
        let path = self.page_path(page_id)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.write_all(data)?;
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        Ok(page_id)
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        let path = self.page_path(page_id)?;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Fresh, unique directory for tests that touch the filesystem.
#[cfg(test)]
pub(crate) fn test_path() -> String {
    format!("data/test/{}/", uuid::Uuid::new_v4())
}
