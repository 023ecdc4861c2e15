use super::DiskManager;
use crate::config::HEADER_PAGE_ID;
use crate::errors::Error;
use crate::pages::{PageData, PageId};
use anyhow::Result;
use std::collections::HashMap;

/// Keeps pages in a map. Counts I/O so tests can observe caching behaviour.
#[derive(Default)]
pub struct MemoryDiskManager {
    pages: HashMap<PageId, Box<PageData>>,
    next_page_id: PageId,
    reads: usize,
    writes: usize,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self {
            next_page_id: HEADER_PAGE_ID + 1,
            ..Default::default()
        }
    }

    pub fn get_num_reads(&self) -> usize {
        self.reads
    }

    pub fn get_num_writes(&self) -> usize {
        self.writes
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&mut self, page_id: PageId, data: &mut PageData) -> Result<()> {
        if page_id < 0 {
            return Err(Error::InvalidPageId(page_id).into());
        }
        self.reads += 1;
        match self.pages.get(&page_id) {
            Some(page) => data.copy_from_slice(&page[..]),
            None => data.fill(0),
        }
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, data: &PageData) -> Result<()> {
        if page_id < 0 {
            return Err(Error::InvalidPageId(page_id).into());
        }
        self.writes += 1;
        self.pages.insert(page_id, Box::new(*data));
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        Ok(page_id)
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        self.pages.remove(&page_id);
        Ok(())
    }
}
