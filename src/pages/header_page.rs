use super::traits::{read_at, write_at};
use super::{PageId, PAGE_SIZE};
use crate::errors::Error;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// Bytes reserved in front of the serialized records for their length.
const LENGTH_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HeaderRecord {
    name: String,
    root_page_id: PageId,
}

/// View over the header page: the durable `index name -> root page id` mapping.
///
/// An all-zero page decodes as an empty header, so a freshly allocated
/// page 0 needs no initialisation.
pub struct HeaderPage<B> {
    data: B,
}

impl<B: Deref<Target = [u8]>> HeaderPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    fn records(&self) -> Result<Vec<HeaderRecord>> {
        let len = read_at::<u32>(&self.data, 0) as usize;
        if len == 0 {
            return Ok(vec![]);
        }
        if LENGTH_PREFIX + len > PAGE_SIZE {
            return Err(Error::Internal(format!("corrupted header page length {len}")).into());
        }
        Ok(bincode::deserialize(
            &self.data[LENGTH_PREFIX..LENGTH_PREFIX + len],
        )?)
    }

    pub fn get_root_id(&self, name: &str) -> Result<Option<PageId>> {
        Ok(self
            .records()?
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| r.root_page_id))
    }

    pub fn get_record_count(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }
}

impl<B: DerefMut<Target = [u8]>> HeaderPage<B> {
    fn store(&mut self, records: &[HeaderRecord]) -> Result<()> {
        let bytes = bincode::serialize(records)?;
        if LENGTH_PREFIX + bytes.len() > PAGE_SIZE {
            return Err(Error::HeaderFull.into());
        }
        write_at(&mut self.data, 0, bytes.len() as u32);
        self.data[LENGTH_PREFIX..LENGTH_PREFIX + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    /// Returns false if a record with the same name already exists.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> Result<bool> {
        let mut records = self.records()?;
        if records.iter().any(|r| r.name == name) {
            return Ok(false);
        }
        records.push(HeaderRecord {
            name: name.to_string(),
            root_page_id,
        });
        self.store(&records)?;
        Ok(true)
    }

    /// Returns false if there is no record to update.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> Result<bool> {
        let mut records = self.records()?;
        match records.iter_mut().find(|r| r.name == name) {
            Some(record) => record.root_page_id = root_page_id,
            None => return Ok(false),
        }
        self.store(&records)?;
        Ok(true)
    }

    /// Returns false if there is no record to delete.
    pub fn delete_record(&mut self, name: &str) -> Result<bool> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|r| r.name != name);
        if records.len() == before {
            return Ok(false);
        }
        self.store(&records)?;
        Ok(true)
    }
}
