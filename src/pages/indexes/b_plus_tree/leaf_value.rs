use crate::pages::traits::{read_at, write_at, Storable};
use crate::pages::PageId;

/// Record id stored as the value of a leaf slot: the location of a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }
}

impl Storable for Rid {
    const SIZE: usize = PageId::SIZE + u32::SIZE;

    fn to_bytes(&self, out: &mut [u8]) {
        write_at(out, 0, self.page_id);
        write_at(out, PageId::SIZE, self.slot_num);
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            page_id: read_at(bytes, 0),
            slot_num: read_at(bytes, PageId::SIZE),
        }
    }
}

/// Packs a bulk-load integer the same way keys and record ids are paired in
/// input files: high 32 bits are the page, low 32 bits the slot.
impl From<i64> for Rid {
    fn from(value: i64) -> Self {
        Self {
            page_id: value >> 32,
            slot_num: value as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_layout() {
        let rid = Rid::new(7, 3);
        let mut buf = [0u8; Rid::SIZE];
        rid.to_bytes(&mut buf);
        assert_eq!(buf[0], 7);
        assert_eq!(buf[8], 3);
        assert_eq!(Rid::from_bytes(&buf), rid);
    }

    #[test]
    fn test_from_integer() {
        assert_eq!(Rid::from(42), Rid::new(0, 42));
        assert_eq!(Rid::from((5 << 32) | 9), Rid::new(5, 9));
    }
}
