//! Page layout for heap files.
//!
//! A slotted page is divided into a header, a slot array growing forward and
//! a data area growing backward from the end of the page:
//!
//! ```text
//! | slot_count: u16 | free_space_pointer: u16 | slot 0 | slot 1 | ... free ... | record 1 | record 0 |
//! ```
//!
//! Each slot is an `(offset: u16, length: u16)` pair. All integers are little-endian.

use crate::api::{PageId, StorageError, PAGE_SIZE};
use crate::tuple::{CodecError, RecordId, Tuple, TupleDesc};
use std::slice;
use std::vec;

/// Size of the page header in bytes.
pub const HEADER_SIZE: usize = 4;
/// Size of one slot entry in bytes.
pub const SLOT_SIZE: usize = 4;

/// A slot in a slotted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// The offset of the record in the page.
    pub offset: u16,
    /// The length of the record. Zero marks an empty slot.
    pub length: u16,
}

/// A view over the raw bytes of a page.
pub struct SlottedPage<B> {
    data: B,
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn write_u16(data: &mut [u8], at: usize, value: u16) {
    data[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

impl<B: AsRef<[u8]>> SlottedPage<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    pub fn slot_count(&self) -> u16 {
        read_u16(self.data.as_ref(), 0)
    }

    /// Offset of the lowest byte used by the data area.
    ///
    /// A zeroed page reads as empty: a live pointer can never be 0 because
    /// the header occupies the start of the page. A pointer past the end of
    /// the buffer is clamped to it.
    pub fn free_space_pointer(&self) -> usize {
        let len = self.data.as_ref().len();
        match read_u16(self.data.as_ref(), 2) {
            0 => len,
            pointer => (pointer as usize).min(len),
        }
    }

    /// Bytes available between the slot array and the data area.
    pub fn free_space(&self) -> usize {
        let used = HEADER_SIZE + self.slot_count() as usize * SLOT_SIZE;
        self.free_space_pointer().saturating_sub(used)
    }

    pub fn slot(&self, slot_index: u16) -> Option<Slot> {
        if slot_index >= self.slot_count() {
            return None;
        }
        let at = HEADER_SIZE + slot_index as usize * SLOT_SIZE;
        let data = self.data.as_ref();
        if at + SLOT_SIZE > data.len() {
            return None;
        }
        Some(Slot {
            offset: read_u16(data, at),
            length: read_u16(data, at + 2),
        })
    }

    /// Returns the record stored in the given slot.
    pub fn get_record(&self, slot_index: u16) -> Result<&[u8], CodecError> {
        let slot = self
            .slot(slot_index)
            .ok_or(CodecError::SlotOutOfBounds(slot_index))?;
        let start = slot.offset as usize;
        let end = start + slot.length as usize;
        self.data
            .as_ref()
            .get(start..end)
            .ok_or(CodecError::SlotOutOfBounds(slot_index))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> SlottedPage<B> {
    /// Formats the page as empty.
    pub fn init(&mut self) {
        let data = self.data.as_mut();
        data.fill(0);
        let len = data.len();
        write_u16(data, 2, len as u16);
    }

    /// Inserts a record into the page.
    /// Returns the index of the new slot, or `None` if there is not enough space.
    pub fn insert_record(&mut self, record: &[u8]) -> Option<u16> {
        if record.len() + SLOT_SIZE > self.free_space() {
            return None;
        }
        let slot_index = self.slot_count();
        let offset = self.free_space_pointer() - record.len();
        let slot_at = HEADER_SIZE + slot_index as usize * SLOT_SIZE;

        let data = self.data.as_mut();
        data[offset..offset + record.len()].copy_from_slice(record);
        write_u16(data, slot_at, offset as u16);
        write_u16(data, slot_at + 2, record.len() as u16);
        write_u16(data, 0, slot_index + 1);
        write_u16(data, 2, offset as u16);
        Some(slot_index)
    }
}

/// A decoded snapshot of one heap page.
#[derive(Debug, Clone)]
pub struct HeapPage {
    id: PageId,
    tuples: Vec<Tuple>,
}

impl HeapPage {
    /// Decodes every occupied slot of `data`, in slot order.
    pub fn decode(id: PageId, desc: &TupleDesc, data: &[u8]) -> Result<Self, StorageError> {
        let page = SlottedPage::new(data);
        let corrupt = |source| StorageError::CorruptPage { page_id: id, source };

        let mut tuples = Vec::with_capacity(page.slot_count() as usize);
        for slot in 0..page.slot_count() {
            let record = page.get_record(slot).map_err(corrupt)?;
            if record.is_empty() {
                continue;
            }
            let mut tuple = Tuple::deserialize(record, desc).map_err(corrupt)?;
            tuple.set_record_id(Some(RecordId { page_id: id, slot }));
            tuples.push(tuple);
        }
        Ok(Self { id, tuples })
    }

    /// Builds a page snapshot from tuples that are already in memory.
    pub fn from_tuples(id: PageId, tuples: Vec<Tuple>) -> Self {
        Self { id, tuples }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn num_tuples(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    /// How many tuples of the given schema fit in one page.
    pub fn tuples_per_page(desc: &TupleDesc) -> usize {
        (PAGE_SIZE - HEADER_SIZE) / (desc.byte_len() + SLOT_SIZE)
    }
}

impl IntoIterator for HeapPage {
    type Item = Tuple;
    type IntoIter = vec::IntoIter<Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.into_iter()
    }
}

impl<'a> IntoIterator for &'a HeapPage {
    type Item = &'a Tuple;
    type IntoIter = slice::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}
