use std::{fmt::Display, sync::Arc};

use crate::{
    error::{DbError, Result},
    transaction::TransactionId,
    tuple::{Tuple, TupleDesc},
};

/// Identifies one page of one table: `(table_id, page_no)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: i32,
    pub page_no: usize,
}

impl PageId {
    pub fn new(table_id: i32, page_no: usize) -> Self {
        Self { table_id, page_no }
    }
}

impl Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.table_id, self.page_no)
    }
}

/// Identifies a tuple image: the page it lives on and its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub pid: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(pid: PageId, slot: usize) -> Self {
        Self { pid, slot }
    }
}

/// Number of tuple slots that fit on a page: each slot costs its bytes plus one header bit
pub fn slots_per_page(page_size: usize, tuple_width: usize) -> usize {
    (page_size * 8) / (tuple_width * 8 + 1)
}

/// Bytes of the slot-occupancy bitmap for `num_slots` slots
pub fn header_size(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// A zeroed page image: empty header, empty slots
pub fn empty_page_image(page_size: usize) -> Vec<u8> {
    vec![0; page_size]
}

/// A fixed-size heap page.
///
/// The page keeps its exact byte image. Layout:
/// - bytes `0..header_len`: occupancy bitmap, bit `i` is bit `i % 8` (LSB first) of byte `i / 8`
/// - then `num_slots` tuple images of `desc.size()` bytes each, in slot order
/// - any trailing slack is carried through untouched
///
/// Cleared slots keep their old bytes; they are never decoded.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    desc: Arc<TupleDesc>,
    data: Vec<u8>,
    num_slots: usize,
    header_len: usize,
    dirty_by: Option<TransactionId>,
}

impl HeapPage {
    /// Wrap a page image read off disk (or produced by [`empty_page_image`]).
    /// The page size is the length of `data`.
    pub fn new(pid: PageId, data: Vec<u8>, desc: Arc<TupleDesc>) -> Result<Self> {
        let tuple_width = desc.size();
        let num_slots = slots_per_page(data.len(), tuple_width);
        if num_slots == 0 {
            return Err(DbError::InvalidPageSize {
                page_size: data.len(),
                tuple_width,
            });
        }
        Ok(Self {
            pid,
            desc,
            data,
            num_slots,
            header_len: header_size(num_slots),
            dirty_by: None,
        })
    }

    pub fn pid(&self) -> PageId {
        self.pid
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots && self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn mark_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots)
            .filter(|slot| !self.is_slot_used(*slot))
            .count()
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let width = self.desc.size();
        let start = self.header_len + slot * width;
        start..start + width
    }

    /// Store `tuple` in the first free slot and point its record id at that slot
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<usize> {
        if **tuple.desc() != *self.desc {
            return Err(DbError::SchemaMismatch {
                expected: self.desc.to_string(),
                found: tuple.desc().to_string(),
            });
        }
        let slot = (0..self.num_slots)
            .find(|slot| !self.is_slot_used(*slot))
            .ok_or(DbError::PageFull(self.pid))?;
        let range = self.slot_range(slot);
        tuple.serialize_into(&mut self.data[range]);
        self.mark_slot_used(slot, true);
        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        Ok(slot)
    }

    /// Clear the slot named by `tuple`'s record id. The slot bytes are left in place.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple
            .record_id()
            .filter(|rid| rid.pid == self.pid)
            .ok_or(DbError::TupleNotOnPage { pid: self.pid })?;
        if !self.is_slot_used(record_id.slot) {
            return Err(DbError::SlotEmpty {
                pid: self.pid,
                slot: record_id.slot,
            });
        }
        self.mark_slot_used(record_id.slot, false);
        Ok(())
    }

    /// Decode the tuple in `slot`, if the slot is occupied
    pub fn tuple(&self, slot: usize) -> Option<Result<Tuple>> {
        if !self.is_slot_used(slot) {
            return None;
        }
        let decoded = Tuple::deserialize(&self.desc, &self.data[self.slot_range(slot)]).map(
            |mut tuple| {
                tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
                tuple
            },
        );
        Some(decoded)
    }

    /// Tuples of every occupied slot, in slot order
    pub fn iter(&self) -> HeapPageIter<'_> {
        HeapPageIter {
            page: self,
            current_slot: 0,
        }
    }

    /// The exact byte image of this page
    pub fn page_data(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        self.dirty_by = dirty.then_some(tid);
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirty_by
    }
}

pub struct HeapPageIter<'a> {
    page: &'a HeapPage,
    current_slot: usize,
}

impl Iterator for HeapPageIter<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_slot < self.page.num_slots {
            let slot = self.current_slot;
            self.current_slot += 1;
            if let Some(tuple) = self.page.tuple(slot) {
                return Some(tuple);
            }
        }
        None
    }
}

#[cfg(test)]
mod heap_page_tests {
    use std::sync::Arc;

    use super::*;
    use crate::tuple::{Field, Type};

    fn int_desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::from_types(&[Type::Int]))
    }

    fn int_tuple(desc: &Arc<TupleDesc>, value: i32) -> Tuple {
        Tuple::from_fields(Arc::clone(desc), vec![Field::Int(value)]).unwrap()
    }

    fn empty_page(desc: &Arc<TupleDesc>) -> HeapPage {
        HeapPage::new(PageId::new(1, 0), empty_page_image(4096), Arc::clone(desc)).unwrap()
    }

    #[test]
    fn test_slot_arithmetic() {
        assert_eq!(slots_per_page(4096, 4), 992);
        assert_eq!(header_size(992), 124);
        assert_eq!(header_size(8), 1);
        assert_eq!(header_size(9), 2);
    }

    #[test]
    fn test_empty_page() {
        let desc = int_desc();
        let page = empty_page(&desc);
        assert_eq!(page.num_slots(), 992);
        assert_eq!(page.page_size(), 4096);
        assert_eq!(page.num_empty_slots(), 992);
        assert_eq!(page.iter().count(), 0);
        assert_eq!(page.page_data(), empty_page_image(4096));
    }

    #[test]
    fn test_insert_sets_bit_and_record_id() {
        let desc = int_desc();
        let mut page = empty_page(&desc);
        let mut tuple = int_tuple(&desc, 42);
        let slot = page.insert_tuple(&mut tuple).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(tuple.record_id(), Some(RecordId::new(page.pid(), 0)));
        assert!(page.is_slot_used(0));
        assert_eq!(page.page_data()[0], 0b0000_0001);
        assert_eq!(page.num_empty_slots(), 991);

        let header = header_size(992);
        assert_eq!(&page.page_data()[header..header + 4], &42i32.to_be_bytes());
    }

    #[test]
    fn test_fill_page_then_full() {
        let desc = int_desc();
        let mut page = empty_page(&desc);
        for i in 0..992 {
            page.insert_tuple(&mut int_tuple(&desc, i)).unwrap();
        }
        assert_eq!(page.num_empty_slots(), 0);
        assert!(matches!(
            page.insert_tuple(&mut int_tuple(&desc, 992)),
            Err(DbError::PageFull(_))
        ));
        let values: Vec<_> = page
            .iter()
            .map(|t| t.unwrap().field(0).cloned().unwrap())
            .collect();
        assert_eq!(values, (0..992).map(Field::Int).collect::<Vec<_>>());
    }

    #[test]
    fn test_schema_mismatch() {
        let desc = int_desc();
        let mut page = empty_page(&desc);
        let other = Arc::new(TupleDesc::from_types(&[Type::Int, Type::Int]));
        let mut tuple = Tuple::new(other);
        assert!(matches!(
            page.insert_tuple(&mut tuple),
            Err(DbError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_delete_reuses_first_free_slot() {
        let desc = int_desc();
        let mut page = empty_page(&desc);
        let mut tuples: Vec<_> = (0..3).map(|i| int_tuple(&desc, i)).collect();
        for tuple in tuples.iter_mut() {
            page.insert_tuple(tuple).unwrap();
        }
        page.delete_tuple(&tuples[1]).unwrap();
        assert!(!page.is_slot_used(1));
        assert!(matches!(
            page.delete_tuple(&tuples[1]),
            Err(DbError::SlotEmpty { slot: 1, .. })
        ));

        let mut replacement = int_tuple(&desc, 99);
        assert_eq!(page.insert_tuple(&mut replacement).unwrap(), 1);
        let values: Vec<_> = page.iter().map(|t| t.unwrap().fields().to_vec()).collect();
        assert_eq!(
            values,
            vec![vec![Field::Int(0)], vec![Field::Int(99)], vec![Field::Int(2)]]
        );
    }

    #[test]
    fn test_delete_rejects_foreign_tuples() {
        let desc = int_desc();
        let mut page = empty_page(&desc);
        let unplaced = int_tuple(&desc, 1);
        assert!(matches!(
            page.delete_tuple(&unplaced),
            Err(DbError::TupleNotOnPage { .. })
        ));

        let mut elsewhere = int_tuple(&desc, 1);
        elsewhere.set_record_id(Some(RecordId::new(PageId::new(1, 7), 0)));
        assert!(matches!(
            page.delete_tuple(&elsewhere),
            Err(DbError::TupleNotOnPage { .. })
        ));
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let desc = Arc::new(TupleDesc::from_types(&[Type::Int, Type::Str(10)]));
        let mut page =
            HeapPage::new(PageId::new(3, 2), empty_page_image(1024), Arc::clone(&desc)).unwrap();
        let mut tuples = Vec::new();
        for i in 0..20 {
            let mut tuple = Tuple::from_fields(
                Arc::clone(&desc),
                vec![Field::Int(i), Field::Str(format!("row{i}"))],
            )
            .unwrap();
            page.insert_tuple(&mut tuple).unwrap();
            tuples.push(tuple);
        }
        page.delete_tuple(&tuples[4]).unwrap();
        page.delete_tuple(&tuples[11]).unwrap();

        let image = page.page_data();
        let decoded = HeapPage::new(page.pid(), image.clone(), Arc::clone(&desc)).unwrap();
        assert_eq!(decoded.page_data(), image);
        assert_eq!(decoded.num_empty_slots(), page.num_empty_slots());
        assert_eq!(decoded.iter().count(), 18);
    }

    #[test]
    fn test_trailing_slack_is_preserved() {
        // 4096 * 8 / (12 * 8 + 1) = 337 slots: 43 header bytes + 4044 slot bytes, 9 bytes of slack
        let desc = Arc::new(TupleDesc::from_types(&[Type::Int, Type::Int, Type::Int]));
        let mut image = empty_page_image(4096);
        image[4090] = 0xAB;
        let page = HeapPage::new(PageId::new(1, 0), image.clone(), desc).unwrap();
        assert_eq!(page.num_slots(), 337);
        assert_eq!(page.page_data(), image);
    }

    #[test]
    fn test_dirty_flag() {
        let desc = int_desc();
        let mut page = empty_page(&desc);
        let tid = TransactionId::new();
        assert_eq!(page.is_dirty(), None);
        page.mark_dirty(true, tid);
        assert_eq!(page.is_dirty(), Some(tid));
        page.mark_dirty(false, tid);
        assert_eq!(page.is_dirty(), None);
    }

    #[test]
    fn test_page_too_small_for_tuple() {
        let desc = Arc::new(TupleDesc::from_types(&[Type::Str(128)]));
        assert!(matches!(
            HeapPage::new(PageId::new(1, 0), empty_page_image(64), desc),
            Err(DbError::InvalidPageSize { .. })
        ));
    }
}
