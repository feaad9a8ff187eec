use crate::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// Identifier of a record inside a table heap. Slots are never reused within
/// a heap's lifetime, so a deleted slot stays a tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub slot: u32,
}

impl Rid {
    pub fn new(slot: u32) -> Self {
        Self { slot }
    }
}

#[derive(Default)]
struct HeapInner {
    width: usize,
    slots: Vec<Option<Vec<u8>>>,
}

/// Fixed-width record heap. Handles are cheap clones sharing the same
/// underlying slot vector.
#[derive(Clone)]
pub struct TableHeap {
    inner: Arc<RwLock<HeapInner>>,
}

impl TableHeap {
    pub fn new(width: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HeapInner {
                width,
                slots: Vec::new(),
            })),
        }
    }

    pub fn width(&self) -> usize {
        self.inner.read().width
    }

    pub fn insert(&self, record: Vec<u8>) -> StorageResult<Rid> {
        let mut inner = self.inner.write();
        if record.len() != inner.width {
            return Err(StorageError::RecordMismatch(record.len(), inner.width));
        }
        let slot = inner.slots.len() as u32;
        inner.slots.push(Some(record));
        Ok(Rid::new(slot))
    }

    /// Returns None for deleted or out-of-range slots.
    pub fn get(&self, rid: Rid) -> Option<Vec<u8>> {
        self.inner.read().slots.get(rid.slot as usize)?.clone()
    }

    pub fn update(&self, rid: Rid, record: Vec<u8>) -> StorageResult<()> {
        let mut inner = self.inner.write();
        if record.len() != inner.width {
            return Err(StorageError::RecordMismatch(record.len(), inner.width));
        }
        match inner.slots.get_mut(rid.slot as usize) {
            Some(slot @ Some(_)) => {
                *slot = Some(record);
                Ok(())
            }
            _ => Err(StorageError::SlotEmpty(rid.slot)),
        }
    }

    /// Tombstones the slot. Returns false when it was already deleted.
    pub fn delete(&self, rid: Rid) -> bool {
        let mut inner = self.inner.write();
        match inner.slots.get_mut(rid.slot as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Record ids of every slot, deleted ones included; callers skip the
    /// tombstones through `get`.
    pub fn rids(&self) -> Vec<Rid> {
        let inner = self.inner.read();
        (0..inner.slots.len() as u32).map(Rid::new).collect()
    }

    pub fn scan(&self) -> Vec<(Rid, Vec<u8>)> {
        let inner = self.inner.read();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, record)| {
                record
                    .as_ref()
                    .map(|bytes| (Rid::new(slot as u32), bytes.clone()))
            })
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.inner
            .read()
            .slots
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_round_trip() {
        let heap = TableHeap::new(4);
        let rid = heap.insert(vec![1, 2, 3, 4]).unwrap();
        assert_eq!(heap.get(rid), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn delete_leaves_tombstone() {
        let heap = TableHeap::new(1);
        let first = heap.insert(vec![1]).unwrap();
        let second = heap.insert(vec![2]).unwrap();
        assert!(heap.delete(first));
        assert!(!heap.delete(first));
        assert_eq!(heap.get(first), None);
        assert_eq!(heap.get(second), Some(vec![2]));
        assert_eq!(heap.rids().len(), 2);
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let heap = TableHeap::new(4);
        assert!(matches!(
            heap.insert(vec![1, 2]),
            Err(StorageError::RecordMismatch(2, 4))
        ));
    }
}
