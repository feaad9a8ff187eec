use crate::catalog::{ColumnMeta, IndexMeta};
use crate::heap::{Rid, TableHeap};
use crate::value::{ColType, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Secondary index over a table heap. Keys are order-preserving byte
/// encodings of the indexed columns, concatenated left to right, so a plain
/// ordered map gives the same range semantics a B+-tree would.
#[derive(Clone)]
pub struct OrderedIndex {
    meta: IndexMeta,
    tree: Arc<RwLock<BTreeMap<Vec<u8>, Vec<Rid>>>>,
}

impl OrderedIndex {
    pub fn build(meta: IndexMeta, heap: &TableHeap) -> Self {
        let index = Self {
            meta,
            tree: Arc::new(RwLock::new(BTreeMap::new())),
        };
        for (rid, record) in heap.scan() {
            index.insert_record(&record, rid);
        }
        index
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn name(&self) -> String {
        self.meta.index_name()
    }

    pub fn insert_record(&self, record: &[u8], rid: Rid) {
        let key = self.key_of(record);
        self.tree.write().entry(key).or_default().push(rid);
    }

    pub fn delete_record(&self, record: &[u8], rid: Rid) {
        let key = self.key_of(record);
        let mut tree = self.tree.write();
        if let Some(rids) = tree.get_mut(&key) {
            rids.retain(|existing| *existing != rid);
            if rids.is_empty() {
                tree.remove(&key);
            }
        }
    }

    /// Half-open scan over raw encoded key bounds: `lower <= key < upper`.
    pub fn range(&self, lower: &[u8], upper: &[u8]) -> Vec<Rid> {
        let tree = self.tree.read();
        tree.range(lower.to_vec()..upper.to_vec())
            .flat_map(|(_, rids)| rids.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    fn key_of(&self, record: &[u8]) -> Vec<u8> {
        let mut key = Vec::new();
        for col in &self.meta.cols {
            let cell = &record[col.offset..col.offset + col.len];
            key.extend_from_slice(&encode_cell(col, cell));
        }
        key
    }
}

/// Encoded width of one key part.
pub fn encoded_len(col: &ColumnMeta) -> usize {
    match col.col_type {
        ColType::Int | ColType::Float => 4,
        ColType::Str => col.len,
    }
}

/// Order-preserving encoding of one tuple cell: signed ints get their sign
/// bit flipped, floats use the standard total-order bit trick, strings are
/// already lexicographic.
pub fn encode_cell(col: &ColumnMeta, cell: &[u8]) -> Vec<u8> {
    match col.col_type {
        ColType::Int => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&cell[..4]);
            let flipped = (i32::from_le_bytes(bytes) as u32) ^ 0x8000_0000;
            flipped.to_be_bytes().to_vec()
        }
        ColType::Float => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&cell[..4]);
            let bits = f32::from_le_bytes(bytes).to_bits();
            let ordered = if bits & 0x8000_0000 != 0 {
                !bits
            } else {
                bits | 0x8000_0000
            };
            ordered.to_be_bytes().to_vec()
        }
        ColType::Str => cell[..col.len].to_vec(),
    }
}

pub fn encode_value(col: &ColumnMeta, value: &Value) -> Vec<u8> {
    encode_cell(col, &value.encode(col.len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnMeta;

    fn int_col(name: &str, offset: usize) -> ColumnMeta {
        ColumnMeta {
            table: "t".to_string(),
            name: name.to_string(),
            col_type: ColType::Int,
            offset,
            len: 4,
        }
    }

    fn meta(cols: Vec<ColumnMeta>) -> IndexMeta {
        IndexMeta {
            table: "t".to_string(),
            cols,
        }
    }

    #[test]
    fn int_encoding_orders_negatives_first() {
        let col = int_col("a", 0);
        let low = encode_value(&col, &Value::Int(-5));
        let mid = encode_value(&col, &Value::Int(0));
        let high = encode_value(&col, &Value::Int(5));
        assert!(low < mid && mid < high);
    }

    #[test]
    fn float_encoding_is_order_preserving() {
        let col = ColumnMeta {
            table: "t".to_string(),
            name: "f".to_string(),
            col_type: ColType::Float,
            offset: 0,
            len: 4,
        };
        let values = [-3.5f32, -0.25, 0.0, 1.0, 100.5];
        let encoded: Vec<_> = values
            .iter()
            .map(|v| encode_value(&col, &Value::Float(*v)))
            .collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn range_scan_is_half_open() {
        let heap = TableHeap::new(4);
        let index_meta = meta(vec![int_col("a", 0)]);
        let index = OrderedIndex::build(index_meta, &heap);
        for value in 0..10 {
            let record = Value::Int(value).encode(4);
            let rid = heap.insert(record.clone()).unwrap();
            index.insert_record(&record, rid);
        }
        let col = int_col("a", 0);
        let lower = encode_value(&col, &Value::Int(3));
        let upper = encode_value(&col, &Value::Int(7));
        let rids = index.range(&lower, &upper);
        assert_eq!(rids.len(), 4); // 3, 4, 5, 6
    }

    #[test]
    fn delete_removes_single_rid() {
        let heap = TableHeap::new(4);
        let index = OrderedIndex::build(meta(vec![int_col("a", 0)]), &heap);
        let record = Value::Int(7).encode(4);
        let first = heap.insert(record.clone()).unwrap();
        let second = heap.insert(record.clone()).unwrap();
        index.insert_record(&record, first);
        index.insert_record(&record, second);
        index.delete_record(&record, first);
        assert_eq!(index.len(), 1);
        let col = int_col("a", 0);
        let lower = encode_value(&col, &Value::Int(7));
        let mut upper = lower.clone();
        upper.push(0);
        assert_eq!(index.range(&lower, &upper), vec![second]);
    }
}
