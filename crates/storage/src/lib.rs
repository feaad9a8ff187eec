pub mod catalog;
pub mod heap;
pub mod index;
pub mod value;

pub use catalog::{Catalog, ColDef, ColumnMeta, IndexMeta, TableInfo};
pub use heap::{Rid, TableHeap};
pub use index::OrderedIndex;
pub use value::{ColType, Value};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("table {0} not found")]
    TableNotFound(String),
    #[error("table {0} already exists")]
    TableExists(String),
    #[error("column {0} not found in table {1}")]
    ColumnNotFound(String, String),
    #[error("index on {0}({1}) not found")]
    IndexNotFound(String, String),
    #[error("index on {0}({1}) already exists")]
    IndexExists(String, String),
    #[error("value does not fit column {0}: {1}")]
    ValueMismatch(String, String),
    #[error("record length {0} does not match table width {1}")]
    RecordMismatch(usize, usize),
    #[error("record slot {0} is empty")]
    SlotEmpty(u32),
}

pub type StorageResult<T> = Result<T, StorageError>;
