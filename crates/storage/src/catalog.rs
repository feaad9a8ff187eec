use crate::heap::TableHeap;
use crate::index::OrderedIndex;
use crate::value::ColType;
use crate::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Resolved column of a stored table: byte position and width inside the
/// fixed tuple layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub table: String,
    pub name: String,
    pub col_type: ColType,
    pub offset: usize,
    pub len: usize,
}

/// Column definition accepted by CREATE TABLE, before offsets are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColDef {
    pub name: String,
    pub col_type: ColType,
    pub len: usize,
}

impl ColDef {
    pub fn int(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            col_type: ColType::Int,
            len: 4,
        }
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            col_type: ColType::Float,
            len: 4,
        }
    }

    pub fn chars(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            col_type: ColType::Str,
            len,
        }
    }
}

/// Index metadata. Column order is significant: access-path matching walks
/// the columns left to right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub table: String,
    pub cols: Vec<ColumnMeta>,
}

impl IndexMeta {
    pub fn index_name(&self) -> String {
        let cols = self
            .cols
            .iter()
            .map(|col| col.name.as_str())
            .collect::<Vec<_>>()
            .join("_");
        format!("{}_{}", self.table, cols)
    }

    pub fn col_names(&self) -> Vec<String> {
        self.cols.iter().map(|col| col.name.clone()).collect()
    }
}

/// A registered table: resolved schema plus the heap and index handles the
/// executors operate on. Handles are cheap clones.
#[derive(Clone)]
pub struct TableInfo {
    pub name: String,
    pub cols: Vec<ColumnMeta>,
    pub width: usize,
    pub heap: TableHeap,
    pub indexes: Vec<OrderedIndex>,
}

impl TableInfo {
    pub fn col(&self, name: &str) -> Option<&ColumnMeta> {
        self.cols
            .iter()
            .find(|col| col.name.eq_ignore_ascii_case(name))
    }

    pub fn index_metas(&self) -> Vec<IndexMeta> {
        self.indexes.iter().map(|ix| ix.meta().clone()).collect()
    }

    /// Index whose leading columns are exactly the given names, in order.
    pub fn index_matching_prefix(&self, prefix: &[String]) -> Option<&OrderedIndex> {
        self.indexes.iter().find(|ix| {
            let cols = ix.meta().cols.iter().map(|c| c.name.as_str());
            prefix.len() <= ix.meta().cols.len()
                && prefix
                    .iter()
                    .zip(cols)
                    .all(|(want, have)| want.eq_ignore_ascii_case(have))
        })
    }
}

pub struct Catalog {
    db_name: String,
    tables: HashMap<String, TableInfo>,
}

impl Catalog {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            tables: HashMap::new(),
        }
    }

    pub fn get_db_name(&self) -> &str {
        &self.db_name
    }

    pub fn create_table(&mut self, name: &str, col_defs: &[ColDef]) -> StorageResult<()> {
        let key = normalize_name(name);
        if self.tables.contains_key(&key) {
            return Err(StorageError::TableExists(name.to_string()));
        }
        let mut cols = Vec::with_capacity(col_defs.len());
        let mut offset = 0;
        for def in col_defs {
            cols.push(ColumnMeta {
                table: name.to_string(),
                name: def.name.clone(),
                col_type: def.col_type,
                offset,
                len: def.len,
            });
            offset += def.len;
        }
        let table = TableInfo {
            name: name.to_string(),
            cols,
            width: offset,
            heap: TableHeap::new(offset),
            indexes: Vec::new(),
        };
        self.tables.insert(key, table);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> StorageResult<()> {
        let key = normalize_name(name);
        if self.tables.remove(&key).is_none() {
            return Err(StorageError::TableNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> StorageResult<&TableInfo> {
        self.tables
            .get(&normalize_name(name))
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    pub fn create_index(&mut self, table_name: &str, col_names: &[String]) -> StorageResult<()> {
        let key = normalize_name(table_name);
        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| StorageError::TableNotFound(table_name.to_string()))?;
        let mut cols = Vec::with_capacity(col_names.len());
        for name in col_names {
            let col = table
                .cols
                .iter()
                .find(|col| col.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    StorageError::ColumnNotFound(name.clone(), table_name.to_string())
                })?;
            cols.push(col.clone());
        }
        let meta = IndexMeta {
            table: table.name.clone(),
            cols,
        };
        if table
            .indexes
            .iter()
            .any(|ix| ix.meta().col_names() == meta.col_names())
        {
            return Err(StorageError::IndexExists(
                table_name.to_string(),
                col_names.join(","),
            ));
        }
        let index = OrderedIndex::build(meta, &table.heap);
        table.indexes.push(index);
        Ok(())
    }

    pub fn drop_index(&mut self, table_name: &str, col_names: &[String]) -> StorageResult<()> {
        let key = normalize_name(table_name);
        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| StorageError::TableNotFound(table_name.to_string()))?;
        let wanted: Vec<String> = col_names.to_vec();
        let before = table.indexes.len();
        table.indexes.retain(|ix| {
            let names = ix.meta().col_names();
            names.len() != wanted.len()
                || !names
                    .iter()
                    .zip(wanted.iter())
                    .all(|(have, want)| have.eq_ignore_ascii_case(want))
        });
        if table.indexes.len() == before {
            return Err(StorageError::IndexNotFound(
                table_name.to_string(),
                col_names.join(","),
            ));
        }
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    pub fn show_tables(&self) -> String {
        let mut out = String::from("Tables\n");
        for name in self.table_names() {
            let _ = writeln!(out, "{}", name);
        }
        out
    }

    pub fn show_indexes(&self, table_name: &str) -> StorageResult<String> {
        let table = self.get_table(table_name)?;
        let mut out = String::new();
        for index in &table.indexes {
            let cols = index.meta().col_names().join(",");
            let _ = writeln!(out, "{} ({})", table.name, cols);
        }
        Ok(out)
    }

    pub fn desc_table(&self, table_name: &str) -> StorageResult<String> {
        let table = self.get_table(table_name)?;
        let mut out = format!("Table {}\n", table.name);
        for col in &table.cols {
            match col.col_type {
                ColType::Str => {
                    let _ = writeln!(out, "  {} CHAR({})", col.name, col.len);
                }
                other => {
                    let _ = writeln!(out, "  {} {}", col.name, other);
                }
            }
        }
        Ok(out)
    }
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}
