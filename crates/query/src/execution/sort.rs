use crate::ast::ColumnRef;
use crate::error::{QueryError, QueryResult};
use crate::execution::operator::{find_col, read_value, Executor, Record};
use std::cmp::Ordering;
use storage::ColumnMeta;

/// Materializing sort. The child's output layout passes through unchanged;
/// one direction flag applies to the whole key list. The sort is stable, so
/// equal keys keep their input order.
pub struct SortExecutor {
    child: Box<dyn Executor>,
    sort_cols: Vec<ColumnRef>,
    descending: bool,
    rows: Vec<Vec<u8>>,
    pos: usize,
}

impl SortExecutor {
    pub fn new(child: Box<dyn Executor>, sort_cols: Vec<ColumnRef>, descending: bool) -> Self {
        Self {
            child,
            sort_cols,
            descending,
            rows: Vec::new(),
            pos: 0,
        }
    }
}

impl Executor for SortExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        self.rows.clear();
        self.pos = 0;
        self.child.begin()?;
        while !self.child.is_end() {
            self.rows.push(self.child.current()?.data);
            self.child.next()?;
        }
        let mut keys = Vec::with_capacity(self.sort_cols.len());
        for col_ref in &self.sort_cols {
            keys.push(find_col(self.child.cols(), col_ref)?.clone());
        }
        let descending = self.descending;
        self.rows.sort_by(|left, right| {
            for key in &keys {
                let ordering = read_value(left, key)
                    .compare(&read_value(right, key))
                    .unwrap_or(Ordering::Equal);
                let ordering = if descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.pos >= self.rows.len()
    }

    fn next(&mut self) -> QueryResult<()> {
        self.pos += 1;
        Ok(())
    }

    fn current(&self) -> QueryResult<Record> {
        self.rows
            .get(self.pos)
            .map(|data| Record::new(data.clone()))
            .ok_or_else(|| QueryError::Internal("sort read past end".into()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        self.child.cols()
    }
}
