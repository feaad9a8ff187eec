use crate::ast::SetClause;
use crate::error::{QueryError, QueryResult};
use crate::execution::operator::{cell_for, Executor, Record};
use crate::execution::ExecContext;
use storage::{ColumnMeta, TableInfo, Value};
use txn::{LockKey, TxnId};
use wal::LogRecord;

/// Sink executors: one `next()` call performs the whole side effect. They
/// produce no tuples, so `current` is an error and `cols` is empty.

pub struct InsertExecutor {
    table: TableInfo,
    values: Vec<Value>,
    ctx: ExecContext,
    done: bool,
}

impl InsertExecutor {
    pub fn new(table: TableInfo, values: Vec<Value>, ctx: ExecContext) -> Self {
        Self {
            table,
            values,
            ctx,
            done: false,
        }
    }
}

impl Executor for InsertExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.done
    }

    fn next(&mut self) -> QueryResult<()> {
        if self.values.len() != self.table.cols.len() {
            return Err(QueryError::Internal(format!(
                "insert arity {} does not match table {} with {} columns",
                self.values.len(),
                self.table.name,
                self.table.cols.len()
            )));
        }
        let mut record = Vec::with_capacity(self.table.width);
        for (col, value) in self.table.cols.iter().zip(&self.values) {
            record.extend(cell_for(col, value)?);
        }
        let rid = self.table.heap.insert(record.clone())?;
        self.ctx.lock_mgr.lock_exclusive(
            TxnId(self.ctx.txn_id),
            LockKey::Record(self.table.name.clone(), rid.slot),
        )?;
        self.ctx.log_mgr.append(LogRecord::insert(
            self.ctx.txn_id,
            self.table.name.clone(),
            rid.slot,
            record.clone(),
        ));
        for index in &self.table.indexes {
            index.insert_record(&record, rid);
        }
        self.done = true;
        Ok(())
    }

    fn current(&self) -> QueryResult<Record> {
        Err(QueryError::Internal("insert produces no tuples".into()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &[]
    }
}

/// Drives its scan child to exhaustion, X-locking, logging, and unindexing
/// each qualifying record before tombstoning it.
pub struct DeleteExecutor {
    table: TableInfo,
    child: Box<dyn Executor>,
    ctx: ExecContext,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(table: TableInfo, child: Box<dyn Executor>, ctx: ExecContext) -> Self {
        Self {
            table,
            child,
            ctx,
            done: false,
        }
    }
}

impl Executor for DeleteExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.done
    }

    fn next(&mut self) -> QueryResult<()> {
        self.child.begin()?;
        while !self.child.is_end() {
            let rid = self
                .child
                .rid()
                .ok_or_else(|| QueryError::Internal("delete child yields no record ids".into()))?;
            let record = self.child.current()?.data;
            self.ctx.lock_mgr.lock_exclusive(
                TxnId(self.ctx.txn_id),
                LockKey::Record(self.table.name.clone(), rid.slot),
            )?;
            self.ctx.log_mgr.append(LogRecord::delete(
                self.ctx.txn_id,
                self.table.name.clone(),
                rid.slot,
                record.clone(),
            ));
            for index in &self.table.indexes {
                index.delete_record(&record, rid);
            }
            self.table.heap.delete(rid);
            self.child.next()?;
        }
        self.done = true;
        Ok(())
    }

    fn current(&self) -> QueryResult<Record> {
        Err(QueryError::Internal("delete produces no tuples".into()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &[]
    }
}

pub struct UpdateExecutor {
    table: TableInfo,
    child: Box<dyn Executor>,
    set_clauses: Vec<SetClause>,
    ctx: ExecContext,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(
        table: TableInfo,
        child: Box<dyn Executor>,
        set_clauses: Vec<SetClause>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            table,
            child,
            set_clauses,
            ctx,
            done: false,
        }
    }
}

impl Executor for UpdateExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.done
    }

    fn next(&mut self) -> QueryResult<()> {
        self.child.begin()?;
        while !self.child.is_end() {
            let rid = self
                .child
                .rid()
                .ok_or_else(|| QueryError::Internal("update child yields no record ids".into()))?;
            let before = self.child.current()?.data;
            let mut after = before.clone();
            for clause in &self.set_clauses {
                let col = self.table.col(&clause.col.column).ok_or_else(|| {
                    QueryError::UnknownColumn(self.table.name.clone(), clause.col.column.clone())
                })?;
                let cell = cell_for(col, &clause.value)?;
                after[col.offset..col.offset + col.len].copy_from_slice(&cell);
            }
            self.ctx.lock_mgr.lock_exclusive(
                TxnId(self.ctx.txn_id),
                LockKey::Record(self.table.name.clone(), rid.slot),
            )?;
            self.ctx.log_mgr.append(LogRecord::update(
                self.ctx.txn_id,
                self.table.name.clone(),
                rid.slot,
                before.clone(),
                after.clone(),
            ));
            // Every index is remapped; unchanged keys re-enter at the same
            // record id.
            for index in &self.table.indexes {
                index.delete_record(&before, rid);
                index.insert_record(&after, rid);
            }
            self.table.heap.update(rid, after)?;
            self.child.next()?;
        }
        self.done = true;
        Ok(())
    }

    fn current(&self) -> QueryResult<Record> {
        Err(QueryError::Internal("update produces no tuples".into()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &[]
    }
}
