use crate::ast::Condition;
use crate::error::QueryResult;
use crate::execution::operator::{eval_conds, Executor, Record};
use crate::execution::ExecContext;
use storage::{ColumnMeta, Rid, TableInfo};
use txn::{LockKey, TxnId};

/// Full-table scan evaluating the pushed-down conjuncts per record. Holds an
/// intention-shared lock on the table for the statement's duration.
pub struct SeqScanExecutor {
    table: TableInfo,
    conds: Vec<Condition>,
    ctx: ExecContext,
    rids: Vec<Rid>,
    pos: usize,
    current: Option<(Rid, Vec<u8>)>,
}

impl SeqScanExecutor {
    pub fn new(table: TableInfo, conds: Vec<Condition>, ctx: ExecContext) -> Self {
        Self {
            table,
            conds,
            ctx,
            rids: Vec::new(),
            pos: 0,
            current: None,
        }
    }

    /// Walks forward from `pos` to the next live record satisfying the
    /// conjuncts. Deleted slots read back as None and are skipped.
    fn seek(&mut self) -> QueryResult<()> {
        while self.pos < self.rids.len() {
            let rid = self.rids[self.pos];
            if let Some(record) = self.table.heap.get(rid) {
                if eval_conds(&self.conds, &record, &self.table.cols)? {
                    self.current = Some((rid, record));
                    return Ok(());
                }
            }
            self.pos += 1;
        }
        self.current = None;
        Ok(())
    }
}

impl Executor for SeqScanExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        self.ctx.lock_mgr.lock_intention_shared(
            TxnId(self.ctx.txn_id),
            LockKey::Table(self.table.name.clone()),
        )?;
        self.rids = self.table.heap.rids();
        self.pos = 0;
        self.seek()
    }

    fn is_end(&self) -> bool {
        self.current.is_none()
    }

    fn next(&mut self) -> QueryResult<()> {
        self.pos += 1;
        self.seek()
    }

    fn current(&self) -> QueryResult<Record> {
        let (_, record) = self
            .current
            .as_ref()
            .ok_or_else(|| crate::error::QueryError::Internal("scan read past end".into()))?;
        Ok(Record::new(record.clone()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &self.table.cols
    }

    fn rid(&self) -> Option<Rid> {
        self.current.as_ref().map(|(rid, _)| *rid)
    }
}
