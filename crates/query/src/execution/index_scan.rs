use crate::ast::{CompOp, Condition, Rhs};
use crate::error::{QueryError, QueryResult};
use crate::execution::operator::{eval_conds, Executor, Record};
use crate::execution::ExecContext;
use storage::index::{encode_value, encoded_len};
use storage::{ColumnMeta, OrderedIndex, Rid, TableInfo, Value};
use txn::{LockKey, TxnId};

/// Index-backed scan. The equality prefix of the matched index columns plus
/// an optional trailing range predicate become a half-open key range
/// `[lo, hi)`; every conjunct is still re-evaluated per record because the
/// index bounds only the prefix columns.
pub struct IndexScanExecutor {
    table: TableInfo,
    index: OrderedIndex,
    conds: Vec<Condition>,
    ctx: ExecContext,
    rids: Vec<Rid>,
    pos: usize,
    current: Option<(Rid, Vec<u8>)>,
}

impl IndexScanExecutor {
    pub fn new(
        table: TableInfo,
        index: OrderedIndex,
        conds: Vec<Condition>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            table,
            index,
            conds,
            ctx,
            rids: Vec::new(),
            pos: 0,
            current: None,
        }
    }

    /// Builds the `[lo, hi)` bounds over the index's encoded key space.
    fn key_range(&self) -> (Vec<u8>, Vec<u8>) {
        let meta = self.index.meta();
        let total_len: usize = meta.cols.iter().map(encoded_len).sum();
        let mut lower: Vec<u8> = Vec::new();
        let mut upper: Vec<u8> = Vec::new();
        let mut lower_after_max = false;
        let mut upper_after_max = true;

        for col in &meta.cols {
            if let Some(value) = self.value_cond_on(col, |op| op == CompOp::Eq) {
                let encoded = encode_value(col, &value);
                lower.extend_from_slice(&encoded);
                upper.extend_from_slice(&encoded);
                continue;
            }
            // First column without an equality pin: apply at most one range
            // bound per side, then stop extending the prefix.
            if let Some(value) = self.value_cond_on(col, |op| matches!(op, CompOp::Gt)) {
                lower.extend_from_slice(&encode_value(col, &value));
                lower_after_max = true;
            } else if let Some(value) = self.value_cond_on(col, |op| matches!(op, CompOp::Ge)) {
                lower.extend_from_slice(&encode_value(col, &value));
            }
            if let Some(value) = self.value_cond_on(col, |op| matches!(op, CompOp::Lt)) {
                upper.extend_from_slice(&encode_value(col, &value));
                upper_after_max = false;
            } else if let Some(value) = self.value_cond_on(col, |op| matches!(op, CompOp::Le)) {
                upper.extend_from_slice(&encode_value(col, &value));
            }
            break;
        }

        if lower_after_max {
            // Exclusive lower: step past every key sharing the bound prefix.
            lower.extend(std::iter::repeat(0xFF).take(total_len - lower.len()));
            lower.push(0);
        }
        if upper_after_max {
            // Inclusive upper turned exclusive for the half-open contract.
            upper.extend(std::iter::repeat(0xFF).take(total_len - upper.len()));
            upper.push(0);
        }
        (lower, upper)
    }

    fn value_cond_on(&self, col: &ColumnMeta, want: impl Fn(CompOp) -> bool) -> Option<Value> {
        self.conds.iter().find_map(|cond| {
            if cond.lhs.table != self.table.name || !cond.lhs.column.eq_ignore_ascii_case(&col.name)
            {
                return None;
            }
            if !want(cond.op) {
                return None;
            }
            match &cond.rhs {
                Rhs::Value(value) => Some(value.clone()),
                Rhs::Column(_) => None,
            }
        })
    }

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

impl Executor for IndexScanExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        self.ctx.lock_mgr.lock_intention_shared(
            TxnId(self.ctx.txn_id),
            LockKey::Table(self.table.name.clone()),
        )?;
        let (lower, upper) = self.key_range();
        self.rids = self.index.range(&lower, &upper);
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
            .ok_or_else(|| QueryError::Internal("index scan read past end".into()))?;
        Ok(Record::new(record.clone()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &self.table.cols
    }

    fn index_name(&self) -> String {
        self.index.name()
    }

    fn rid(&self) -> Option<Rid> {
        self.current.as_ref().map(|(rid, _)| *rid)
    }
}
