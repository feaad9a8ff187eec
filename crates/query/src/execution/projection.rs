use crate::ast::{AggregateExpr, ColumnRef};
use crate::error::QueryResult;
use crate::execution::operator::{find_col, Executor, Record};
use storage::ColumnMeta;

/// Selects the requested columns in declared order into a sequentially laid
/// out record. When aggregates are present the group/aggregate child already
/// produced the final layout, so the projection passes records through and
/// the formatter reads the aggregate cells past the declared columns.
pub struct ProjectionExecutor {
    child: Box<dyn Executor>,
    sel_cols: Vec<ColumnRef>,
    pass_through: bool,
    sources: Vec<ColumnMeta>,
    cols: Vec<ColumnMeta>,
}

impl ProjectionExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        sel_cols: Vec<ColumnRef>,
        sel_aggs: &[AggregateExpr],
    ) -> Self {
        Self {
            child,
            sel_cols,
            pass_through: !sel_aggs.is_empty(),
            sources: Vec::new(),
            cols: Vec::new(),
        }
    }
}

impl Executor for ProjectionExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        self.child.begin()?;
        self.sources.clear();
        self.cols.clear();
        if self.pass_through {
            self.cols = self.child.cols().to_vec();
            return Ok(());
        }
        let mut offset = 0;
        for col_ref in &self.sel_cols {
            let source = find_col(self.child.cols(), col_ref)?.clone();
            let mut out = source.clone();
            out.offset = offset;
            offset += out.len;
            self.sources.push(source);
            self.cols.push(out);
        }
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.child.is_end()
    }

    fn next(&mut self) -> QueryResult<()> {
        self.child.next()
    }

    fn current(&self) -> QueryResult<Record> {
        let input = self.child.current()?;
        if self.pass_through {
            return Ok(input);
        }
        let mut data = Vec::with_capacity(self.cols.iter().map(|col| col.len).sum());
        for source in &self.sources {
            data.extend_from_slice(&input.data[source.offset..source.offset + source.len]);
        }
        Ok(Record::new(data))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &self.cols
    }

    fn index_name(&self) -> String {
        self.child.index_name()
    }
}
