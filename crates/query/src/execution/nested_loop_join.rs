use crate::ast::Condition;
use crate::error::{QueryError, QueryResult};
use crate::execution::operator::{eval_conds, tuple_width, Executor, Record};
use storage::ColumnMeta;

/// Nested-loop join: the inner input restarts for every outer tuple. Output
/// records are `outer || inner`; inner columns keep their own offsets
/// shifted by the outer tuple width.
pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    conds: Vec<Condition>,
    cols: Vec<ColumnMeta>,
    current: Option<Vec<u8>>,
}

impl NestedLoopJoinExecutor {
    pub fn new(left: Box<dyn Executor>, right: Box<dyn Executor>, conds: Vec<Condition>) -> Self {
        let left_width = tuple_width(left.cols());
        let mut cols = left.cols().to_vec();
        cols.extend(right.cols().iter().map(|col| {
            let mut shifted = col.clone();
            shifted.offset += left_width;
            shifted
        }));
        Self {
            left,
            right,
            conds,
            cols,
            current: None,
        }
    }

    fn find_match(&mut self) -> QueryResult<()> {
        loop {
            if self.left.is_end() {
                self.current = None;
                return Ok(());
            }
            if self.right.is_end() {
                self.left.next()?;
                if self.left.is_end() {
                    self.current = None;
                    return Ok(());
                }
                self.right.begin()?;
                continue;
            }
            let mut combined = self.left.current()?.data;
            combined.extend(self.right.current()?.data);
            if eval_conds(&self.conds, &combined, &self.cols)? {
                self.current = Some(combined);
                return Ok(());
            }
            self.right.next()?;
        }
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        self.left.begin()?;
        if !self.left.is_end() {
            self.right.begin()?;
        }
        self.find_match()
    }

    fn is_end(&self) -> bool {
        self.current.is_none()
    }

    fn next(&mut self) -> QueryResult<()> {
        self.right.next()?;
        self.find_match()
    }

    fn current(&self) -> QueryResult<Record> {
        self.current
            .as_ref()
            .map(|data| Record::new(data.clone()))
            .ok_or_else(|| QueryError::Internal("join read past end".into()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &self.cols
    }
}
