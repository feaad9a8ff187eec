use crate::ast::Condition;
use crate::error::{QueryError, QueryResult};
use crate::execution::operator::{
    eval_conds, find_col, read_value, tuple_width, Executor, Record,
};
use std::cmp::Ordering;
use storage::ColumnMeta;

/// Merge join over two inputs already sorted on the equi-join column (the
/// planner guarantees this by sorting sequential children). Equal-key groups
/// on both sides emit their cartesian product.
pub struct SortMergeJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    conds: Vec<Condition>,
    cols: Vec<ColumnMeta>,
    joined: Vec<Vec<u8>>,
    pos: usize,
}

impl SortMergeJoinExecutor {
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
            joined: Vec::new(),
            pos: 0,
        }
    }

    fn merge(&mut self) -> QueryResult<()> {
        let first = self.conds.first().ok_or_else(|| {
            QueryError::Internal("sort merge join requires an equi-join condition".into())
        })?;
        let left_key = find_col(self.left.cols(), &first.lhs)?.clone();
        let right_key = first
            .rhs_column()
            .ok_or_else(|| {
                QueryError::Internal("sort merge join condition without column rhs".into())
            })
            .and_then(|col| find_col(self.right.cols(), col).cloned())?;

        let left_rows = drain(self.left.as_mut())?;
        let right_rows = drain(self.right.as_mut())?;

        let mut i = 0;
        let mut j = 0;
        while i < left_rows.len() && j < right_rows.len() {
            let left_value = read_value(&left_rows[i], &left_key);
            let right_value = read_value(&right_rows[j], &right_key);
            let ordering = left_value.compare(&right_value).ok_or_else(|| {
                QueryError::Internal("incomparable join keys in sort merge join".into())
            })?;
            match ordering {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let i_end = group_end(&left_rows, i, &left_key);
                    let j_end = group_end(&right_rows, j, &right_key);
                    for left_row in &left_rows[i..i_end] {
                        for right_row in &right_rows[j..j_end] {
                            let mut combined = left_row.clone();
                            combined.extend_from_slice(right_row);
                            if eval_conds(&self.conds, &combined, &self.cols)? {
                                self.joined.push(combined);
                            }
                        }
                    }
                    i = i_end;
                    j = j_end;
                }
            }
        }
        Ok(())
    }
}

fn drain(exec: &mut dyn Executor) -> QueryResult<Vec<Vec<u8>>> {
    let mut rows = Vec::new();
    exec.begin()?;
    while !exec.is_end() {
        rows.push(exec.current()?.data);
        exec.next()?;
    }
    Ok(rows)
}

/// End of the run of rows sharing the key at `start`.
fn group_end(rows: &[Vec<u8>], start: usize, key: &ColumnMeta) -> usize {
    let value = read_value(&rows[start], key);
    let mut end = start + 1;
    while end < rows.len() {
        if read_value(&rows[end], key).compare(&value) != Some(Ordering::Equal) {
            break;
        }
        end += 1;
    }
    end
}

impl Executor for SortMergeJoinExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        self.joined.clear();
        self.pos = 0;
        self.merge()
    }

    fn is_end(&self) -> bool {
        self.pos >= self.joined.len()
    }

    fn next(&mut self) -> QueryResult<()> {
        self.pos += 1;
        Ok(())
    }

    fn current(&self) -> QueryResult<Record> {
        self.joined
            .get(self.pos)
            .map(|data| Record::new(data.clone()))
            .ok_or_else(|| QueryError::Internal("merge join read past end".into()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &self.cols
    }
}
