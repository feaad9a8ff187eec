use crate::ast::{AggFunc, AggregateExpr, ColumnRef, Condition};
use crate::error::{QueryError, QueryResult};
use crate::execution::operator::{eval_conds, find_col, read_value, Executor, Record};
use std::collections::HashMap;
use storage::ColumnMeta;

/// Grouped aggregation. Buffers the child, partitions rows by the byte image
/// of their group-key cells, folds the accumulators, applies HAVING, then
/// yields one synthetic record per group laid out as
/// `[group columns, sequentially][one 4-byte cell per aggregate]`.
/// COUNT cells are i32, every other aggregate is f32.
pub struct GroupByExecutor {
    child: Box<dyn Executor>,
    group_cols: Vec<ColumnRef>,
    having: Vec<Condition>,
    aggs: Vec<AggregateExpr>,
    out_cols: Vec<ColumnMeta>,
    rows: Vec<Vec<u8>>,
    pos: usize,
}

impl GroupByExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        group_cols: Vec<ColumnRef>,
        having: Vec<Condition>,
        aggs: Vec<AggregateExpr>,
    ) -> Self {
        Self {
            child,
            group_cols,
            having,
            aggs,
            out_cols: Vec::new(),
            rows: Vec::new(),
            pos: 0,
        }
    }

    fn build_groups(&mut self) -> QueryResult<()> {
        let mut key_cols = Vec::with_capacity(self.group_cols.len());
        for col_ref in &self.group_cols {
            key_cols.push(find_col(self.child.cols(), col_ref)?.clone());
        }
        // Output layout: group cells packed from offset 0 in declared order.
        self.out_cols.clear();
        let mut offset = 0;
        for col in &key_cols {
            let mut out = col.clone();
            out.offset = offset;
            offset += out.len;
            self.out_cols.push(out);
        }

        let mut agg_inputs: Vec<Option<ColumnMeta>> = Vec::with_capacity(self.aggs.len());
        for agg in &self.aggs {
            if agg.is_count_star() {
                agg_inputs.push(None);
            } else {
                agg_inputs.push(Some(find_col(self.child.cols(), &agg.cols[0])?.clone()));
            }
        }

        let mut order: Vec<Vec<u8>> = Vec::new();
        let mut groups: HashMap<Vec<u8>, Vec<Acc>> = HashMap::new();
        if self.group_cols.is_empty() {
            // Aggregate-only queries produce exactly one row, even over an
            // empty input.
            order.push(Vec::new());
            groups.insert(Vec::new(), self.fresh_accs());
        }

        while !self.child.is_end() {
            let record = self.child.current()?.data;
            let mut key = Vec::new();
            for col in &key_cols {
                key.extend_from_slice(&record[col.offset..col.offset + col.len]);
            }
            if !groups.contains_key(&key) {
                order.push(key.clone());
                groups.insert(key.clone(), self.fresh_accs());
            }
            let accs = groups.get_mut(&key).expect("group inserted above");
            for (acc, input) in accs.iter_mut().zip(&agg_inputs) {
                let value = match input {
                    Some(col) => {
                        let value = read_value(&record, col);
                        Some(value.as_f32().ok_or_else(|| {
                            QueryError::Internal(format!(
                                "aggregate over non-numeric column {}.{}",
                                col.table, col.name
                            ))
                        })?)
                    }
                    None => None,
                };
                acc.fold(value);
            }
            self.child.next()?;
        }

        self.rows.clear();
        for key in order {
            let accs = &groups[&key];
            let mut row = key.clone();
            for acc in accs {
                row.extend_from_slice(&acc.emit());
            }
            if eval_conds(&self.having, &row, &self.out_cols)? {
                self.rows.push(row);
            }
        }
        Ok(())
    }

    fn fresh_accs(&self) -> Vec<Acc> {
        self.aggs.iter().map(|agg| Acc::new(agg.func)).collect()
    }
}

/// Per-group accumulator for one aggregate expression.
enum Acc {
    Count(i32),
    Sum(f32),
    Avg { sum: f32, count: i32 },
    Min(Option<f32>),
    Max(Option<f32>),
}

impl Acc {
    fn new(func: AggFunc) -> Self {
        match func {
            AggFunc::Count => Acc::Count(0),
            AggFunc::Sum => Acc::Sum(0.0),
            AggFunc::Avg => Acc::Avg { sum: 0.0, count: 0 },
            AggFunc::Min => Acc::Min(None),
            AggFunc::Max => Acc::Max(None),
        }
    }

    fn fold(&mut self, value: Option<f32>) {
        match self {
            Acc::Count(count) => *count += 1,
            Acc::Sum(sum) => *sum += value.unwrap_or(0.0),
            Acc::Avg { sum, count } => {
                *sum += value.unwrap_or(0.0);
                *count += 1;
            }
            Acc::Min(min) => {
                if let Some(value) = value {
                    *min = Some(min.map_or(value, |current| current.min(value)));
                }
            }
            Acc::Max(max) => {
                if let Some(value) = value {
                    *max = Some(max.map_or(value, |current| current.max(value)));
                }
            }
        }
    }

    fn emit(&self) -> [u8; 4] {
        match self {
            Acc::Count(count) => count.to_le_bytes(),
            Acc::Sum(sum) => sum.to_le_bytes(),
            Acc::Avg { sum, count } => {
                let avg = if *count == 0 { 0.0 } else { sum / *count as f32 };
                avg.to_le_bytes()
            }
            Acc::Min(min) => min.unwrap_or(0.0).to_le_bytes(),
            Acc::Max(max) => max.unwrap_or(0.0).to_le_bytes(),
        }
    }
}

impl Executor for GroupByExecutor {
    fn begin(&mut self) -> QueryResult<()> {
        self.pos = 0;
        self.child.begin()?;
        self.build_groups()
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
            .ok_or_else(|| QueryError::Internal("group by read past end".into()))
    }

    fn cols(&self) -> &[ColumnMeta] {
        &self.out_cols
    }
}
