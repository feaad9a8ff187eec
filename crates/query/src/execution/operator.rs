use crate::ast::{ColumnRef, Condition, Rhs};
use crate::error::{QueryError, QueryResult};
use storage::{ColType, ColumnMeta, Rid, Value};

/// One output tuple: a contiguous byte buffer whose layout is described by
/// the producing operator's `cols()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn read(&self, col: &ColumnMeta) -> Value {
        read_value(&self.data, col)
    }
}

/// Volcano-style iterator every operator implements. `next` has the
/// precondition `!is_end()`; `cols` is stable across one open iteration.
pub trait Executor {
    fn begin(&mut self) -> QueryResult<()>;
    fn is_end(&self) -> bool;
    fn next(&mut self) -> QueryResult<()>;
    fn current(&self) -> QueryResult<Record>;
    fn cols(&self) -> &[ColumnMeta];

    /// For scans: name of the matched index, empty otherwise.
    fn index_name(&self) -> String {
        String::new()
    }

    /// For scans: record id of the current tuple, consumed by DML sinks.
    fn rid(&self) -> Option<Rid> {
        None
    }
}

pub fn read_value(record: &[u8], col: &ColumnMeta) -> Value {
    Value::decode(col.col_type, &record[col.offset..col.offset + col.len])
}

/// Resolves a column reference against an operator's output schema. An empty
/// table qualifier matches by name alone.
pub fn find_col<'a>(cols: &'a [ColumnMeta], wanted: &ColumnRef) -> QueryResult<&'a ColumnMeta> {
    cols.iter()
        .find(|col| {
            col.name.eq_ignore_ascii_case(&wanted.column)
                && (wanted.table.is_empty() || col.table.eq_ignore_ascii_case(&wanted.table))
        })
        .ok_or_else(|| QueryError::UnknownColumn(wanted.table.clone(), wanted.column.clone()))
}

/// Evaluates a conjunction against one record. Incomparable operand types
/// are an internal error: the analyzer is supposed to reject them.
pub fn eval_conds(conds: &[Condition], record: &[u8], cols: &[ColumnMeta]) -> QueryResult<bool> {
    for cond in conds {
        let lhs_col = find_col(cols, &cond.lhs)?;
        let lhs = read_value(record, lhs_col);
        let rhs = match &cond.rhs {
            Rhs::Value(value) => value.clone(),
            Rhs::Column(col_ref) => read_value(record, find_col(cols, col_ref)?),
        };
        let ordering = lhs.compare(&rhs).ok_or_else(|| {
            QueryError::Internal(format!(
                "incomparable operands for {} {} rhs",
                cond.lhs, cond.op
            ))
        })?;
        if !cond.op.matches(ordering) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Encodes a literal into a column's fixed-width cell, promoting ints into
/// float columns; any other type mix is rejected.
pub fn cell_for(col: &ColumnMeta, value: &Value) -> QueryResult<Vec<u8>> {
    match (col.col_type, value) {
        (ColType::Int, Value::Int(_))
        | (ColType::Float, Value::Float(_))
        | (ColType::Str, Value::Str(_)) => Ok(value.encode(col.len)),
        (ColType::Float, Value::Int(number)) => Ok(Value::Float(*number as f32).encode(col.len)),
        _ => Err(QueryError::Catalog(storage::StorageError::ValueMismatch(
            format!("{}.{}", col.table, col.name),
            format!("{:?}", value),
        ))),
    }
}

/// Total byte width of a contiguous layout.
pub fn tuple_width(cols: &[ColumnMeta]) -> usize {
    cols.iter().map(|col| col.len).sum()
}
