use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Column type of a fixed-layout tuple cell. `Str` cells carry their byte
/// width in the owning `ColumnMeta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColType {
    Int,
    Float,
    Str,
}

impl fmt::Display for ColType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColType::Int => write!(f, "INT"),
            ColType::Float => write!(f, "FLOAT"),
            ColType::Str => write!(f, "CHAR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Value {
    pub fn col_type(&self) -> ColType {
        match self {
            Value::Int(_) => ColType::Int,
            Value::Float(_) => ColType::Float,
            Value::Str(_) => ColType::Str,
        }
    }

    /// Encodes the value into a fixed-width cell. Strings are NUL padded and
    /// truncated to `len`; numeric cells are 4-byte little endian.
    pub fn encode(&self, len: usize) -> Vec<u8> {
        match self {
            Value::Int(number) => number.to_le_bytes().to_vec(),
            Value::Float(number) => number.to_le_bytes().to_vec(),
            Value::Str(text) => {
                let mut cell = vec![0u8; len];
                let bytes = text.as_bytes();
                let copied = bytes.len().min(len);
                cell[..copied].copy_from_slice(&bytes[..copied]);
                cell
            }
        }
    }

    /// Reads a cell back into a value. Strings stop at the first NUL.
    pub fn decode(col_type: ColType, cell: &[u8]) -> Value {
        match col_type {
            ColType::Int => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&cell[..4]);
                Value::Int(i32::from_le_bytes(bytes))
            }
            ColType::Float => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&cell[..4]);
                Value::Float(f32::from_le_bytes(bytes))
            }
            ColType::Str => {
                let end = cell.iter().position(|b| *b == 0).unwrap_or(cell.len());
                Value::Str(String::from_utf8_lossy(&cell[..end]).into_owned())
            }
        }
    }

    /// Three-way comparison with int/float promotion. Mixed string/number
    /// comparisons have no ordering.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(left), Value::Int(right)) => Some(left.cmp(right)),
            (Value::Str(left), Value::Str(right)) => Some(left.cmp(right)),
            (Value::Float(left), Value::Float(right)) => left.partial_cmp(right),
            (Value::Int(left), Value::Float(right)) => (*left as f32).partial_cmp(right),
            (Value::Float(left), Value::Int(right)) => left.partial_cmp(&(*right as f32)),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Int(number) => Some(*number as f32),
            Value::Float(number) => Some(*number),
            Value::Str(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(number) => write!(f, "{}", number),
            Value::Float(number) => write!(f, "{}", number),
            Value::Str(text) => write!(f, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_cell_round_trip() {
        let cell = Value::Int(-42).encode(4);
        assert_eq!(Value::decode(ColType::Int, &cell), Value::Int(-42));
    }

    #[test]
    fn str_cell_pads_and_stops_at_nul() {
        let cell = Value::Str("ab".to_string()).encode(5);
        assert_eq!(cell, vec![b'a', b'b', 0, 0, 0]);
        assert_eq!(Value::decode(ColType::Str, &cell), Value::Str("ab".to_string()));
    }

    #[test]
    fn str_cell_truncates_to_len() {
        let cell = Value::Str("hello world".to_string()).encode(5);
        assert_eq!(Value::decode(ColType::Str, &cell), Value::Str("hello".to_string()));
    }

    #[test]
    fn mixed_numeric_comparison_promotes() {
        assert_eq!(
            Value::Int(2).compare(&Value::Float(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Str("a".into()).compare(&Value::Int(1)), None);
    }
}
