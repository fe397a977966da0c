// src/process/mod.rs
pub mod clean;
pub mod concat;
pub mod merge;

use serde_json::Value;
use tracing::trace;

use crate::error::ParseError;

pub use clean::clean_year;
pub use concat::{concat_union, ensure_unique_keys};
pub use merge::StateTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    /// Column names, from the first row of the response.
    pub headers: Vec<String>,
    /// Every later row, positionally aligned to `headers`. JSON `null` is `None`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn num_columns(&self) -> usize {
        self.headers.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)?.as_deref()
    }
}

/// Turn a Census array-of-arrays body into a `RawTable`.
///
/// The first inner array names the columns; every later one is a row and must
/// have exactly as many values. Strings are kept verbatim, numbers and
/// booleans are rendered as text, `null` becomes `None`. No cleaning happens
/// here.
pub fn parse_response(body: &str) -> Result<RawTable, ParseError> {
    let value: Value = serde_json::from_str(body)?;
    let Value::Array(outer) = value else {
        return Err(ParseError::NotAnArray);
    };
    let mut rows = outer.into_iter().enumerate();

    let headers = match rows.next() {
        Some((_, Value::Array(cells))) => cells
            .into_iter()
            .enumerate()
            .map(|(col, cell)| match scalar(cell) {
                Some(Some(name)) => Ok(name),
                _ => Err(ParseError::NonScalar { row: 0, col }),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some((row, _)) => return Err(ParseError::NotARow { row }),
        None => return Err(ParseError::Empty),
    };

    let mut data = Vec::with_capacity(rows.len());
    for (row, item) in rows {
        let Value::Array(cells) = item else {
            return Err(ParseError::NotARow { row });
        };
        if cells.len() != headers.len() {
            return Err(ParseError::RowLength {
                row,
                expected: headers.len(),
                found: cells.len(),
            });
        }
        let values = cells
            .into_iter()
            .enumerate()
            .map(|(col, cell)| scalar(cell).ok_or(ParseError::NonScalar { row, col }))
            .collect::<Result<Vec<_>, _>>()?;
        data.push(values);
    }

    trace!(columns = headers.len(), rows = data.len(), "parsed response");
    Ok(RawTable {
        headers,
        rows: data,
    })
}

/// `None` for nested values, `Some(None)` for JSON null.
fn scalar(cell: Value) -> Option<Option<String>> {
    match cell {
        Value::Null => Some(None),
        Value::String(s) => Some(Some(s)),
        Value::Number(n) => Some(Some(n.to_string())),
        Value::Bool(b) => Some(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => None,
    }
}
