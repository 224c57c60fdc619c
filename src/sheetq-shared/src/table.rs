//! In-memory tables
//!
//! A `Table` is a polars [`DataFrame`] with the guarantees sheetq relies on:
//! uniquely named columns of equal length, in a stable order. Handlers work
//! on the frame directly; cells only become [`Value`]s when a table is read
//! row by row or serialized.

use polars::prelude::*;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::value::Value;

/// Errors raised when building a table with an invalid shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// Two columns share a name
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    /// A column's length does not match the table height
    #[error("column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        /// Column name
        column: String,
        /// Table height
        expected: usize,
        /// Column length
        actual: usize,
    },
    /// A column's cells have no common polars type
    #[error("column '{column}' cannot be stored: {reason}")]
    Column {
        /// Column name
        column: String,
        /// Polars' explanation
        reason: String,
    },
}

/// Ordered, uniquely named columns of equal length
#[derive(Debug, Clone)]
pub struct Table {
    df: DataFrame,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    /// Create an empty table with no columns and no rows
    #[must_use]
    pub fn new() -> Self {
        Self {
            df: DataFrame::empty(),
        }
    }

    /// Wrap a frame produced by a reader or a handler
    #[must_use]
    pub fn from_dataframe(df: DataFrame) -> Self {
        Self { df }
    }

    /// Build a table from named columns of cells
    ///
    /// The first column fixes the height; every other column must match it.
    /// Each column takes the narrowest polars type that holds all its cells.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let mut built: Vec<Column> = Vec::new();
        for (name, values) in columns {
            let name = name.into();
            if built.iter().any(|c| c.name().as_str() == name) {
                return Err(TableError::DuplicateColumn(name));
            }
            if let Some(first) = built.first() {
                if first.len() != values.len() {
                    return Err(TableError::LengthMismatch {
                        column: name,
                        expected: first.len(),
                        actual: values.len(),
                    });
                }
            }
            built.push(series_from_values(&name, &values)?.into_column());
        }

        let height = built.first().map_or(0, Column::len);
        let df = DataFrame::new_with_height(height, built).map_err(|e| TableError::Column {
            column: String::new(),
            reason: e.to_string(),
        })?;
        Ok(Self { df })
    }

    /// Build a table from a header and row-major cells
    ///
    /// Short rows are padded with nulls; extra cells are ignored.
    pub fn from_rows<S: Into<String>>(
        header: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, TableError> {
        let names: Vec<String> = header.into_iter().map(Into::into).collect();
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];

        for row in rows {
            let mut cells = row.into_iter();
            for column in &mut columns {
                column.push(cells.next().unwrap_or(Value::Null));
            }
        }

        Table::from_columns(names.into_iter().zip(columns))
    }

    /// The underlying frame
    #[must_use]
    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Give up the wrapper and keep the frame
    #[must_use]
    pub fn into_dataframe(self) -> DataFrame {
        self.df
    }

    /// Number of rows
    #[must_use]
    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// Number of columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.df.width()
    }

    /// True when the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    /// Column names in order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.df.get_columns().iter().map(|c| c.name().as_str())
    }

    /// Check whether a column exists
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.df.get_column_index(name).is_some()
    }

    /// Polars type of a column
    #[must_use]
    pub fn dtype(&self, name: &str) -> Option<&DataType> {
        self.df.column(name).ok().map(Column::dtype)
    }

    /// A column's cells
    #[must_use]
    pub fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        self.df.column(name).ok().map(column_to_values)
    }

    /// A single cell
    #[must_use]
    pub fn cell(&self, column: &str, row: usize) -> Option<Value> {
        let column = self.df.column(column).ok()?;
        column.get(row).ok().map(Value::from_any_value)
    }

    /// One row as `(column, cell)` pairs in column order
    #[must_use]
    pub fn row(&self, index: usize) -> Option<Vec<(&str, Value)>> {
        if index >= self.height() {
            return None;
        }
        self.df
            .get_columns()
            .iter()
            .map(|c| {
                c.get(index)
                    .ok()
                    .map(|cell| (c.name().as_str(), Value::from_any_value(cell)))
            })
            .collect()
    }

    /// Append a column of cells, or replace an existing one in place
    ///
    /// On an empty table the first column sets the height.
    pub fn with_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<(), TableError> {
        let name = name.into();
        if self.width() > 0 && values.len() != self.height() {
            return Err(TableError::LengthMismatch {
                column: name,
                expected: self.height(),
                actual: values.len(),
            });
        }
        let series = series_from_values(&name, &values)?;
        self.df
            .with_column(series)
            .map_err(|e| TableError::Column {
                column: name,
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Convert the table to row objects keyed by column name
    #[must_use]
    pub fn to_json_rows(&self) -> Vec<JsonMap<String, JsonValue>> {
        let columns = self.materialize();
        (0..self.height())
            .map(|row| {
                columns
                    .iter()
                    .map(|(name, values)| ((*name).to_string(), values[row].to_json()))
                    .collect()
            })
            .collect()
    }

    fn materialize(&self) -> Vec<(&str, Vec<Value>)> {
        self.df
            .get_columns()
            .iter()
            .map(|c| (c.name().as_str(), column_to_values(c)))
            .collect()
    }
}

impl From<DataFrame> for Table {
    fn from(df: DataFrame) -> Self {
        Self::from_dataframe(df)
    }
}

/// Tables are equal when names, order and cells agree; numeric widths may differ
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.df.equals_missing(&other.df)
    }
}

/// Build a named series from cells
///
/// Mixed integer and float cells widen to float; dates share one
/// microsecond datetime type.
pub fn series_from_values(name: &str, values: &[Value]) -> Result<Series, TableError> {
    let cells: Vec<AnyValue<'_>> = values.iter().map(Value::to_any_value).collect();
    Series::from_any_values(name.into(), &cells, false).map_err(|e| TableError::Column {
        column: name.to_string(),
        reason: e.to_string(),
    })
}

fn column_to_values(column: &Column) -> Vec<Value> {
    (0..column.len())
        .map(|i| column.get(i).map_or(Value::Null, Value::from_any_value))
        .collect()
}

struct RowRef<'a> {
    columns: &'a [(&'a str, Vec<Value>)],
    row: usize,
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, values) in self.columns {
            let cell = values
                .get(self.row)
                .ok_or_else(|| S::Error::custom(format!("column '{name}' is short")))?;
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Tables serialize as a sequence of row objects whose keys follow column order
impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let columns = self.materialize();
        let mut seq = serializer.serialize_seq(Some(self.height()))?;
        for row in 0..self.height() {
            seq.serialize_element(&RowRef {
                columns: &columns,
                row,
            })?;
        }
        seq.end()
    }
}
