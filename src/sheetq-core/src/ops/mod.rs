//! Operation handlers
//!
//! One handler per plan operation kind. Each handler takes ownership of the
//! current working table and returns either a new table or a terminal scalar
//! map. Handlers never write into the [`TabularStore`]; the join handler only
//! reads from it.
//!
//! Handlers are written as polars expressions over the table's frame.
//! Literals from the plan are checked against the column types first, so a
//! mismatch is reported as a type error instead of a polars failure.
//!
//! Handlers are implemented directly on the validated parameter structs from
//! [`crate::plan`], so dispatch is a plain exhaustive `match` over
//! [`crate::plan::Operation`] in the executor.
//!
//! # Examples
//!
//! ```rust,ignore
//! use sheetq_core::ops::{HandlerContext, OperationHandler};
//! use sheetq_core::plan::{CompareOp, Condition, FilterOp};
//!
//! let filter = FilterOp {
//!     conditions: vec![Condition {
//!         column: "Department".into(),
//!         operator: CompareOp::Eq,
//!         value: "IT".into(),
//!     }],
//! };
//! let step = filter.apply(table, &ctx)?;
//! ```

pub mod aggregate;
pub mod date;
pub mod filter;
pub mod join;
pub mod math;
pub mod pivot;
pub mod text;

use indexmap::IndexMap;
use polars::prelude::*;
use sheetq_shared::{Table, Value};

use crate::error::{Error, Result};
use crate::executor::ExecutorOptions;
use crate::services::TextCompleter;
use crate::store::TabularStore;

/// Everything a handler may read besides its own parameters
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    /// Sheets available to joins
    pub store: &'a TabularStore,
    /// Text completion capability used by text analysis
    pub completer: &'a dyn TextCompleter,
    /// Executor tuning
    pub options: &'a ExecutorOptions,
}

/// What a step produced
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A new working table; execution continues
    Table(Table),
    /// A scalar result; execution stops
    Terminal(IndexMap<String, Value>),
}

/// Result of one handler invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Table or terminal result
    pub outcome: StepOutcome,
    /// Non-fatal problems worth surfacing to the caller
    pub warnings: Vec<String>,
}

impl Step {
    /// A step that produced a table
    #[must_use]
    pub fn table(table: Table) -> Self {
        Self {
            outcome: StepOutcome::Table(table),
            warnings: Vec::new(),
        }
    }

    /// A step that produced a terminal result
    #[must_use]
    pub fn terminal(result: IndexMap<String, Value>) -> Self {
        Self {
            outcome: StepOutcome::Terminal(result),
            warnings: Vec::new(),
        }
    }

    /// Attach a warning
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A single plan step that can be applied to the working table
///
/// Implemented by every operation parameter struct. Handlers own their
/// input so that in-place column replacement never touches the store.
pub trait OperationHandler {
    /// Apply the step
    fn apply(&self, input: Table, ctx: &HandlerContext<'_>) -> Result<Step>;

    /// Get a description of what this step does
    fn description(&self) -> String;
}

/// Look up a column, failing with `ColumnNotFound` for the named operation
pub fn require_column<'t>(
    table: &'t Table,
    column: &str,
    context: &'static str,
) -> Result<&'t Column> {
    table
        .dataframe()
        .column(column)
        .map_err(|_| Error::column_not_found(column, context))
}

/// Broad cell families used to check operands before building expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// No values at all
    Null,
    /// Booleans
    Bool,
    /// Integers and floats
    Number,
    /// Text
    Text,
    /// Dates and date-times
    Date,
    /// Anything else polars can hold
    Other,
}

impl CellKind {
    /// Kind of a polars type
    #[must_use]
    pub fn of_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Null => CellKind::Null,
            DataType::Boolean => CellKind::Bool,
            DataType::String => CellKind::Text,
            DataType::Date | DataType::Datetime(_, _) => CellKind::Date,
            d if d.is_primitive_numeric() => CellKind::Number,
            _ => CellKind::Other,
        }
    }

    /// Kind of a column; a column holding only nulls is `Null`
    #[must_use]
    pub fn of_column(column: &Column) -> Self {
        if column.null_count() == column.len() {
            CellKind::Null
        } else {
            Self::of_dtype(column.dtype())
        }
    }

    /// Kind of a plan literal
    #[must_use]
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => CellKind::Null,
            Value::Bool(_) => CellKind::Bool,
            Value::Int(_) | Value::Float(_) => CellKind::Number,
            Value::String(_) => CellKind::Text,
            Value::Date(_) => CellKind::Date,
        }
    }

    /// Name used in error messages
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CellKind::Null => "null",
            CellKind::Bool => "boolean",
            CellKind::Number => "number",
            CellKind::Text => "string",
            CellKind::Date => "date",
            CellKind::Other => "unsupported",
        }
    }
}

/// A plan literal as a polars expression
#[must_use]
pub fn literal(value: &Value) -> Expr {
    match value {
        Value::Null => lit(NULL),
        Value::Bool(b) => lit(*b),
        Value::Int(i) => lit(*i),
        Value::Float(f) => lit(*f),
        Value::String(s) => lit(s.clone()),
        Value::Date(d) => lit(*d),
    }
}
