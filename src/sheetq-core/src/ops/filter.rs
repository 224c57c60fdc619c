//! Row filtering
//!
//! Conditions combine with AND: a row survives only if every condition
//! holds. Every column is checked before any row is evaluated. Each
//! condition becomes a boolean polars expression; nulls never satisfy `==`
//! or an ordering and always satisfy `!=`.

use log::debug;
use polars::prelude::*;
use sheetq_shared::date::parse_datetime;
use sheetq_shared::{Table, Value};

use super::{literal, require_column, CellKind, HandlerContext, OperationHandler, Step};
use crate::error::{Error, Result};
use crate::plan::{CompareOp, Condition, FilterOp};

impl OperationHandler for FilterOp {
    fn apply(&self, input: Table, _ctx: &HandlerContext<'_>) -> Result<Step> {
        let kinds = self
            .conditions
            .iter()
            .map(|condition| {
                require_column(&input, &condition.column, "Filter").map(CellKind::of_column)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut predicate = lit(true);
        for (condition, kind) in self.conditions.iter().zip(kinds) {
            predicate = predicate.and(condition.predicate(kind)?);
        }

        let before = input.height();
        let df = input.into_dataframe().lazy().filter(predicate).collect()?;
        debug!("Filter kept {} of {before} rows", df.height());
        Ok(Step::table(Table::from_dataframe(df)))
    }

    fn description(&self) -> String {
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| format!("{} {} {}", c.column, c.operator.as_str(), c.value))
            .collect();
        format!("filter where {}", parts.join(" and "))
    }
}

impl Condition {
    /// Boolean expression for this condition over a column of the given kind
    ///
    /// Equality between different kinds is simply false. Ordering between
    /// different kinds is a `Type` error, except that date columns compare
    /// with date text.
    pub fn predicate(&self, column_kind: CellKind) -> Result<Expr> {
        let Some(operand) = self.operand(column_kind)? else {
            // No cell can compare equal, or satisfy an ordering
            return Ok(lit(self.operator == CompareOp::Ne));
        };

        let column = col(self.column.as_str());
        let expr = match self.operator {
            CompareOp::Eq => column.eq(operand).fill_null(lit(false)),
            CompareOp::Ne => column.neq(operand).fill_null(lit(true)),
            CompareOp::Gt => column.gt(operand).fill_null(lit(false)),
            CompareOp::Lt => column.lt(operand).fill_null(lit(false)),
            CompareOp::Ge => column.gt_eq(operand).fill_null(lit(false)),
            CompareOp::Le => column.lt_eq(operand).fill_null(lit(false)),
        };
        Ok(expr)
    }

    /// The literal to compare against, `None` when no row can match
    fn operand(&self, column_kind: CellKind) -> Result<Option<Expr>> {
        let literal_kind = CellKind::of_value(&self.value);
        if column_kind == CellKind::Null || literal_kind == CellKind::Null {
            return Ok(None);
        }

        if column_kind == literal_kind && column_kind != CellKind::Other {
            return Ok(Some(literal(&self.value)));
        }

        if let (CellKind::Date, Value::String(text)) = (column_kind, &self.value) {
            return match parse_datetime(text) {
                Some(date) => Ok(Some(lit(date))),
                None if self.is_equality() => Ok(None),
                None => Err(Error::type_mismatch(format!(
                    "cannot compare date with non-date string '{text}' using '{}'",
                    self.operator.as_str()
                ))),
            };
        }

        if self.is_equality() {
            return Ok(None);
        }
        Err(Error::type_mismatch(format!(
            "cannot compare {} column '{}' with {} using '{}'",
            column_kind.as_str(),
            self.column,
            self.value.type_name(),
            self.operator.as_str()
        )))
    }

    fn is_equality(&self) -> bool {
        matches!(self.operator, CompareOp::Eq | CompareOp::Ne)
    }
}
