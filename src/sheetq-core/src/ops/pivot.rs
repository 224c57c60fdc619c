//! Pivot tables
//!
//! Cross-tabulates `index` against `columns`, aggregating `values` per cell.
//! Index keys and column keys come out in sorted order. Rows whose index or
//! column key is null are dropped. A key combination with no rows yields a
//! null cell.

use log::debug;
use polars::lazy::frame::pivot::pivot_stable;
use polars::prelude::*;
use sheetq_shared::{Table, Value};

use super::aggregate::{aggregate_expr, check_reducible};
use super::{require_column, CellKind, HandlerContext, OperationHandler, Step};
use crate::error::{Error, Result};
use crate::executor::NumericPrecision;
use crate::plan::{AggFunc, PivotOp};

impl OperationHandler for PivotOp {
    fn apply(&self, input: Table, ctx: &HandlerContext<'_>) -> Result<Step> {
        for column in [&self.index, &self.columns, &self.values] {
            require_column(&input, column, "Pivot")?;
        }
        if self.index == self.columns || self.index == self.values || self.columns == self.values {
            return Err(Error::invalid_plan(format!(
                "pivot needs three distinct columns, got index '{}', columns '{}', values '{}'",
                self.index, self.columns, self.values
            )));
        }
        let values = require_column(&input, &self.values, "Pivot")?;
        check_reducible(self.agg_func, CellKind::of_column(values), &self.values)?;
        let untyped_values = values.dtype() == &DataType::Null;

        let index = self.index.as_str();
        let columns = self.columns.as_str();
        let mut keyed = input
            .into_dataframe()
            .lazy()
            .filter(col(index).is_not_null().and(col(columns).is_not_null()))
            .select([col(index), col(columns), col(self.values.as_str())])
            .collect()?;
        if keyed.height() == 0 {
            return Ok(Step::table(Table::from_dataframe(keyed.select([index])?)));
        }
        if untyped_values {
            let floats = keyed.column(&self.values)?.cast(&DataType::Float64)?;
            keyed.with_column(floats)?;
        }

        // Column keys become their display text, in key order
        let key_column = keyed.column(columns)?;
        let labels = display_labels(key_column.as_materialized_series())?;
        let sorted_keys = key_column
            .as_materialized_series()
            .unique()?
            .sort(SortOptions::default())?;
        let names = display_labels(&sorted_keys)?;
        keyed.with_column(Series::new(columns.into(), labels))?;

        let wide = pivot_stable(
            &keyed,
            [columns],
            Some([index]),
            Some([self.values.as_str()]),
            false,
            Some(aggregate_expr(self.agg_func, element())),
            None,
        )?;

        let mut selection = Vec::with_capacity(names.len() + 1);
        selection.push(self.index.clone());
        selection.extend(names.iter().cloned());
        let mut wide = wide.select(selection)?.sort(
            vec![self.index.clone()],
            SortMultipleOptions::default().with_maintain_order(true),
        )?;

        if truncates(self.agg_func, ctx.options.numeric_precision) {
            let whole: Vec<Expr> = names
                .iter()
                .filter(|name| {
                    wide.column(name.as_str())
                        .is_ok_and(|c| c.dtype().is_float())
                })
                .map(|name| col(name.as_str()).cast(DataType::Int64))
                .collect();
            if !whole.is_empty() {
                wide = wide.lazy().with_columns(whole).collect()?;
            }
        }

        debug!(
            "Pivot produced {} rows x {} value columns",
            wide.height(),
            names.len()
        );
        Ok(Step::table(Table::from_dataframe(wide)))
    }

    fn description(&self) -> String {
        format!(
            "pivot {} by {} x {} using {}",
            self.values, self.index, self.columns, self.agg_func
        )
    }
}

fn display_labels(keys: &Series) -> Result<Vec<String>> {
    (0..keys.len())
        .map(|i| Ok(Value::from_any_value(keys.get(i)?).to_string()))
        .collect()
}

fn truncates(function: AggFunc, precision: NumericPrecision) -> bool {
    precision == NumericPrecision::Truncate
        && matches!(function, AggFunc::Sum | AggFunc::Min | AggFunc::Max)
}
