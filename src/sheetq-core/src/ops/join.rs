//! Join operations
//!
//! Joins ignore the working table and read both sheets fresh from the store.
//! Rows match when their key cells are equal; null keys never match.
//!
//! Output columns are the left sheet's columns followed by the right sheet's
//! columns without the key. Non-key names present on both sides get the
//! [`LEFT_SUFFIX`] and [`RIGHT_SUFFIX`] suffixes.
//!
//! Row order follows the preserved side: left order for inner, left and
//! outer joins (outer appends unmatched right rows at the end), right order
//! for right joins.

use log::debug;
use polars::prelude::*;
use sheetq_shared::Table;

use super::{require_column, CellKind, HandlerContext, OperationHandler, Step};
use crate::error::{Error, Result};
use crate::plan::{JoinKind, JoinOp};

/// Suffix for clashing left-hand columns
pub const LEFT_SUFFIX: &str = "_x";
/// Suffix for clashing right-hand columns
pub const RIGHT_SUFFIX: &str = "_y";

const LEFT_ROW: &str = "__left_row";
const RIGHT_ROW: &str = "__right_row";

impl From<JoinKind> for JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Inner => JoinType::Inner,
            JoinKind::Left => JoinType::Left,
            JoinKind::Right => JoinType::Right,
            JoinKind::Outer => JoinType::Full,
        }
    }
}

impl OperationHandler for JoinOp {
    fn apply(&self, _input: Table, ctx: &HandlerContext<'_>) -> Result<Step> {
        let left = ctx.store.table(&self.left_sheet)?;
        let right = ctx.store.table(&self.right_sheet)?;
        let on = self.on_column.as_str();
        require_column(left, on, "Join")?;
        require_column(right, on, "Join")?;

        let mut left_df = left.dataframe().clone();
        let mut right_df = right.dataframe().clone();
        let mut output_columns = Vec::with_capacity(left.width() + right.width());
        for name in left.column_names() {
            if name != on && right.has_column(name) {
                let renamed = format!("{name}{LEFT_SUFFIX}");
                left_df.rename(name, renamed.as_str().into())?;
                output_columns.push(renamed);
            } else {
                output_columns.push(name.to_string());
            }
        }
        for name in right.column_names().filter(|name| *name != on) {
            if left.has_column(name) {
                let renamed = format!("{name}{RIGHT_SUFFIX}");
                right_df.rename(name, renamed.as_str().into())?;
                output_columns.push(renamed);
            } else {
                output_columns.push(name.to_string());
            }
        }
        align_keys(&mut left_df, &mut right_df, on)?;

        let order = match self.join_type {
            JoinKind::Right => [RIGHT_ROW, LEFT_ROW],
            _ => [LEFT_ROW, RIGHT_ROW],
        };
        let joined = left_df
            .with_row_index(LEFT_ROW.into(), None)?
            .lazy()
            .join(
                right_df.with_row_index(RIGHT_ROW.into(), None)?.lazy(),
                [col(on)],
                [col(on)],
                JoinArgs::new(self.join_type.into()).with_coalesce(JoinCoalesce::CoalesceColumns),
            )
            .sort(
                order,
                SortMultipleOptions::default()
                    .with_nulls_last(true)
                    .with_maintain_order(true),
            )
            .select(output_columns.iter().map(|name| col(name.as_str())).collect::<Vec<_>>())
            .collect()?;

        debug!(
            "{} join of '{}' and '{}' on '{}' produced {} rows",
            self.join_type.as_str(),
            self.left_sheet,
            self.right_sheet,
            on,
            joined.height()
        );
        Ok(Step::table(Table::from_dataframe(joined)))
    }

    fn description(&self) -> String {
        format!(
            "{} join {} with {} on {}",
            self.join_type.as_str(),
            self.left_sheet,
            self.right_sheet,
            self.on_column
        )
    }
}

/// Give both key columns one type so equal values match
///
/// Numbers meet as `Int64` when both sides are integers, otherwise as
/// `Float64`. A key column holding only nulls takes the other side's type.
/// Any other combination of kinds cannot match and is a `Type` error.
fn align_keys(left: &mut DataFrame, right: &mut DataFrame, on: &str) -> Result<()> {
    let (left_key, right_key) = (left.column(on)?, right.column(on)?);
    let (left_type, right_type) = (left_key.dtype().clone(), right_key.dtype().clone());
    if left_type == right_type {
        return Ok(());
    }

    let target = match (CellKind::of_column(left_key), CellKind::of_column(right_key)) {
        (CellKind::Null, _) => right_type,
        (_, CellKind::Null) => left_type,
        (CellKind::Number, CellKind::Number) if left_type.is_integer() && right_type.is_integer() => {
            DataType::Int64
        }
        (CellKind::Number, CellKind::Number) => DataType::Float64,
        (CellKind::Date, CellKind::Date) => DataType::Datetime(TimeUnit::Microseconds, None),
        (l, r) => {
            return Err(Error::type_mismatch(format!(
                "cannot join {} keys with {} keys on '{on}'",
                l.as_str(),
                r.as_str()
            )))
        }
    };

    for df in [left, right] {
        let key = df.column(on)?.cast(&target)?;
        df.with_column(key)?;
    }
    Ok(())
}
