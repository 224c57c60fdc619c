//! Derived columns
//!
//! `new_column = col1 <op> operand` as a single polars expression. The
//! operand is a column when the expression value is a string naming an
//! existing column, otherwise it is the literal itself. Operand types are
//! checked up front so a mismatch is a `Type` error for the whole step.

use log::warn;
use polars::prelude::*;
use sheetq_shared::{Table, Value};

use super::{literal, require_column, CellKind, HandlerContext, OperationHandler, Step};
use crate::error::{Error, Result};
use crate::plan::{ArithOp, MathOp};

/// Integer results at or beyond this magnitude switch the column to floats
const INT_RESULT_LIMIT: f64 = 9.2e18;

/// Right-hand side of the expression
struct Operand {
    expr: Expr,
    kind: CellKind,
    integral: bool,
}

impl Operand {
    fn column(column: &Column) -> Self {
        Self {
            expr: col(column.name().as_str()),
            kind: CellKind::of_column(column),
            integral: column.dtype().is_integer(),
        }
    }

    fn literal(value: &Value) -> Self {
        Self {
            expr: literal(value),
            kind: CellKind::of_value(value),
            integral: matches!(value, Value::Int(_)),
        }
    }
}

impl OperationHandler for MathOp {
    fn apply(&self, input: Table, _ctx: &HandlerContext<'_>) -> Result<Step> {
        let expr = &self.expression;
        let lhs = Operand::column(require_column(&input, &expr.col1, "Math")?);
        let rhs = match &expr.value {
            Value::String(name) if input.has_column(name) => {
                Operand::column(require_column(&input, name, "Math")?)
            }
            value => Operand::literal(value),
        };

        let mut df = input.into_dataframe();
        let mut divided_by_zero = 0;
        let result = match (lhs.kind, rhs.kind) {
            (CellKind::Null, _) | (_, CellKind::Null) => lit(NULL),
            (CellKind::Number, CellKind::Number) if expr.operator == ArithOp::Div => {
                divided_by_zero = count_zero_divisors(&df, &lhs.expr, &rhs.expr)?;
                let quotient = float_op(lhs.expr.clone(), ArithOp::Div, rhs.expr.clone());
                when(rhs.expr.eq(lit(0))).then(lit(NULL)).otherwise(quotient)
            }
            (CellKind::Number, CellKind::Number) if lhs.integral && rhs.integral => {
                integer_or_float(&df, lhs.expr, expr.operator, rhs.expr)?
            }
            (CellKind::Number, CellKind::Number) => float_op(lhs.expr, expr.operator, rhs.expr),
            (CellKind::Text, CellKind::Text) if expr.operator == ArithOp::Add => lhs.expr + rhs.expr,
            (left, right) => {
                return Err(Error::type_mismatch(format!(
                    "cannot apply '{}' to {} and {}",
                    expr.operator.as_str(),
                    left.as_str(),
                    right.as_str()
                )))
            }
        };

        df = df
            .lazy()
            .with_column(result.alias(self.new_column.as_str()))
            .collect()?;

        let mut step = Step::table(Table::from_dataframe(df));
        if divided_by_zero > 0 {
            let message = format!(
                "division by zero in {divided_by_zero} row(s) while deriving '{}'; cells set to null",
                self.new_column
            );
            warn!("{message}");
            step = step.with_warning(message);
        }
        Ok(step)
    }

    fn description(&self) -> String {
        format!(
            "derive {} = {} {} {}",
            self.new_column,
            self.expression.col1,
            self.expression.operator.as_str(),
            self.expression.value
        )
    }
}

fn apply_op(lhs: Expr, op: ArithOp, rhs: Expr) -> Expr {
    match op {
        ArithOp::Add => lhs + rhs,
        ArithOp::Sub => lhs - rhs,
        ArithOp::Mul => lhs * rhs,
        ArithOp::Div => lhs / rhs,
    }
}

fn float_op(lhs: Expr, op: ArithOp, rhs: Expr) -> Expr {
    apply_op(lhs.cast(DataType::Float64), op, rhs.cast(DataType::Float64))
}

/// Integer arithmetic, or float arithmetic for the whole column if any row
/// would leave the `i64` range
fn integer_or_float(df: &DataFrame, lhs: Expr, op: ArithOp, rhs: Expr) -> Result<Expr> {
    let floats = float_op(lhs.clone(), op, rhs.clone());
    let peak = df
        .clone()
        .lazy()
        .select([floats.clone().abs().max().alias("peak")])
        .collect()?;
    let peak = Value::from_any_value(peak.column("peak")?.get(0)?);
    if peak.as_f64().is_some_and(|p| p >= INT_RESULT_LIMIT) {
        return Ok(floats);
    }
    Ok(apply_op(
        lhs.cast(DataType::Int64),
        op,
        rhs.cast(DataType::Int64),
    ))
}

/// Rows with a present dividend and a zero divisor
fn count_zero_divisors(df: &DataFrame, lhs: &Expr, rhs: &Expr) -> Result<usize> {
    let zeros = df
        .clone()
        .lazy()
        .select([lhs
            .clone()
            .is_not_null()
            .and(rhs.clone().eq(lit(0)))
            .cast(DataType::Int64)
            .sum()
            .alias("zeros")])
        .collect()?;
    let zeros = Value::from_any_value(zeros.column("zeros")?.get(0)?);
    Ok(match zeros {
        Value::Int(n) => usize::try_from(n).unwrap_or_default(),
        _ => 0,
    })
}
