//! Column aggregation
//!
//! The aggregate step is terminal: it reduces columns of the current working
//! table to a flat `{function}_of_{column}` map and ends the plan. All
//! reductions run as one polars `select`. [`aggregate_expr`] is shared with
//! the pivot handler.

use indexmap::IndexMap;
use log::debug;
use polars::prelude::*;
use sheetq_shared::{Table, Value};

use super::{require_column, CellKind, HandlerContext, OperationHandler, Step};
use crate::error::{Error, Result};
use crate::executor::NumericPrecision;
use crate::plan::{AggFunc, AggregateOp};

/// Integer sums at or beyond this magnitude are reported as floats
const INT_SUM_LIMIT: f64 = 9.2e18;

impl OperationHandler for AggregateOp {
    fn apply(&self, input: Table, ctx: &HandlerContext<'_>) -> Result<Step> {
        let mut exprs = Vec::new();
        let mut reductions = Vec::with_capacity(self.aggregations.len());
        for (i, aggregation) in self.aggregations.iter().enumerate() {
            let column = require_column(&input, &aggregation.column, "Aggregate")?;
            let reduction = Reduction::plan(i, aggregation.function, column, &aggregation.column)?;
            if let Reduction::Computed { alias, integral } = &reduction {
                let source = col(aggregation.column.as_str());
                exprs.push(aggregate_expr(aggregation.function, source.clone()).alias(alias.as_str()));
                if *integral && aggregation.function == AggFunc::Sum {
                    exprs.push(
                        source
                            .cast(DataType::Float64)
                            .sum()
                            .alias(format!("{alias}_float")),
                    );
                }
            }
            reductions.push(reduction);
        }

        let reduced = if exprs.is_empty() {
            DataFrame::empty()
        } else {
            input.into_dataframe().lazy().select(exprs).collect()?
        };

        let mut result = IndexMap::with_capacity(self.aggregations.len());
        for (aggregation, reduction) in self.aggregations.iter().zip(reductions) {
            let value = reduction.finish(
                &reduced,
                aggregation.function,
                ctx.options.numeric_precision,
            )?;
            let key = format!("{}_of_{}", aggregation.function, aggregation.column);
            debug!("Aggregate {key} = {value}");
            // Repeated keys: last one wins, position of the first is kept
            result.insert(key, value);
        }
        Ok(Step::terminal(result))
    }

    fn description(&self) -> String {
        let parts: Vec<String> = self
            .aggregations
            .iter()
            .map(|a| format!("{}({})", a.function, a.column))
            .collect();
        format!("aggregate {}", parts.join(", "))
    }
}

/// Polars reduction for an aggregation function
///
/// Nulls are skipped. `count` is always an `Int64` and `average` always a
/// float; the others keep the input type.
pub(crate) fn aggregate_expr(function: AggFunc, input: Expr) -> Expr {
    match function {
        AggFunc::Count => input.count().cast(DataType::Int64),
        AggFunc::Sum => input.sum(),
        AggFunc::Average => input.cast(DataType::Float64).mean(),
        AggFunc::Min => input.min(),
        AggFunc::Max => input.max(),
    }
}

/// Check that `function` can reduce a column of the given kind
pub(crate) fn check_reducible(function: AggFunc, kind: CellKind, column: &str) -> Result<()> {
    match (function, kind) {
        (AggFunc::Count, _) | (_, CellKind::Null | CellKind::Number) => Ok(()),
        _ => Err(Error::type_mismatch(format!(
            "cannot compute {function} of {} column '{column}'",
            kind.as_str()
        ))),
    }
}

/// How one aggregation turns into a value
enum Reduction {
    /// Known without touching the data
    Constant(Value),
    /// Read from the reduced frame
    Computed { alias: String, integral: bool },
}

impl Reduction {
    fn plan(index: usize, function: AggFunc, column: &Column, name: &str) -> Result<Self> {
        let kind = CellKind::of_column(column);
        check_reducible(function, kind, name)?;
        if function != AggFunc::Count && kind == CellKind::Null {
            return Ok(Reduction::Constant(match function {
                AggFunc::Sum => Value::Int(0),
                _ => Value::Null,
            }));
        }
        Ok(Reduction::Computed {
            alias: format!("__agg_{index}"),
            integral: column.dtype().is_integer(),
        })
    }

    fn finish(
        self,
        reduced: &DataFrame,
        function: AggFunc,
        precision: NumericPrecision,
    ) -> Result<Value> {
        let (alias, integral) = match self {
            Reduction::Constant(value) => return Ok(value),
            Reduction::Computed { alias, integral } => (alias, integral),
        };
        let value = first_value(reduced, &alias)?;

        let value = match (function, value) {
            (AggFunc::Sum, Value::Int(_)) if integral => {
                match first_value(reduced, &format!("{alias}_float"))? {
                    Value::Float(total) if total.abs() >= INT_SUM_LIMIT => Value::Float(total),
                    _ => first_value(reduced, &alias)?,
                }
            }
            (AggFunc::Sum | AggFunc::Min | AggFunc::Max, Value::Float(f)) => precision.apply(f),
            (_, value) => value,
        };
        Ok(value)
    }
}

fn first_value(reduced: &DataFrame, name: &str) -> Result<Value> {
    let cell = reduced.column(name)?.get(0)?;
    Ok(Value::from_any_value(cell))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorOptions;
    use crate::ops::test_support::{ctx, employees};
    use crate::ops::StepOutcome;
    use crate::plan::Aggregation;
    use crate::services::UnavailableCompleter;
    use crate::store::TabularStore;
    use pretty_assertions::assert_eq;

    fn agg(column: &str, function: AggFunc) -> Aggregation {
        Aggregation {
            column: column.to_string(),
            function,
        }
    }

    fn terminal(step: Step) -> IndexMap<String, Value> {
        match step.outcome {
            StepOutcome::Terminal(map) => map,
            StepOutcome::Table(_) => panic!("aggregate must be terminal"),
        }
    }

    /// Reduce a single column `x` holding `cells`
    fn reduce(cells: Vec<Value>, function: AggFunc, precision: NumericPrecision) -> Value {
        let table = Table::from_columns(vec![("x", cells)]).unwrap();
        let store = TabularStore::new();
        let options = ExecutorOptions {
            numeric_precision: precision,
            parallel_text_analysis: false,
        };
        let ctx = HandlerContext {
            store: &store,
            completer: &UnavailableCompleter,
            options: &options,
        };
        let op = AggregateOp {
            aggregations: vec![agg("x", function)],
        };
        let mut map = terminal(op.apply(table, &ctx).unwrap());
        map.swap_remove(&format!("{function}_of_x")).unwrap()
    }

    #[test]
    fn test_aggregate_is_terminal_map() {
        let store = TabularStore::new();
        let op = AggregateOp {
            aggregations: vec![
                agg("Salary", AggFunc::Average),
                agg("Salary", AggFunc::Count),
                agg("Age", AggFunc::Max),
                agg("Age", AggFunc::Sum),
            ],
        };
        let map = terminal(op.apply(employees(), &ctx(&store)).unwrap());
        let expected: IndexMap<String, Value> = [
            ("average_of_Salary", Value::Float(230_000.0 / 3.0)),
            ("count_of_Salary", Value::Int(3)),
            ("max_of_Age", Value::Int(40)),
            ("sum_of_Age", Value::Int(130)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        assert_eq!(map, expected);
    }

    #[test]
    fn test_repeated_keys_keep_first_position() {
        let store = TabularStore::new();
        let op = AggregateOp {
            aggregations: vec![
                agg("Age", AggFunc::Min),
                agg("Salary", AggFunc::Count),
                agg("Age", AggFunc::Min),
            ],
        };
        let map = terminal(op.apply(employees(), &ctx(&store)).unwrap());
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["min_of_Age", "count_of_Salary"]);
    }

    #[test]
    fn test_empty_inputs() {
        let p = NumericPrecision::Truncate;
        let nulls = || vec![Value::Null, Value::Null];
        assert_eq!(reduce(nulls(), AggFunc::Average, p), Value::Null);
        assert_eq!(reduce(nulls(), AggFunc::Min, p), Value::Null);
        assert_eq!(reduce(nulls(), AggFunc::Sum, p), Value::Int(0));
        assert_eq!(reduce(nulls(), AggFunc::Count, p), Value::Int(0));
        assert_eq!(reduce(Vec::new(), AggFunc::Sum, p), Value::Int(0));
    }

    #[test]
    fn test_truncate_precision_casts_fractional_results() {
        let cells = || vec![Value::Float(1.75), Value::Float(2.5), Value::Int(1)];
        let p = NumericPrecision::Truncate;
        assert_eq!(reduce(cells(), AggFunc::Sum, p), Value::Int(5));
        assert_eq!(reduce(cells(), AggFunc::Max, p), Value::Int(2));
        assert_eq!(reduce(cells(), AggFunc::Min, p), Value::Int(1));
        assert!(matches!(
            reduce(cells(), AggFunc::Average, p),
            Value::Float(f) if (f - 1.75).abs() < 1e-12
        ));
    }

    #[test]
    fn test_preserve_precision_keeps_fractions() {
        let cells = || vec![Value::Float(1.75), Value::Float(2.5)];
        let p = NumericPrecision::Preserve;
        assert_eq!(reduce(cells(), AggFunc::Sum, p), Value::Float(4.25));
        assert_eq!(reduce(cells(), AggFunc::Max, p), Value::Float(2.5));
    }

    #[test]
    fn test_integer_sum_overflow_falls_back_to_float() {
        let cells = vec![Value::Int(i64::MAX), Value::Int(1)];
        let value = reduce(cells, AggFunc::Sum, NumericPrecision::Preserve);
        assert!(matches!(value, Value::Float(f) if f > 9.2e18));
    }

    #[test]
    fn test_non_numeric_cells_are_type_errors() {
        let store = TabularStore::new();
        let op = AggregateOp {
            aggregations: vec![agg("Department", AggFunc::Sum)],
        };
        let err = op.apply(employees(), &ctx(&store)).unwrap_err();
        assert!(matches!(err, Error::Type(_)));

        let op = AggregateOp {
            aggregations: vec![agg("Department", AggFunc::Count)],
        };
        let map = terminal(op.apply(employees(), &ctx(&store)).unwrap());
        assert_eq!(map["count_of_Department"], Value::Int(4));
    }

    #[test]
    fn test_missing_column() {
        let store = TabularStore::new();
        let op = AggregateOp {
            aggregations: vec![agg("Bonus", AggFunc::Sum)],
        };
        let err = op.apply(employees(), &ctx(&store)).unwrap_err();
        assert_eq!(err.to_string(), "Aggregate error: column 'Bonus' not found");
    }
}
