//! Date component extraction

use log::debug;
use polars::prelude::*;
use sheetq_shared::date::parse_datetime;
use sheetq_shared::{Table, Value};

use super::{require_column, CellKind, HandlerContext, OperationHandler, Step};
use crate::error::{Error, Result};
use crate::plan::{DateExtractOp, DatePart};

impl OperationHandler for DateExtractOp {
    fn apply(&self, input: Table, _ctx: &HandlerContext<'_>) -> Result<Step> {
        let source = require_column(&input, &self.source_column, "DateExtract")?;
        let parsed = self.parse_column(source)?;

        let mut df = input.into_dataframe();
        // The parsed dates replace the source so later steps see real dates
        if let Some(dates) = parsed {
            df.with_column(dates)?;
        }
        let component = self
            .operation
            .expr(col(self.source_column.as_str()))
            .alias(self.new_column.as_str());
        let df = df.lazy().with_column(component).collect()?;
        debug!("Extracted {:?} from '{}'", self.operation, self.source_column);

        Ok(Step::table(Table::from_dataframe(df)))
    }

    fn description(&self) -> String {
        format!(
            "extract {} of {} into {}",
            self.operation.as_str(),
            self.source_column,
            self.new_column
        )
    }
}

impl DateExtractOp {
    /// Date-typed replacement for the source column, `None` if it already
    /// holds dates
    fn parse_column(&self, column: &Column) -> Result<Option<Series>> {
        let name = column.name().clone();
        let unit = TimeUnit::Microseconds;
        match CellKind::of_column(column) {
            CellKind::Date => Ok(None),
            CellKind::Null => Ok(Some(Series::full_null(
                name,
                column.len(),
                &DataType::Datetime(unit, None),
            ))),
            CellKind::Text => {
                let parsed = column
                    .str()?
                    .into_iter()
                    .map(|cell| match cell {
                        None => Ok(None),
                        Some(text) => parse_datetime(text)
                            .map(Some)
                            .ok_or_else(|| self.invalid(text.to_string())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(
                    DatetimeChunked::from_naive_datetime_options(name, parsed, unit).into_series(),
                ))
            }
            _ => {
                let first = column.drop_nulls().get(0)?.into_static();
                Err(self.invalid(Value::from_any_value(first).to_string()))
            }
        }
    }

    fn invalid(&self, value: String) -> Error {
        Error::InvalidDate {
            column: self.source_column.clone(),
            value,
        }
    }
}

impl DatePart {
    /// Name as used in plans
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Month => "month",
            DatePart::Year => "year",
            DatePart::Day => "day",
        }
    }

    /// Extract the component from a date or date-time expression
    #[must_use]
    pub fn expr(&self, dates: Expr) -> Expr {
        let component = match self {
            DatePart::Month => dates.dt().month(),
            DatePart::Year => dates.dt().year(),
            DatePart::Day => dates.dt().day(),
        };
        component.cast(DataType::Int64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::test_support::{ctx, into_table};
    use crate::store::TabularStore;
    use pretty_assertions::assert_eq;

    fn joined() -> Table {
        Table::from_columns(vec![
            ("Name", vec!["Ann".into(), "Ben".into(), "Cat".into()]),
            (
                "JoiningDate",
                vec!["2020-01-01".into(), "03/15/2021".into(), Value::Null],
            ),
        ])
        .unwrap()
    }

    fn extract(part: DatePart, new_column: &str) -> DateExtractOp {
        DateExtractOp {
            new_column: new_column.to_string(),
            source_column: "JoiningDate".to_string(),
            operation: part,
        }
    }

    #[test]
    fn test_extract_components() {
        let store = TabularStore::new();
        let cases = [
            (DatePart::Year, vec![Value::Int(2020), Value::Int(2021), Value::Null]),
            (DatePart::Month, vec![Value::Int(1), Value::Int(3), Value::Null]),
            (DatePart::Day, vec![Value::Int(1), Value::Int(15), Value::Null]),
        ];
        for (part, expected) in cases {
            let output = into_table(extract(part, "Part").apply(joined(), &ctx(&store)).unwrap());
            assert_eq!(output.column_values("Part").unwrap(), expected);
        }
    }

    #[test]
    fn test_source_column_becomes_dates() {
        let store = TabularStore::new();
        let output = into_table(
            extract(DatePart::Year, "Year")
                .apply(joined(), &ctx(&store))
                .unwrap(),
        );
        assert!(matches!(output.cell("JoiningDate", 0), Some(Value::Date(_))));
        assert_eq!(output.cell("JoiningDate", 2), Some(Value::Null));
        assert_eq!(
            output.column_names().collect::<Vec<_>>(),
            vec!["Name", "JoiningDate", "Year"]
        );

        // Already-parsed dates pass straight through
        let again = into_table(
            extract(DatePart::Month, "Month")
                .apply(output, &ctx(&store))
                .unwrap(),
        );
        assert_eq!(again.cell("Month", 1), Some(Value::Int(3)));
    }

    #[test]
    fn test_non_text_cells_are_invalid_dates() {
        let store = TabularStore::new();
        let table = Table::from_columns(vec![(
            "JoiningDate",
            vec![Value::Null, Value::Int(20_200_101)],
        )])
        .unwrap();
        let err = extract(DatePart::Year, "Year")
            .apply(table, &ctx(&store))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid date in column 'JoiningDate': '20200101'"
        );
    }

    #[test]
    fn test_all_null_source_extracts_nulls() {
        let store = TabularStore::new();
        let table =
            Table::from_columns(vec![("JoiningDate", vec![Value::Null, Value::Null])]).unwrap();
        let output = into_table(
            extract(DatePart::Day, "Day")
                .apply(table, &ctx(&store))
                .unwrap(),
        );
        assert_eq!(output.column_values("Day").unwrap(), vec![Value::Null, Value::Null]);
        assert_eq!(
            output.dtype("JoiningDate"),
            Some(&DataType::Datetime(TimeUnit::Microseconds, None))
        );
    }

    #[test]
    fn test_unparseable_cell_is_invalid_date() {
        let store = TabularStore::new();
        let table = Table::from_columns(vec![(
            "JoiningDate",
            vec!["2020-01-01".into(), "someday".into()],
        )])
        .unwrap();
        let err = extract(DatePart::Day, "Day")
            .apply(table, &ctx(&store))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid date in column 'JoiningDate': 'someday'"
        );
    }

    #[test]
    fn test_missing_source_column() {
        let store = TabularStore::new();
        let op = DateExtractOp {
            new_column: "Year".to_string(),
            source_column: "Hired".to_string(),
            operation: DatePart::Year,
        };
        let err = op.apply(joined(), &ctx(&store)).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));
    }
}
