//! Operation plans
//!
//! A plan names a target sheet and lists the operations to run against it,
//! in order. Plans come from a language model as loosely typed JSON, so
//! [`Plan::from_json`] is the single place where that JSON is checked and
//! turned into the strict [`Operation`] sum type. Nothing downstream ever
//! sees raw plan JSON.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use sheetq_shared::Value;

use crate::error::{Error, Result};

/// A validated operation plan
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Sheet the working table is copied from
    pub target_sheet: String,
    /// Operations, executed strictly in order
    pub operations: Vec<Operation>,
}

impl Plan {
    /// Create a plan from already-typed operations
    pub fn new(target_sheet: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            target_sheet: target_sheet.into(),
            operations,
        }
    }

    /// Validate a JSON plan into the strict plan model
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use serde_json::json;
    /// use sheetq_core::plan::Plan;
    ///
    /// let plan = Plan::from_json(&json!({
    ///     "target_sheet": "Employees",
    ///     "operations": [{"type": "FILTER", "conditions": [
    ///         {"column": "Department", "operator": "==", "value": "IT"}
    ///     ]}]
    /// }))?;
    /// assert_eq!(plan.operations.len(), 1);
    /// ```
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| Error::invalid_plan("plan must be a JSON object"))?;

        let target_sheet = obj
            .get("target_sheet")
            .and_then(JsonValue::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::invalid_plan("missing or empty 'target_sheet'"))?;

        let operations = obj
            .get("operations")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| Error::invalid_plan("missing 'operations' array"))?
            .iter()
            .enumerate()
            .map(|(index, op)| {
                Operation::from_json(op)
                    .map_err(|reason| Error::invalid_plan(format!("operation {index}: {reason}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(target_sheet, operations))
    }
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Narrow rows by conditions
    Filter(FilterOp),
    /// Reduce columns to scalars; ends the plan
    Aggregate(AggregateOp),
    /// Derive a column with arithmetic
    Math(MathOp),
    /// Extract a date component into a column
    DateExtract(DateExtractOp),
    /// Cross-tabulate two columns with an aggregated measure
    Pivot(PivotOp),
    /// Merge two sheets from the store
    Join(JoinOp),
    /// Classify or summarize free text row by row
    TextAnalysis(TextAnalysisOp),
    /// An operation kind this executor does not know; skipped with a warning
    Unknown {
        /// The unrecognized `type` tag
        kind: String,
    },
}

impl Operation {
    /// Parse one operation object
    ///
    /// Tags are matched case-insensitively. Unknown tags are not an error:
    /// they parse into [`Operation::Unknown`].
    fn from_json(json: &JsonValue) -> std::result::Result<Self, String> {
        if !json.is_object() {
            return Err("operation must be a JSON object".to_string());
        }
        let kind = json
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| "missing string field 'type'".to_string())?;

        let op = match kind.trim().to_ascii_uppercase().as_str() {
            "FILTER" => Operation::Filter(params(json)?),
            "AGGREGATE" => Operation::Aggregate(params(json)?),
            "MATH" | "DERIVE" => Operation::Math(params(json)?),
            "DATE_OP" | "DATE_EXTRACT" => Operation::DateExtract(params(json)?),
            "PIVOT" => Operation::Pivot(params(json)?),
            "JOIN" => Operation::Join(params(json)?),
            "UNSTRUCTURED_OP" | "TEXT_ANALYSIS" => Operation::TextAnalysis(params(json)?),
            _ => Operation::Unknown {
                kind: kind.to_string(),
            },
        };
        Ok(op)
    }

    /// Short name of the operation kind
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Operation::Filter(_) => "FILTER",
            Operation::Aggregate(_) => "AGGREGATE",
            Operation::Math(_) => "MATH",
            Operation::DateExtract(_) => "DATE_OP",
            Operation::Pivot(_) => "PIVOT",
            Operation::Join(_) => "JOIN",
            Operation::TextAnalysis(_) => "UNSTRUCTURED_OP",
            Operation::Unknown { kind } => kind,
        }
    }
}

fn params<T: DeserializeOwned>(json: &JsonValue) -> std::result::Result<T, String> {
    T::deserialize(json).map_err(|e| e.to_string())
}

fn cell_value<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Value, D::Error> {
    let json = JsonValue::deserialize(deserializer)?;
    Ok(Value::from_json(&json))
}

/// Parameters of a filter step
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterOp {
    /// Conditions, combined with AND
    pub conditions: Vec<Condition>,
}

/// A single `column operator value` test
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    /// Column to test
    pub column: String,
    /// Comparison operator
    pub operator: CompareOp,
    /// Literal to compare against
    #[serde(deserialize_with = "cell_value")]
    pub value: Value,
}

/// Comparison operators allowed in filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CompareOp {
    /// Strict equality
    #[serde(rename = "==")]
    Eq,
    /// Strict inequality
    #[serde(rename = "!=")]
    Ne,
    /// Greater than
    #[serde(rename = ">")]
    Gt,
    /// Less than
    #[serde(rename = "<")]
    Lt,
    /// Greater than or equal
    #[serde(rename = ">=")]
    Ge,
    /// Less than or equal
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    /// Operator symbol
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

/// Parameters of an aggregate step
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregateOp {
    /// Aggregations to compute, merged into one result map
    pub aggregations: Vec<Aggregation>,
}

/// One `function(column)` request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Aggregation {
    /// Column to reduce
    pub column: String,
    /// Reduction to apply
    pub function: AggFunc,
}

/// Aggregation functions shared by aggregate and pivot steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    /// Arithmetic mean
    #[serde(alias = "mean", alias = "avg")]
    Average,
    /// Sum
    Sum,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Count of non-null cells
    Count,
}

impl AggFunc {
    /// Function name as written in plans and result keys
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Average => "average",
            AggFunc::Sum => "sum",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a derive-column step
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MathOp {
    /// Column written with the result; replaced if it exists
    pub new_column: String,
    /// Arithmetic to perform
    pub expression: MathExpression,
}

/// `col1 operator value`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MathExpression {
    /// Left operand column
    pub col1: String,
    /// Arithmetic operator
    pub operator: ArithOp,
    /// Right operand: a column name if one matches, otherwise a literal
    #[serde(deserialize_with = "cell_value")]
    pub value: Value,
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ArithOp {
    /// Addition
    #[serde(rename = "+")]
    Add,
    /// Subtraction
    #[serde(rename = "-")]
    Sub,
    /// Multiplication
    #[serde(rename = "*")]
    Mul,
    /// Division
    #[serde(rename = "/")]
    Div,
}

impl ArithOp {
    /// Operator symbol
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Parameters of a date extraction step
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateExtractOp {
    /// Column written with the extracted component
    pub new_column: String,
    /// Column parsed as dates
    pub source_column: String,
    /// Component to extract
    pub operation: DatePart,
}

/// Date components that can be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DatePart {
    /// Month number, 1-12
    #[serde(rename = "extract_month")]
    Month,
    /// Calendar year
    #[serde(rename = "extract_year")]
    Year,
    /// Day of month, 1-31
    #[serde(rename = "extract_day")]
    Day,
}

/// Parameters of a pivot step
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PivotOp {
    /// Column whose values become rows
    pub index: String,
    /// Column whose values become output columns
    pub columns: String,
    /// Column aggregated into each cell
    pub values: String,
    /// Aggregation applied per cell
    pub agg_func: AggFunc,
}

/// Parameters of a join step
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinOp {
    /// Left sheet name
    pub left_sheet: String,
    /// Right sheet name
    pub right_sheet: String,
    /// Kind of join
    pub join_type: JoinKind,
    /// Key column present in both sheets
    pub on_column: String,
}

/// Join kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Matching keys only
    Inner,
    /// All left rows
    Left,
    /// All right rows
    Right,
    /// All rows from both sides
    #[serde(alias = "full")]
    Outer,
}

impl JoinKind {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Outer => "outer",
        }
    }
}

/// Parameters of a text analysis step
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextAnalysisOp {
    /// Analysis to run on each row
    pub operation: TextTask,
    /// Column holding the text
    pub source_column: String,
    /// Column written with the label or summary
    pub new_column: String,
}

/// Text analysis tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTask {
    /// Positive / Negative / Neutral label
    SentimentAnalysis,
    /// One-sentence summary
    TextSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_full_plan() {
        let plan = Plan::from_json(&json!({
            "target_sheet": "Structured_Data",
            "operations": [
                {"type": "FILTER", "conditions": [
                    {"column": "Department", "operator": "==", "value": "IT"},
                    {"column": "Salary", "operator": ">", "value": 50000}
                ]},
                {"type": "AGGREGATE", "aggregations": [
                    {"column": "Salary", "function": "average"}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(plan.target_sheet, "Structured_Data");
        assert_eq!(
            plan.operations[0],
            Operation::Filter(FilterOp {
                conditions: vec![
                    Condition {
                        column: "Department".to_string(),
                        operator: CompareOp::Eq,
                        value: Value::string("IT"),
                    },
                    Condition {
                        column: "Salary".to_string(),
                        operator: CompareOp::Gt,
                        value: Value::Int(50000),
                    },
                ]
            })
        );
        assert_eq!(plan.operations[1].kind(), "AGGREGATE");
    }

    #[test]
    fn test_parse_every_kind() {
        let plan = Plan::from_json(&json!({
            "target_sheet": "S",
            "operations": [
                {"type": "MATH", "new_column": "Bonus",
                 "expression": {"col1": "Salary", "operator": "*", "value": 0.1}},
                {"type": "DATE_OP", "new_column": "Y", "source_column": "D",
                 "operation": "extract_year"},
                {"type": "PIVOT", "index": "Dept", "columns": "Loc", "values": "Salary",
                 "agg_func": "average"},
                {"type": "JOIN", "left_sheet": "A", "right_sheet": "B",
                 "join_type": "left", "on_column": "Id"},
                {"type": "UNSTRUCTURED_OP", "operation": "sentiment_analysis",
                 "source_column": "Feedback", "new_column": "Sentiment"}
            ]
        }))
        .unwrap();

        let kinds: Vec<&str> = plan.operations.iter().map(Operation::kind).collect();
        assert_eq!(kinds, vec!["MATH", "DATE_OP", "PIVOT", "JOIN", "UNSTRUCTURED_OP"]);
        assert!(matches!(
            &plan.operations[3],
            Operation::Join(JoinOp { join_type: JoinKind::Left, .. })
        ));
    }

    #[test]
    fn test_tags_are_case_insensitive_with_aliases() {
        let plan = Plan::from_json(&json!({
            "target_sheet": "S",
            "operations": [
                {"type": "filter", "conditions": []},
                {"type": "Date_Extract", "new_column": "M", "source_column": "D",
                 "operation": "extract_month"},
                {"type": "text_analysis", "operation": "text_summary",
                 "source_column": "R", "new_column": "S"}
            ]
        }))
        .unwrap();
        assert!(matches!(plan.operations[0], Operation::Filter(_)));
        assert!(matches!(plan.operations[1], Operation::DateExtract(_)));
        assert!(matches!(plan.operations[2], Operation::TextAnalysis(_)));
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let plan = Plan::from_json(&json!({
            "target_sheet": "S",
            "operations": [{"type": "SORT", "by": "Age"}]
        }))
        .unwrap();
        assert_eq!(
            plan.operations,
            vec![Operation::Unknown {
                kind: "SORT".to_string()
            }]
        );
    }

    #[test]
    fn test_shape_errors_are_invalid_plan() {
        let cases = vec![
            json!([]),
            json!({"operations": []}),
            json!({"target_sheet": "", "operations": []}),
            json!({"target_sheet": "S"}),
            json!({"target_sheet": "S", "operations": [42]}),
            json!({"target_sheet": "S", "operations": [{"conditions": []}]}),
            json!({"target_sheet": "S", "operations": [{"type": "FILTER"}]}),
            json!({"target_sheet": "S", "operations": [{"type": "FILTER", "conditions": [
                {"column": "A", "operator": "~=", "value": 1}
            ]}]}),
            json!({"target_sheet": "S", "operations": [{"type": "AGGREGATE", "aggregations": [
                {"column": "A", "function": "median"}
            ]}]}),
        ];

        for case in cases {
            let err = Plan::from_json(&case).unwrap_err();
            assert!(matches!(err, Error::InvalidPlan(_)), "{case} gave {err:?}");
        }
    }

    #[test]
    fn test_target_sheet_is_taken_verbatim() {
        let plan = Plan::from_json(&json!({"target_sheet": " Sales ", "operations": []})).unwrap();
        assert_eq!(plan.target_sheet, " Sales ");
    }

    #[test]
    fn test_error_names_operation_index() {
        let err = Plan::from_json(&json!({
            "target_sheet": "S",
            "operations": [
                {"type": "FILTER", "conditions": []},
                {"type": "JOIN", "left_sheet": "A"}
            ]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("operation 1"));
    }

    #[test]
    fn test_aggregate_function_aliases() {
        let op: AggregateOp = serde_json::from_value(json!({"aggregations": [
            {"column": "A", "function": "mean"},
            {"column": "A", "function": "avg"}
        ]}))
        .unwrap();
        assert!(op.aggregations.iter().all(|a| a.function == AggFunc::Average));
    }
}
