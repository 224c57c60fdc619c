//! Plan execution
//!
//! The executor copies the target sheet out of the store and threads it
//! through the plan's operations in order. An aggregate step ends the plan
//! early with a scalar map; unknown operation kinds are skipped and reported
//! as warnings instead of failing the plan.
//!
//! # Examples
//!
//! ```rust,ignore
//! use sheetq_core::{execute_plan, Plan, TabularStore};
//!
//! let store = TabularStore::load("workbook/", &Default::default())?;
//! let plan = Plan::from_json(&plan_json)?;
//! let output = execute_plan(&plan, &store)?;
//! println!("{}", serde_json::to_string_pretty(&output)?);
//! ```

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;
use sheetq_shared::{Table, Value};

use crate::error::{Error, Result};
use crate::ops::{HandlerContext, OperationHandler, StepOutcome};
use crate::plan::{Operation, Plan};
use crate::services::{TextCompleter, UnavailableCompleter};
use crate::store::TabularStore;

/// How `sum`, `min` and `max` treat fractional results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericPrecision {
    /// Cast fractional results to whole numbers (toward zero)
    #[default]
    Truncate,
    /// Keep fractional results as floats
    Preserve,
}

impl NumericPrecision {
    /// Shape a floating result of `sum`, `min` or `max`
    #[must_use]
    pub fn apply(self, value: f64) -> Value {
        match self {
            #[allow(clippy::cast_possible_truncation)]
            NumericPrecision::Truncate if value.is_finite() && value.abs() < 9.2e18 => {
                Value::Int(value.trunc() as i64)
            }
            _ => Value::Float(value),
        }
    }

    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NumericPrecision::Truncate => "truncate",
            NumericPrecision::Preserve => "preserve",
        }
    }
}

impl FromStr for NumericPrecision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" => Ok(NumericPrecision::Truncate),
            "preserve" => Ok(NumericPrecision::Preserve),
            other => Err(Error::config(format!(
                "unknown numeric precision '{other}'; expected 'truncate' or 'preserve'"
            ))),
        }
    }
}

impl fmt::Display for NumericPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executor tuning
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutorOptions {
    /// Treatment of fractional `sum`/`min`/`max` results
    pub numeric_precision: NumericPrecision,
    /// Fan text analysis rows out over the rayon pool
    pub parallel_text_analysis: bool,
}

/// A non-fatal problem found while executing a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanWarning {
    /// Position of the operation in the plan
    pub index: usize,
    /// What happened
    pub message: String,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation {}: {}", self.index, self.message)
    }
}

/// Final output of a plan
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutput {
    /// The working table after the last operation
    Table(Table),
    /// The result map of a terminal aggregate step
    Scalar(IndexMap<String, Value>),
}

impl ExecutionOutput {
    /// JSON form: an array of row objects, or the scalar map
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            ExecutionOutput::Table(table) => JsonValue::Array(
                table
                    .to_json_rows()
                    .into_iter()
                    .map(JsonValue::Object)
                    .collect(),
            ),
            ExecutionOutput::Scalar(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// The table, if the plan did not end in an aggregate
    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            ExecutionOutput::Table(table) => Some(table),
            ExecutionOutput::Scalar(_) => None,
        }
    }

    /// The scalar map, if the plan ended in an aggregate
    #[must_use]
    pub fn as_scalar(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            ExecutionOutput::Scalar(map) => Some(map),
            ExecutionOutput::Table(_) => None,
        }
    }
}

impl Serialize for ExecutionOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ExecutionOutput::Table(table) => table.serialize(serializer),
            ExecutionOutput::Scalar(map) => serializer.collect_map(map.iter()),
        }
    }
}

/// Report of one plan execution
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Table or scalar result
    pub output: ExecutionOutput,
    /// Non-fatal problems, in plan order
    pub warnings: Vec<PlanWarning>,
    /// Operations that actually ran; unknown kinds and anything after a
    /// terminal step are not counted
    pub operations_applied: usize,
}

static NO_COMPLETER: UnavailableCompleter = UnavailableCompleter;

/// Runs plans against one tabular store
pub struct PlanExecutor<'a> {
    store: &'a TabularStore,
    completer: &'a dyn TextCompleter,
    options: ExecutorOptions,
}

impl<'a> PlanExecutor<'a> {
    /// Create an executor with no text completion service
    #[must_use]
    pub fn new(store: &'a TabularStore) -> Self {
        Self {
            store,
            completer: &NO_COMPLETER,
            options: ExecutorOptions::default(),
        }
    }

    /// Use a text completion service for text analysis steps
    #[must_use]
    pub fn with_completer(mut self, completer: &'a dyn TextCompleter) -> Self {
        self.completer = completer;
        self
    }

    /// Set executor options
    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Execute a plan
    ///
    /// Fails with `InvalidPlan` when the target sheet is not in the store,
    /// and with the first handler error otherwise. Any error aborts the
    /// whole plan.
    pub fn execute(&self, plan: &Plan) -> Result<Execution> {
        let mut table = self
            .store
            .get(&plan.target_sheet)
            .cloned()
            .ok_or_else(|| {
                Error::invalid_plan(format!(
                    "target sheet '{}' not found; available sheets: {}",
                    plan.target_sheet,
                    self.store.sheet_names().collect::<Vec<_>>().join(", ")
                ))
            })?;

        info!(
            "Executing {} operation(s) on sheet '{}'",
            plan.operations.len(),
            plan.target_sheet
        );

        let ctx = HandlerContext {
            store: self.store,
            completer: self.completer,
            options: &self.options,
        };
        let mut warnings = Vec::new();
        let mut applied = 0;

        for (index, operation) in plan.operations.iter().enumerate() {
            let handler: &dyn OperationHandler = match operation {
                Operation::Filter(op) => op,
                Operation::Aggregate(op) => op,
                Operation::Math(op) => op,
                Operation::DateExtract(op) => op,
                Operation::Pivot(op) => op,
                Operation::Join(op) => op,
                Operation::TextAnalysis(op) => op,
                Operation::Unknown { kind } => {
                    warn!("Skipping unknown operation type '{kind}' at index {index}");
                    warnings.push(PlanWarning {
                        index,
                        message: format!("unknown operation type '{kind}' skipped"),
                    });
                    continue;
                }
            };

            debug!("Operation {index}: {}", handler.description());
            let step = handler.apply(table, &ctx)?;
            applied += 1;
            warnings.extend(
                step.warnings
                    .into_iter()
                    .map(|message| PlanWarning { index, message }),
            );

            match step.outcome {
                StepOutcome::Table(next) => table = next,
                StepOutcome::Terminal(result) => {
                    let skipped = plan.operations.len() - index - 1;
                    if skipped > 0 {
                        info!("Aggregate at index {index} ends the plan; {skipped} later operation(s) not run");
                    }
                    return Ok(Execution {
                        output: ExecutionOutput::Scalar(result),
                        warnings,
                        operations_applied: applied,
                    });
                }
            }
        }

        info!(
            "Plan finished with {} rows and {} columns",
            table.height(),
            table.width()
        );
        Ok(Execution {
            output: ExecutionOutput::Table(table),
            warnings,
            operations_applied: applied,
        })
    }
}

/// Execute a plan against a store with default options and no text service
pub fn execute_plan(plan: &Plan, store: &TabularStore) -> Result<ExecutionOutput> {
    PlanExecutor::new(store).execute(plan).map(|execution| execution.output)
}
