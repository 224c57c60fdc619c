//! sheetq-core: Plan execution engine for sheetq
//!
//! This crate turns a declarative operation plan into results over
//! spreadsheet tables. A plan names a target sheet and an ordered list of
//! operations (filter, aggregate, derive, date extraction, pivot, join and
//! free-text analysis); the executor threads a working copy of the sheet
//! through them and returns either the final table or a scalar map.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sheetq_core::{execute_plan, LoadOptions, Plan, TabularStore};
//! use serde_json::json;
//!
//! let store = TabularStore::load("workbook/", &LoadOptions::default())?;
//! let plan = Plan::from_json(&json!({
//!     "target_sheet": "Employees",
//!     "operations": [
//!         {"type": "FILTER", "conditions": [
//!             {"column": "Department", "operator": "==", "value": "IT"}
//!         ]},
//!         {"type": "AGGREGATE", "aggregations": [
//!             {"column": "Salary", "function": "average"}
//!         ]}
//!     ]
//! }))?;
//!
//! let output = execute_plan(&plan, &store)?;
//! println!("{}", output.to_json());
//! # Ok::<(), sheetq_core::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`plan`] - The plan model and its validation from loosely typed JSON
//! - [`ops`] - One handler per operation kind
//! - [`executor`] - Runs plans, collects warnings, stops at terminal steps
//! - [`store`] - Loads workbooks (CSV, JSON, Parquet) into named tables
//! - [`schema`] - Sheet and column discovery for prompt building
//! - [`prompt`] - The plan-generation prompt
//! - [`services`] - Injected text completion and plan generation capabilities
//! - [`error`] - Error handling and result types
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result`]. [`Error::status_code`] maps
//! each error to the HTTP-style status a request handler should report:
//!
//! ```rust,ignore
//! match execute_plan(&plan, &store) {
//!     Ok(output) => println!("{}", output.to_json()),
//!     Err(e @ Error::ColumnNotFound { .. }) => eprintln!("{} ({})", e, e.status_code()),
//!     Err(e) => eprintln!("Other error: {e}"),
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::cast_precision_loss
)]

pub use sheetq_shared::{constants, Table, TableError, Value, VERSION};

/// Error types and handling
pub mod error;

pub mod executor;
pub mod ops;
pub mod plan;
pub mod prompt;
pub mod schema;
pub mod services;
pub mod store;

pub use crate::error::{Error, Result};
pub use executor::{
    execute_plan, Execution, ExecutionOutput, ExecutorOptions, NumericPrecision, PlanExecutor,
    PlanWarning,
};
pub use plan::{Operation, Plan};
pub use prompt::build_analysis_prompt;
pub use schema::{extract_schema, Schema};
pub use services::{parse_plan_text, PlanGenerator, TextCompleter, UnavailableCompleter};
pub use store::{LoadOptions, TabularStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::executor::{execute_plan, ExecutionOutput, ExecutorOptions, PlanExecutor};
    pub use crate::plan::{Operation, Plan};
    pub use crate::services::{PlanGenerator, TextCompleter};
    pub use crate::store::{LoadOptions, TabularStore};
    pub use crate::{Error, Result, Table, Value};
}
