//! sheetq-shared: Shared cell and table types for sheetq crates
//!
//! This crate contains the value model every sheetq crate agrees on: the
//! `Value` cell enum, the polars-backed `Table`, and the date helpers used
//! when spreadsheet text has to become a date.
//!
//! # Features
//!
//! - **Cell Values**: Null, boolean, integer, float, string and date cells
//! - **Tables**: Polars frames with ordered, uniquely named columns and
//!   row-object serialization
//! - **Dates**: Lenient parsing of the date layouts spreadsheets export

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_precision_loss
)]

/// Date parsing and formatting
pub mod date;

/// In-memory tables
pub mod table;

/// Cell values
pub mod value;

pub use table::{Table, TableError};
pub use value::Value;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common constants
pub mod constants {
    /// Cell text written for a row whose text analysis call failed
    pub const TEXT_ANALYSIS_ERROR: &str = "ERROR";

    /// Default number of rows sampled when inferring column types on load
    pub const DEFAULT_SCHEMA_INFERENCE_LENGTH: usize = 1000;

    /// Default timeout for external model calls, in seconds
    pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
}
