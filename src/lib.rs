//! sheetq: natural language questions over spreadsheet data
//!
//! A language model turns a question into a JSON operation plan; this crate
//! executes the plan against the sheets of a workbook. The engine lives in
//! `sheetq-core` and is re-exported here; the model client and the `sheetq`
//! binary are separate workspace members.
//!
//! ```rust,ignore
//! use sheetq::{execute_plan, LoadOptions, Plan, TabularStore};
//!
//! let store = TabularStore::load("workbook/", &LoadOptions::default())?;
//! let plan = sheetq::parse_plan_text(r#"{"target_sheet": "Sales", "operations": []}"#)?;
//! println!("{}", execute_plan(&plan, &store)?.to_json());
//! ```

pub use sheetq_core::*;
pub use sheetq_shared::date;
