//! sheetq-cli library
//!
//! Configuration, argument parsing and the analysis request handler behind
//! the `sheetq` binary, exposed for programmatic use and tests.

pub mod cli;
pub mod config;
pub mod handler;
pub mod output;

pub use config::Config;
pub use handler::{analyse, AnalysisRequest, AnalysisResponse, Services};
