use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};

use sheetq_shared::TableError;

/// Result type alias for sheetq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sheetq operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The plan names a missing target sheet or has a malformed operation
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// The model output could not be parsed as a JSON plan
    #[error("Invalid plan JSON: {0}")]
    InvalidPlanJson(String),

    /// An operation referenced a column the working table does not have
    #[error("{context} error: column '{column}' not found")]
    ColumnNotFound {
        /// Missing column name
        column: String,
        /// Operation that looked the column up
        context: Cow<'static, str>,
    },

    /// A sheet name is absent from the tabular store
    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    /// A cell could not be parsed as a date
    #[error("Invalid date in column '{column}': '{value}'")]
    InvalidDate {
        /// Column being parsed
        column: String,
        /// Offending cell text
        value: String,
    },

    /// Plan generation or text completion failed
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Comparison or arithmetic between incompatible cell types
    #[error("Type error: {0}")]
    Type(String),

    /// Input file or directory does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Input exists but cannot be read as tables
    #[error("Could not read '{}': {reason}", .path.display())]
    UnreadableFile {
        /// Offending path
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Polars errors raised while loading or transforming data
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Table shape errors
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an invalid plan error
    pub fn invalid_plan(msg: impl Into<String>) -> Self {
        Error::InvalidPlan(msg.into())
    }

    /// Create a column-not-found error for the named operation
    pub fn column_not_found(
        column: impl Into<String>,
        context: impl Into<Cow<'static, str>>,
    ) -> Self {
        Error::ColumnNotFound {
            column: column.into(),
            context: context.into(),
        }
    }

    /// Create an external service error
    pub fn external(msg: impl Into<String>) -> Self {
        Error::ExternalService(msg.into())
    }

    /// Create a type mismatch error
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Error::Type(msg.into())
    }

    /// Create an unreadable file error
    pub fn unreadable(path: &Path, reason: impl ToString) -> Self {
        Error::UnreadableFile {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// HTTP-style status code for this error
    ///
    /// Missing input files are 404; anything wrong with the plan or the
    /// columns and sheets it names is 400; everything else is 500.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Error::FileNotFound(_) => 404,
            Error::InvalidPlan(_)
            | Error::InvalidPlanJson(_)
            | Error::ColumnNotFound { .. }
            | Error::SheetNotFound(_)
            | Error::InvalidDate { .. } => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::column_not_found("Salary", "Aggregate");
        assert_eq!(err.to_string(), "Aggregate error: column 'Salary' not found");

        let err = Error::invalid_plan("missing target_sheet");
        assert_eq!(err.to_string(), "Invalid plan: missing target_sheet");

        let err = Error::InvalidDate {
            column: "JoiningDate".to_string(),
            value: "soon".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid date in column 'JoiningDate': 'soon'");

        let err = Error::FileNotFound(PathBuf::from("/tmp/missing.csv"));
        assert_eq!(err.to_string(), "File not found: /tmp/missing.csv");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = TableError::DuplicateColumn("a".to_string()).into();
        assert!(matches!(err, Error::Table(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::FileNotFound(PathBuf::from("x")).status_code(), 404);
        assert_eq!(Error::invalid_plan("bad").status_code(), 400);
        assert_eq!(Error::InvalidPlanJson("bad".into()).status_code(), 400);
        assert_eq!(Error::column_not_found("c", "Filter").status_code(), 400);
        assert_eq!(Error::SheetNotFound("s".into()).status_code(), 400);
        assert_eq!(Error::type_mismatch("x").status_code(), 500);
        assert_eq!(Error::external("down").status_code(), 500);
        let polars = polars::error::PolarsError::ComputeError("boom".into());
        assert_eq!(Error::from(polars).status_code(), 500);
    }
}
