//! Schema extraction
//!
//! Lists each sheet of a workbook with its column headers, in the form the
//! prompt builder needs. Only the first row of each sheet is kept, but the
//! readers are the ones the store loads with, so column names always agree.

use std::path::Path;

use indexmap::IndexMap;
use log::debug;

use crate::error::Result;
use crate::store::{read_sheets, sheet_files, LoadOptions};

/// Sheet names mapped to ordered column names
pub type Schema = IndexMap<String, Vec<String>>;

/// Read the sheet and column names of a workbook
///
/// Fails with `FileNotFound` when the path does not exist and with
/// `UnreadableFile` when it holds no readable sheets.
pub fn extract_schema(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Schema> {
    let path = path.as_ref();
    let sample = LoadOptions {
        max_rows: Some(1),
        ..options.clone()
    };

    let mut schema = Schema::new();
    for file in sheet_files(path)? {
        for (name, table) in read_sheets(&file, &sample)? {
            let columns: Vec<String> = table.column_names().map(str::to_string).collect();
            debug!("Sheet '{name}': {} column(s)", columns.len());
            schema.insert(name, columns);
        }
    }
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_extract_schema_from_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Staff.csv"), "Name,Age\nAnn,30\n").unwrap();
        fs::write(dir.path().join("Reviews.csv"), "Name,Feedback\nAnn,Good\n").unwrap();

        let schema = extract_schema(dir.path(), &LoadOptions::default()).unwrap();
        let expected: Schema = [
            ("Reviews".to_string(), vec!["Name".to_string(), "Feedback".to_string()]),
            ("Staff".to_string(), vec!["Name".to_string(), "Age".to_string()]),
        ]
        .into_iter()
        .collect();
        assert_eq!(schema, expected);
    }

    #[test]
    fn test_extract_schema_from_spreadsheet() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/workbook.xlsx");
        let schema = extract_schema(&path, &LoadOptions::default()).unwrap();
        let sheets: Vec<&str> = schema.keys().map(String::as_str).collect();
        assert_eq!(sheets, vec!["Employees", "Departments"]);
        assert_eq!(schema["Departments"], vec!["Department".to_string(), "Floor".to_string()]);
    }

    #[test]
    fn test_missing_path() {
        let err = extract_schema("/definitely/not/here.csv", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
