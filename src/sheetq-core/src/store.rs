//! Tabular store
//!
//! A [`TabularStore`] maps sheet names to tables. It is built once per
//! request from a workbook path and read-only afterwards; handlers clone a
//! table out of it before changing anything.
//!
//! A workbook is a spreadsheet file (`.xlsx`, `.xls`, `.ods`), a single
//! sheet file (`.csv`, `.json`, `.parquet`), or a directory of either. Each
//! worksheet of a spreadsheet becomes a sheet named after the worksheet;
//! every other file becomes one sheet named after its file stem.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use indexmap::IndexMap;
use log::{debug, info};
use polars::prelude::*;
use sheetq_shared::constants::DEFAULT_SCHEMA_INFERENCE_LENGTH;
use sheetq_shared::date::parse_datetime;
use sheetq_shared::{Table, Value};

use crate::error::{Error, Result};

/// Spreadsheet extensions; one sheet per worksheet
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// File extensions that load as sheets
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["xlsx", "xlsm", "xls", "ods", "csv", "json", "parquet"];

/// Options controlling how workbook files are read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rows sampled when inferring CSV column types
    pub infer_schema_length: usize,
    /// CSV field separator
    pub csv_separator: u8,
    /// Stop after this many rows per sheet
    pub max_rows: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            infer_schema_length: DEFAULT_SCHEMA_INFERENCE_LENGTH,
            csv_separator: b',',
            max_rows: None,
        }
    }
}

/// Named tables loaded from one workbook
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularStore {
    tables: IndexMap<String, Table>,
}

impl TabularStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(name, table)` pairs
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, Table)>,
        S: Into<String>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|(name, table)| (name.into(), table))
                .collect(),
        }
    }

    /// Add or replace a sheet
    pub fn insert(&mut self, name: impl Into<String>, table: Table) {
        self.tables.insert(name.into(), table);
    }

    /// Look up a sheet
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Look up a sheet, failing with `SheetNotFound`
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.get(name)
            .ok_or_else(|| Error::SheetNotFound(name.to_string()))
    }

    /// Sheet names in load order
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of sheets
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when no sheets are loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Sheet names mapped to their column names
    #[must_use]
    pub fn schema(&self) -> crate::schema::Schema {
        self.tables
            .iter()
            .map(|(name, table)| {
                let columns = table.column_names().map(str::to_string).collect();
                (name.clone(), columns)
            })
            .collect()
    }

    /// Load every sheet of a workbook
    pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut store = TabularStore::new();
        for file in sheet_files(path)? {
            for (name, table) in read_sheets(&file, options)? {
                debug!(
                    "Loaded sheet '{name}' from {} ({} rows, {} columns)",
                    file.display(),
                    table.height(),
                    table.width()
                );
                store.insert(name, table);
            }
        }
        info!("Loaded {} sheet(s) from {}", store.len(), path.display());
        Ok(store)
    }
}

/// Resolve a workbook path into the files to read, sorted by name
pub(crate) fn sheet_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    if path.is_file() {
        if !is_supported(path) {
            return Err(Error::unreadable(
                path,
                format!(
                    "unsupported file type; expected one of: {}",
                    SUPPORTED_EXTENSIONS.join(", ")
                ),
            ));
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path).map_err(|e| Error::unreadable(path, e))? {
        let file = entry.map_err(|e| Error::unreadable(path, e))?.path();
        if file.is_file() && is_supported(&file) {
            files.push(file);
        }
    }
    if files.is_empty() {
        return Err(Error::unreadable(path, "directory contains no sheet files"));
    }
    files.sort_by_key(|file| sheet_name(file));
    Ok(files)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn is_spreadsheet(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SPREADSHEET_EXTENSIONS.contains(&ext.as_str()))
}

fn sheet_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read every sheet in one file, in workbook order
pub(crate) fn read_sheets(path: &Path, options: &LoadOptions) -> Result<Vec<(String, Table)>> {
    let sheets = if is_spreadsheet(path) {
        read_spreadsheet(path)?
    } else {
        let df = read_dataframe(path, options).map_err(|e| match e {
            Error::Polars(inner) => Error::unreadable(path, inner),
            other => other,
        })?;
        vec![(sheet_name(path), Table::from_dataframe(df))]
    };

    Ok(sheets
        .into_iter()
        .map(|(name, table)| (name, truncate(table, options.max_rows)))
        .collect())
}

fn truncate(table: Table, max_rows: Option<usize>) -> Table {
    match max_rows {
        Some(max_rows) if table.height() > max_rows => {
            Table::from_dataframe(table.dataframe().slice(0, max_rows))
        }
        _ => table,
    }
}

fn read_dataframe(path: &Path, options: &LoadOptions) -> Result<DataFrame> {
    let file = File::open(path)?;
    let df = match extension(path).as_deref() {
        Some("csv") => {
            let parse_options = CsvParseOptions::default().with_separator(options.csv_separator);
            let read_options = CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(options.infer_schema_length))
                .with_parse_options(parse_options);
            CsvReader::new(BufReader::new(file))
                .with_options(read_options)
                .finish()?
        }
        Some("json") => polars::io::json::JsonReader::new(BufReader::new(file)).finish()?,
        Some("parquet") => ParquetReader::new(file).finish()?,
        _ => return Err(Error::unreadable(path, "unsupported file type")),
    };
    Ok(df)
}

fn read_spreadsheet(path: &Path) -> Result<Vec<(String, Table)>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| Error::unreadable(path, e))?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| Error::unreadable(path, format!("worksheet '{name}': {e}")))?;
        let table = range_to_table(&range)
            .map_err(|e| Error::unreadable(path, format!("worksheet '{name}': {e}")))?;
        sheets.push((name, table));
    }
    Ok(sheets)
}

/// Build a table from a worksheet; the first row holds the headers
fn range_to_table(range: &Range<Data>) -> Result<Table> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::new());
    };

    let mut names: Vec<String> = Vec::with_capacity(header.len());
    for (i, cell) in header.iter().enumerate() {
        let base = match spreadsheet_cell(cell) {
            Value::Null => format!("Unnamed: {i}"),
            value => value.to_string(),
        };
        let mut name = base.clone();
        let mut copies = 0;
        while names.contains(&name) {
            copies += 1;
            name = format!("{base}.{copies}");
        }
        names.push(name);
    }

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(range.height()); names.len()];
    for row in rows {
        for (cells, cell) in columns.iter_mut().zip(row) {
            cells.push(spreadsheet_cell(cell));
        }
    }
    Ok(Table::from_columns(names.into_iter().zip(columns))?)
}

/// Cell value of a worksheet cell
///
/// Whole-number floats become integers, so a column of them loads as `Int64`.
fn spreadsheet_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::Int(*i),
        #[allow(clippy::cast_possible_truncation)]
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Value::Int(*f as i64),
        Data::Float(f) => Value::Float(*f),
        Data::String(s) | Data::DurationIso(s) => Value::string(s.as_str()),
        Data::DateTime(dt) => dt.as_datetime().map_or(Value::Null, Value::Date),
        Data::DateTimeIso(s) => parse_datetime(s).map_or_else(|| Value::string(s.as_str()), Value::Date),
    }
}
