use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DashboardError, Result};
use crate::model::Dataset;
use crate::source::{DataSource, Freshness};
use crate::table::{RawTable, decode_customers, decode_stores, decode_visits};

/// Flat-file adapter reading `stores.csv`, `customers.csv` and `visits.csv`.
#[derive(Debug, Clone)]
pub struct CsvSource {
    stores: PathBuf,
    customers: PathBuf,
    visits: PathBuf,
}

impl CsvSource {
    pub fn new(
        stores: impl AsRef<Path>,
        customers: impl AsRef<Path>,
        visits: impl AsRef<Path>,
    ) -> Self {
        CsvSource {
            stores: stores.as_ref().to_path_buf(),
            customers: customers.as_ref().to_path_buf(),
            visits: visits.as_ref().to_path_buf(),
        }
    }
}

impl DataSource for CsvSource {
    fn describe(&self) -> String {
        format!(
            "{}, {}, {}",
            self.stores.display(),
            self.customers.display(),
            self.visits.display()
        )
    }

    fn freshness(&self) -> Result<Freshness> {
        Freshness::of_files(
            [
                self.stores.as_path(),
                self.customers.as_path(),
                self.visits.as_path(),
            ],
            std::iter::empty(),
        )
    }

    fn load(&self) -> Result<Dataset> {
        let stores = decode_stores(&from_csv("stores", &self.stores)?)?;
        let customers = decode_customers(&from_csv("customers", &self.customers)?)?;
        let visits = decode_visits(&from_csv("visits", &self.visits)?)?;
        debug!(
            "loaded {} stores, {} customers, {} visits from csv",
            stores.len(),
            customers.len(),
            visits.len()
        );
        Ok(Dataset::new(stores, customers, visits))
    }
}

/// Load a table from a CSV file
///
/// The file must be UTF-8 with a header row. Every cell is kept as text;
/// typing happens when the table is decoded.
///
/// # Errors
/// * `SourceUnavailable` if the file cannot be read
/// * `SchemaMismatch` if the file has no header row
pub fn from_csv(table: &str, filepath: impl AsRef<Path>) -> Result<RawTable> {
    let path = filepath.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| DashboardError::unavailable(path.display().to_string(), e))?;
    parse_csv(table, &content)
}

/// Parse CSV text (header row first) into a [`RawTable`].
pub fn parse_csv(table: &str, content: &str) -> Result<RawTable> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = split_records(content).into_iter();

    let header = records.next().ok_or_else(|| DashboardError::SchemaMismatch {
        table: table.to_string(),
        detail: "file has no header row".to_string(),
    })?;
    let headers: Vec<String> = parse_csv_row(&header)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let cols = headers.len();

    let mut raw = RawTable::new(table, headers);
    for record in records {
        if record.trim().is_empty() {
            continue;
        }
        let mut row: Vec<Option<String>> = parse_csv_row(&record)
            .into_iter()
            .take(cols) // Skip extra data
            .map(|field| if field.is_empty() { None } else { Some(field) })
            .collect();
        row.resize(cols, None);
        raw.rows.push(row);
    }

    Ok(raw)
}

// Split text into records on newlines that are not inside quotes
fn split_records(content: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in content.chars() {
        match c {
            '"' => {
                // A doubled quote toggles twice, which leaves the state unchanged
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\n' if !in_quotes => {
                if current.ends_with('\r') {
                    current.pop();
                }
                records.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        if current.ends_with('\r') {
            current.pop();
        }
        records.push(current);
    }

    records
}

// Parse a CSV row into a vector of strings
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                // End of field
                result.push(std::mem::take(&mut current_field));
            }
            _ => {
                current_field.push(c);
            }
        }
    }

    // Add the last field
    result.push(current_field);

    result
}
