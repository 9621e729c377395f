//! SQLite adapter for the live dashboard.
//!
//! Each load opens a read-only connection, reads the three tables with full
//! `SELECT *` scans, and closes the connection before returning, on both the
//! success and the error path.

use log::{debug, warn};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use crate::error::{DashboardError, Result};
use crate::model::Dataset;
use crate::source::{DataSource, Freshness, TableNames};
use crate::table::{RawTable, decode_customers, decode_stores, decode_visits};

#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
    tables: TableNames,
}

impl SqliteSource {
    pub fn new(path: impl AsRef<Path>, tables: TableNames) -> Self {
        SqliteSource {
            path: path.as_ref().to_path_buf(),
            tables,
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

impl DataSource for SqliteSource {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn freshness(&self) -> Result<Freshness> {
        let wal = wal_path(&self.path);
        Freshness::of_files([self.path.as_path()], [wal.as_path()])
    }

    fn load(&self) -> Result<Dataset> {
        let (stores, customers, visits) = with_connection(&self.path, |conn| {
            let stores = read_table(conn, &self.tables.stores)?;
            let customers = read_table(conn, &self.tables.customers)?;
            let visits = read_table(conn, &self.tables.visits)?;
            Ok((stores, customers, visits))
        })?;

        let stores = decode_stores(&stores)?;
        let customers = decode_customers(&customers)?;
        let visits = decode_visits(&visits)?;
        debug!(
            "loaded {} stores, {} customers, {} visits from {}",
            stores.len(),
            customers.len(),
            visits.len(),
            self.location()
        );
        Ok(Dataset::new(stores, customers, visits))
    }
}

/// Open a read-only connection, run `f`, and close the connection.
///
/// The connection is released whether or not `f` succeeds.
pub fn with_connection<T>(path: &Path, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    let location = path.display().to_string();
    if !path.exists() {
        return Err(DashboardError::unavailable(location, "database file does not exist"));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| DashboardError::unavailable(location.clone(), e))?;

    let result = f(&conn);

    if let Err((_, e)) = conn.close() {
        warn!("failed to close connection to {}: {}", location, e);
    }
    result
}

/// Full-table read of `table` into untyped cells.
pub fn read_table(conn: &Connection, table: &str) -> Result<RawTable> {
    if !table_exists(conn, table)? {
        return Err(DashboardError::missing_table(table));
    }

    let sql = format!("SELECT * FROM \"{}\"", table.replace('"', "\"\""));
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| query_error(conn, table, e))?;
    let headers: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let cols = headers.len();

    let mut raw = RawTable::new(table, headers);
    let mut rows = stmt.query([]).map_err(|e| query_error(conn, table, e))?;
    while let Some(row) = rows.next().map_err(|e| query_error(conn, table, e))? {
        let mut cells = Vec::with_capacity(cols);
        for i in 0..cols {
            let value = row.get_ref(i).map_err(|e| query_error(conn, table, e))?;
            cells.push(cell_text(value));
        }
        raw.rows.push(cells);
    }
    Ok(raw)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
    .map_err(|e| query_error(conn, table, e))
}

// SQLite errors during a read mean the database itself is unusable
fn query_error(conn: &Connection, table: &str, e: rusqlite::Error) -> DashboardError {
    let location = conn.path().unwrap_or("sqlite").to_string();
    DashboardError::unavailable(location, format!("reading `{}`: {}", table, e))
}

/// Render a SQLite value as text; keys stay opaque strings.
fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("-wal");
    PathBuf::from(name)
}
