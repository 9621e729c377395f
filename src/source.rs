//! Data source descriptors and the adapter seam.
//!
//! A [`SourceDescriptor`] names where the three tables live. Its adapter (a
//! [`DataSource`]) knows how to stamp the source's freshness and how to read
//! it into a [`Dataset`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::database::SqliteSource;
use crate::error::{DashboardError, Result};
use crate::loader::CsvSource;
use crate::model::Dataset;

/// Table names used by the database variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub stores: String,
    pub customers: String,
    pub visits: String,
}

impl Default for TableNames {
    fn default() -> Self {
        TableNames {
            stores: "stores".to_string(),
            customers: "customers".to_string(),
            visits: "visits".to_string(),
        }
    }
}

/// Where a dashboard reads its tables from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceDescriptor {
    /// Three CSV files with header rows.
    Csv {
        stores: PathBuf,
        customers: PathBuf,
        visits: PathBuf,
    },
    /// A SQLite database file.
    Sqlite { path: PathBuf, tables: TableNames },
}

impl SourceDescriptor {
    pub fn csv(
        stores: impl Into<PathBuf>,
        customers: impl Into<PathBuf>,
        visits: impl Into<PathBuf>,
    ) -> Self {
        SourceDescriptor::Csv {
            stores: stores.into(),
            customers: customers.into(),
            visits: visits.into(),
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        SourceDescriptor::Sqlite {
            path: path.into(),
            tables: TableNames::default(),
        }
    }

    /// The adapter that reads this source.
    pub fn adapter(&self) -> Box<dyn DataSource> {
        match self {
            SourceDescriptor::Csv {
                stores,
                customers,
                visits,
            } => Box::new(CsvSource::new(stores, customers, visits)),
            SourceDescriptor::Sqlite { path, tables } => {
                Box::new(SqliteSource::new(path, tables.clone()))
            }
        }
    }

    /// Read the source fully into memory and join it.
    pub fn load(&self) -> Result<Dataset> {
        self.adapter().load()
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Csv { visits, .. } => {
                let dir = visits.parent().unwrap_or_else(|| Path::new("."));
                write!(f, "csv:{}", dir.display())
            }
            SourceDescriptor::Sqlite { path, .. } => write!(f, "sqlite:{}", path.display()),
        }
    }
}

/// A stamp that changes whenever any backing file changes.
///
/// Built from the modification time and length of each file, so a rewrite
/// within the filesystem's timestamp granularity is still caught when the
/// size differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness(Vec<(PathBuf, Option<SystemTime>, u64)>);

impl Freshness {
    /// Stamp the given files. Files in `required` must exist.
    pub fn of_files<'a>(
        required: impl IntoIterator<Item = &'a Path>,
        optional: impl IntoIterator<Item = &'a Path>,
    ) -> Result<Self> {
        let mut parts = Vec::new();
        for path in required {
            let meta = fs::metadata(path)
                .map_err(|e| DashboardError::unavailable(path.display().to_string(), e))?;
            parts.push((path.to_path_buf(), meta.modified().ok(), meta.len()));
        }
        for path in optional {
            if let Ok(meta) = fs::metadata(path) {
                parts.push((path.to_path_buf(), meta.modified().ok(), meta.len()));
            }
        }
        Ok(Freshness(parts))
    }
}

/// Adapter contract: three tables in, joined dataset out.
pub trait DataSource: Send + Sync {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    /// Current freshness stamp of the underlying storage.
    fn freshness(&self) -> Result<Freshness>;

    /// Read all three tables and build the joined view.
    fn load(&self) -> Result<Dataset>;
}
