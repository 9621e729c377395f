use thiserror::Error;

/// Result type for dashboard operations.
pub type Result<T> = std::result::Result<T, DashboardError>;

/// Errors raised while loading, aggregating or rendering a refresh cycle.
///
/// Only `SourceUnavailable` is considered transient: the refresh driver backs
/// off and retries it. Everything else waits for the next trigger.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// A source file is missing or the database cannot be opened.
    #[error("source unavailable: {location}: {reason}")]
    SourceUnavailable { location: String, reason: String },

    /// An expected table or column is absent.
    #[error("schema mismatch in `{table}`: {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// A cell could not be decoded into its declared type.
    #[error("invalid value in `{table}` row {row}, column `{column}`: {reason}")]
    InvalidValue {
        table: String,
        row: usize,
        column: String,
        reason: String,
    },

    /// A caller-supplied parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Chart generation failed.
    #[error("chart rendering failed: {0}")]
    Render(String),

    /// The configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DashboardError {
    pub fn unavailable(location: impl Into<String>, reason: impl ToString) -> Self {
        DashboardError::SourceUnavailable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_column(table: impl Into<String>, column: &str) -> Self {
        DashboardError::SchemaMismatch {
            table: table.into(),
            detail: format!("missing column `{}`", column),
        }
    }

    pub fn missing_table(table: impl Into<String>) -> Self {
        DashboardError::SchemaMismatch {
            table: table.into(),
            detail: "table does not exist".to_string(),
        }
    }

    /// Returns true if retrying later might succeed.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, DashboardError::SourceUnavailable { .. })
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardError::SourceUnavailable { .. } => "source_unavailable",
            DashboardError::SchemaMismatch { .. } => "schema_mismatch",
            DashboardError::InvalidValue { .. } => "invalid_value",
            DashboardError::InvalidParameter(_) => "invalid_parameter",
            DashboardError::Render(_) => "render",
            DashboardError::Config(_) => "config",
        }
    }
}
