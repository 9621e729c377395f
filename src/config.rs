use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DashboardError, Result};
use crate::metrics::DEFAULT_TOP_N;
use crate::source::{SourceDescriptor, TableNames};
#[cfg(feature = "web")]
use crate::widgets::WidgetKind;

/// Which dashboard to serve. The variants share one pipeline and differ in
/// data source and in the widgets shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Flat files; visits, store map, stores by state.
    #[default]
    Basic,
    /// Flat files; adds payment, card provider and membership charts plus KPI deltas.
    Full,
    /// SQLite database re-polled on a timer; adds visits by state.
    Live,
}

impl Variant {
    #[cfg(feature = "web")]
    pub fn widgets(self) -> &'static [WidgetKind] {
        match self {
            Variant::Basic => &[
                WidgetKind::VisitsByPeriod,
                WidgetKind::StoreMap,
                WidgetKind::StoresByState,
            ],
            Variant::Full => &[
                WidgetKind::VisitsByPeriod,
                WidgetKind::StoreMap,
                WidgetKind::PaymentMethods,
                WidgetKind::CardProviders,
                WidgetKind::MemberRevenueLine,
                WidgetKind::MemberRevenueArea,
            ],
            Variant::Live => &[
                WidgetKind::VisitsByPeriod,
                WidgetKind::StoreMap,
                WidgetKind::StoresByState,
                WidgetKind::VisitsByState,
            ],
        }
    }

    pub fn raw_row_limit(self) -> usize {
        match self {
            Variant::Full => 80,
            Variant::Basic | Variant::Live => 25,
        }
    }

    /// Bucket width of the visits-over-time chart, in days.
    pub fn visits_bucket_days(self) -> u32 {
        match self {
            Variant::Full => 10,
            Variant::Basic | Variant::Live => 14,
        }
    }

    pub fn shows_store_count(self) -> bool {
        self == Variant::Full
    }

    pub fn tracks_deltas(self) -> bool {
        self == Variant::Full
    }

    pub fn default_refresh_secs(self) -> Option<u64> {
        match self {
            Variant::Live => Some(10),
            Variant::Basic | Variant::Full => None,
        }
    }
}

/// Dashboard configuration, read from an optional TOML file.
///
/// Every field has a default, so an empty file is a valid Basic dashboard
/// over `data/db/*.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub variant: Variant,
    pub bind: String,
    pub stores_path: PathBuf,
    pub customers_path: PathBuf,
    pub visits_path: PathBuf,
    pub database_path: PathBuf,
    pub tables: TableNames,
    /// Timer period; unset means the variant's default (only Live polls).
    pub refresh_interval_secs: Option<u64>,
    pub max_backoff_secs: u64,
    pub top_n: usize,
    pub raw_row_limit: Option<usize>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            variant: Variant::Basic,
            bind: "127.0.0.1:3000".to_string(),
            stores_path: PathBuf::from("data/db/stores.csv"),
            customers_path: PathBuf::from("data/db/customers.csv"),
            visits_path: PathBuf::from("data/db/visits.csv"),
            database_path: PathBuf::from("data.db"),
            tables: TableNames::default(),
            refresh_interval_secs: None,
            max_backoff_secs: 300,
            top_n: DEFAULT_TOP_N,
            raw_row_limit: None,
        }
    }
}

impl DashboardConfig {
    pub fn for_variant(variant: Variant) -> Self {
        DashboardConfig {
            variant,
            ..Self::default()
        }
    }

    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| DashboardError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DashboardConfig =
            toml::from_str(text).map_err(|e| DashboardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(DashboardError::Config("top_n must be at least 1".to_string()));
        }
        if self.refresh_interval_secs == Some(0) {
            return Err(DashboardError::Config(
                "refresh_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Flat files for Basic and Full, the database for Live.
    pub fn source(&self) -> SourceDescriptor {
        match self.variant {
            Variant::Live => SourceDescriptor::Sqlite {
                path: self.database_path.clone(),
                tables: self.tables.clone(),
            },
            Variant::Basic | Variant::Full => SourceDescriptor::csv(
                &self.stores_path,
                &self.customers_path,
                &self.visits_path,
            ),
        }
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .or(self.variant.default_refresh_secs())
            .map(Duration::from_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn raw_limit(&self) -> usize {
        self.raw_row_limit.unwrap_or(self.variant.raw_row_limit())
    }
}
