/*!
# Foot Traffic Dashboard

A browser-based retail foot-traffic dashboard built in Rust.

## Overview

The dashboard reads three tables (stores, customers, visits) from either a set
of CSV files or a SQLite database, joins every visit with the customer and the
store it refers to, and serves headline metrics and charts derived from the
joined data. Three variants share the same pipeline:

- **basic**: flat files; visits over two-week periods, store map, stores by state
- **full**: flat files; adds KPI deltas, payment methods, card providers and
  member vs non-member revenue
- **live**: SQLite database re-polled on a timer; adds visits by state

## Architecture

### Data Layer
- **source**: descriptors for where the tables live and the `DataSource` seam
- **loader**: CSV reading (quoted fields, BOM, CRLF)
- **database**: read-only SQLite reading through rusqlite
- **table**: untyped tables and their decoding into typed rows
- **model**: typed rows, the left join and the `Dataset` snapshot
- **cache**: snapshots keyed by source and freshness stamp

### Computation Layer
- **metrics**: scalar KPIs, time bucketing, categorical ranking
- **widgets**: the dependency graph from datasets to widget data and charts,
  memoized per dataset generation
- **graph**: SVG rendering of line, area, bar, donut and map charts

### Service Layer
- **refresh**: the refresh driver (timer, manual trigger, backoff, atomic
  snapshot publication)
- **downloader**: CSV and XLSX export of the joined table
- **app**: routing and HTTP handlers
- **config**: TOML configuration and per-variant defaults

## REST API Endpoints

- `/` - Dashboard page
- `/api/layout` - Variant, widget list and raw table limit
- `/api/summary` - KPI tiles of the current snapshot
- `/api/raw?limit=N` - First rows of the joined table
- `/api/raw/export?format=csv|xlsx` - Full joined table download
- `/api/widgets/{widget}` - Computed widget data as JSON
- `/charts/{widget}` - Rendered widget chart as SVG
- `/api/refresh` - Request a forced reload (POST)
- `/api/status` - Refresh driver status
*/

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod source;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod downloader;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod refresh;
#[cfg(feature = "web")]
pub mod widgets;

pub use cache::{CacheLookup, SnapshotCache};
pub use config::{DashboardConfig, Variant};
pub use error::{DashboardError, Result};
pub use model::{Customer, Dataset, JoinedVisit, Store, Visit};
pub use source::{DataSource, SourceDescriptor, TableNames};
