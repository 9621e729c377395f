//! Untyped tables as read from a source, and their decoding into the typed
//! `Store`, `Customer` and `Visit` rows.
//!
//! Both the CSV and SQLite adapters produce a [`RawTable`] of optional string
//! cells; decoding is shared so the two sources accept exactly the same data.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::warn;
use std::collections::BTreeMap;

use crate::error::{DashboardError, Result};
use crate::model::{Customer, Store, Visit};

pub const STORE_COLUMNS: [&str; 4] = ["store_id", "state", "latitude", "longitude"];
pub const CUSTOMER_COLUMNS: [&str; 2] = ["customer_id", "is_member"];
pub const VISIT_COLUMNS: [&str; 6] = [
    "customer_id",
    "store_id",
    "visit_date",
    "order_total",
    "payment_method",
    "card_on_file",
];

/// A table of optional string cells with named columns.
///
/// Empty cells are stored as `None`.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Self {
        RawTable {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    /// Index of a column, or `SchemaMismatch` if the header is absent.
    pub fn column(&self, column: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DashboardError::missing_column(&self.name, column))
    }

    pub fn optional_column(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows[row]
            .get(col)
            .and_then(|c| c.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    fn invalid(&self, row: usize, col: usize, reason: impl Into<String>) -> DashboardError {
        DashboardError::InvalidValue {
            table: self.name.clone(),
            row: row + 1,
            column: self.headers[col].clone(),
            reason: reason.into(),
        }
    }

    fn required(&self, row: usize, col: usize) -> Result<&str> {
        self.cell(row, col)
            .ok_or_else(|| self.invalid(row, col, "value is missing"))
    }

    /// Parse a number, rejecting `NaN` and infinities.
    fn finite_f64(&self, row: usize, col: usize, text: &str) -> Result<f64> {
        let value = text
            .parse::<f64>()
            .map_err(|e| self.invalid(row, col, e.to_string()))?;
        if !value.is_finite() {
            return Err(self.invalid(row, col, format!("`{}` is not a finite number", text)));
        }
        Ok(value)
    }

    fn optional_f64(&self, row: usize, col: usize) -> Result<Option<f64>> {
        match self.cell(row, col) {
            Some(text) => self.finite_f64(row, col, text).map(Some),
            None => Ok(None),
        }
    }

    /// Columns that none of the typed rows claim, kept verbatim per row.
    fn extras(&self, known: &[&str], row: usize) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !known.contains(&h.as_str()))
            .filter_map(|(i, h)| self.cell(row, i).map(|v| (h.clone(), v.to_string())))
            .collect()
    }
}

/// Decode the stores table. Key columns stay opaque strings.
pub fn decode_stores(table: &RawTable) -> Result<Vec<Store>> {
    let id = table.column("store_id")?;
    let state = table.column("state")?;
    let lat = table.column("latitude")?;
    let lon = table.column("longitude")?;

    let mut stores = Vec::with_capacity(table.len());
    for r in 0..table.len() {
        stores.push(Store {
            store_id: table.required(r, id)?.to_string(),
            state: table.cell(r, state).map(str::to_string),
            latitude: table.optional_f64(r, lat)?,
            longitude: table.optional_f64(r, lon)?,
            extra: table.extras(&STORE_COLUMNS, r),
        });
    }
    Ok(stores)
}

/// Decode the customers table.
///
/// `card_on_file` is optional here; when present it backs up the visit's own
/// value in the joined view.
pub fn decode_customers(table: &RawTable) -> Result<Vec<Customer>> {
    let id = table.column("customer_id")?;
    let member = table.column("is_member")?;
    let card = table.optional_column("card_on_file");

    let mut known: Vec<&str> = CUSTOMER_COLUMNS.to_vec();
    known.push("card_on_file");

    let mut customers = Vec::with_capacity(table.len());
    for r in 0..table.len() {
        let flag = table.required(r, member)?;
        let is_member = parse_flag(flag)
            .ok_or_else(|| table.invalid(r, member, format!("`{}` is not a boolean", flag)))?;
        customers.push(Customer {
            customer_id: table.required(r, id)?.to_string(),
            is_member,
            card_on_file: card.and_then(|c| table.cell(r, c)).map(str::to_string),
            extra: table.extras(&known, r),
        });
    }
    Ok(customers)
}

/// Decode the visits table, parsing `visit_date` and `order_total`.
pub fn decode_visits(table: &RawTable) -> Result<Vec<Visit>> {
    let customer = table.column("customer_id")?;
    let store = table.column("store_id")?;
    let date = table.column("visit_date")?;
    let total = table.column("order_total")?;
    let payment = table.column("payment_method")?;
    let card = table.column("card_on_file")?;

    let mut visits = Vec::with_capacity(table.len());
    for r in 0..table.len() {
        let date_text = table.required(r, date)?;
        let visit_date = parse_visit_date(date_text).ok_or_else(|| {
            table.invalid(r, date, format!("`{}` is not a recognised date", date_text))
        })?;
        let total_text = table.required(r, total)?;
        let order_total = table.finite_f64(r, total, total_text)?;

        visits.push(Visit {
            customer_id: table.cell(r, customer).map(str::to_string),
            store_id: table.cell(r, store).map(str::to_string),
            visit_date,
            order_total,
            payment_method: table.cell(r, payment).map(str::to_string),
            card_on_file: table.cell(r, card).map(str::to_string),
            extra: table.extras(&VISIT_COLUMNS, r),
        });
    }

    if visits.iter().any(|v| v.order_total < 0.0) {
        warn!("table `{}` contains negative order totals", table.name);
    }
    Ok(visits)
}

/// Accepts the usual spellings of a boolean flag, case-insensitively.
pub fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "1.0" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "0.0" => Some(false),
        _ => None,
    }
}

/// Parses ISO-8601 style dates and timestamps; a bare date means midnight.
pub fn parse_visit_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
