//! Aggregations behind the dashboard's tiles and charts.
//!
//! Every function here is pure: it takes already-loaded tables and returns a
//! small derived value. Empty inputs produce zeroed or empty outputs.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{DashboardError, Result};
use crate::model::{Customer, Dataset, JoinedVisit, Store, Visit};

/// Default truncation for the "top N" rankings.
pub const DEFAULT_TOP_N: usize = 5;

/// Width of a time bucket in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BucketWidth(u32);

impl BucketWidth {
    pub const WEEKLY: BucketWidth = BucketWidth(7);
    pub const TEN_DAYS: BucketWidth = BucketWidth(10);
    pub const FORTNIGHTLY: BucketWidth = BucketWidth(14);

    pub fn days(days: u32) -> Result<Self> {
        if days == 0 {
            return Err(DashboardError::InvalidParameter(
                "bucket width must be at least one day".to_string(),
            ));
        }
        Ok(BucketWidth(days))
    }

    pub fn in_days(self) -> u32 {
        self.0
    }
}

/// Index of the bucket holding `date`: floor((date - anchor) / width).
///
/// `date` must not precede `anchor`.
pub fn bucket_index(date: NaiveDate, anchor: NaiveDate, width: BucketWidth) -> usize {
    let offset = (date - anchor).num_days();
    debug_assert!(offset >= 0, "date precedes bucket anchor");
    (offset / i64::from(width.0)) as usize
}

/// Anchor and bucket count covering every date, or `None` for no dates.
fn frame(dates: impl Iterator<Item = NaiveDate>, width: BucketWidth) -> Option<(NaiveDate, usize)> {
    let (min, max) = dates.fold(None, |acc: Option<(NaiveDate, NaiveDate)>, d| match acc {
        None => Some((d, d)),
        Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
    })?;
    Some((min, bucket_index(max, min, width) + 1))
}

fn bucket_start(anchor: NaiveDate, index: usize, width: BucketWidth) -> NaiveDate {
    anchor + Duration::days(index as i64 * i64::from(width.0))
}

/// One time bucket of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket<T> {
    pub start: NaiveDate,
    pub value: T,
}

/// Summed revenue per bucket, split by membership.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueBucket {
    pub start: NaiveDate,
    pub member: f64,
    pub non_member: f64,
}

/// A category and its frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub key: String,
    pub count: usize,
}

/// A store position for the location map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub store_id: String,
    pub state: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

pub fn active_customer_count(customers: &[Customer]) -> usize {
    customers.len()
}

pub fn total_visits(visits: &[Visit]) -> usize {
    visits.len()
}

pub fn total_revenue(visits: &[Visit]) -> f64 {
    visits.iter().map(|v| v.order_total).sum()
}

/// Sum of `order_total` in millions, rounded to one decimal with ties to even.
pub fn total_revenue_millions(visits: &[Visit]) -> f64 {
    round_to(total_revenue(visits) / 1_000_000.0, 1)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// Visit counts in contiguous fixed-width buckets anchored at the earliest date.
///
/// Buckets with no visits are present with a count of zero.
pub fn visits_by_period(visits: &[Visit], width: BucketWidth) -> Vec<Bucket<usize>> {
    let Some((anchor, len)) = frame(visits.iter().map(|v| v.visit_date.date()), width) else {
        return Vec::new();
    };

    let mut counts = vec![0usize; len];
    for visit in visits {
        counts[bucket_index(visit.visit_date.date(), anchor, width)] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, value)| Bucket {
            start: bucket_start(anchor, i, width),
            value,
        })
        .collect()
}

/// Sort by count descending, then key ascending, and keep at most `top_n`.
pub fn rank(counts: HashMap<String, usize>, top_n: Option<usize>) -> Vec<CategoryCount> {
    let mut ranked: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(key, count)| CategoryCount { key, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    if let Some(n) = top_n {
        ranked.truncate(n);
    }
    ranked
}

fn frequencies<'a>(keys: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for key in keys {
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Stores per state, top `top_n`. Stores without a state are not counted.
pub fn store_count_by_state(stores: &[Store], top_n: usize) -> Vec<CategoryCount> {
    rank(
        frequencies(stores.iter().filter_map(|s| s.state.as_deref())),
        Some(top_n),
    )
}

/// Visits per state of the visited store, top `top_n`.
pub fn visit_count_by_state(joined: &[JoinedVisit], top_n: usize) -> Vec<CategoryCount> {
    rank(
        frequencies(joined.iter().filter_map(|v| v.state.as_deref())),
        Some(top_n),
    )
}

/// Visits per payment method, every category.
pub fn payment_method_breakdown(joined: &[JoinedVisit]) -> Vec<CategoryCount> {
    rank(
        frequencies(joined.iter().filter_map(|v| v.payment_method.as_deref())),
        None,
    )
}

/// Visits per card provider on file, top `top_n`.
pub fn card_provider_breakdown(joined: &[JoinedVisit], top_n: usize) -> Vec<CategoryCount> {
    rank(
        frequencies(joined.iter().filter_map(|v| v.card_on_file.as_deref())),
        Some(top_n),
    )
}

/// Member and non-member revenue per bucket.
///
/// Visits whose customer is unknown belong to neither group and do not
/// influence the bucket range. A group with no visits in a bucket reports 0.
pub fn member_vs_nonmember_revenue(joined: &[JoinedVisit], width: BucketWidth) -> Vec<RevenueBucket> {
    let known = || joined.iter().filter(|v| v.is_member.is_some());
    let Some((anchor, len)) = frame(known().map(|v| v.visit_date.date()), width) else {
        return Vec::new();
    };

    let mut buckets: Vec<RevenueBucket> = (0..len)
        .map(|i| RevenueBucket {
            start: bucket_start(anchor, i, width),
            member: 0.0,
            non_member: 0.0,
        })
        .collect();

    for visit in known() {
        let bucket = &mut buckets[bucket_index(visit.visit_date.date(), anchor, width)];
        if visit.is_member == Some(true) {
            bucket.member += visit.order_total;
        } else {
            bucket.non_member += visit.order_total;
        }
    }
    buckets
}

/// Stores that have both coordinates.
pub fn store_locations(stores: &[Store]) -> Vec<MapPoint> {
    stores
        .iter()
        .filter_map(|s| match (s.latitude, s.longitude) {
            (Some(latitude), Some(longitude)) => Some(MapPoint {
                store_id: s.store_id.clone(),
                state: s.state.clone(),
                latitude,
                longitude,
            }),
            _ => None,
        })
        .collect()
}

/// Headline figures for the metric tiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub store_count: usize,
    pub active_customers: usize,
    pub total_visits: usize,
    pub total_revenue: f64,
    pub total_revenue_millions: f64,
}

/// Change of the visit and revenue figures against a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KpiDeltas {
    pub visits: i64,
    pub revenue: i64,
}

impl KpiSummary {
    pub fn of(dataset: &Dataset) -> Self {
        KpiSummary {
            store_count: dataset.stores.len(),
            active_customers: active_customer_count(&dataset.customers),
            total_visits: total_visits(&dataset.visits),
            total_revenue: total_revenue(&dataset.visits),
            total_revenue_millions: total_revenue_millions(&dataset.visits),
        }
    }

    pub fn deltas_since(&self, baseline: &KpiSummary) -> KpiDeltas {
        KpiDeltas {
            visits: self.total_visits as i64 - baseline.total_visits as i64,
            revenue: (self.total_revenue - baseline.total_revenue).round_ties_even() as i64,
        }
    }
}

/// Tile text for revenue, e.g. `$1.2M`.
pub fn format_revenue_millions(millions: f64) -> String {
    format!("${:.1}M", millions)
}
