#![cfg(feature = "web")]
//! Dashboard widgets as a small dependency graph.
//!
//! Each chart widget reads one data node; each data node is a pure function
//! of the published snapshot and the parameters it actually uses. Results are
//! memoized per (node, parameters) and reused until the snapshot generation
//! changes, so switching a bucket width only recomputes the nodes that read
//! it, and two widgets sharing a node share one computation.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{DashboardError, Result};
use crate::graph::{self, GraphOptions, GraphType, Series};
use crate::metrics::{
    self, Bucket, BucketWidth, CategoryCount, KpiDeltas, KpiSummary, MapPoint, RevenueBucket,
};
use crate::model::Dataset;

/// Chart widgets a dashboard variant can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    VisitsByPeriod,
    StoreMap,
    StoresByState,
    VisitsByState,
    PaymentMethods,
    CardProviders,
    MemberRevenueLine,
    MemberRevenueArea,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 8] = [
        WidgetKind::VisitsByPeriod,
        WidgetKind::StoreMap,
        WidgetKind::StoresByState,
        WidgetKind::VisitsByState,
        WidgetKind::PaymentMethods,
        WidgetKind::CardProviders,
        WidgetKind::MemberRevenueLine,
        WidgetKind::MemberRevenueArea,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            WidgetKind::VisitsByPeriod => "visits_by_period",
            WidgetKind::StoreMap => "store_map",
            WidgetKind::StoresByState => "stores_by_state",
            WidgetKind::VisitsByState => "visits_by_state",
            WidgetKind::PaymentMethods => "payment_methods",
            WidgetKind::CardProviders => "card_providers",
            WidgetKind::MemberRevenueLine => "member_revenue_line",
            WidgetKind::MemberRevenueArea => "member_revenue_area",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.slug() == slug)
    }

    pub fn title(self) -> &'static str {
        match self {
            WidgetKind::VisitsByPeriod => "Visits by Day",
            WidgetKind::StoreMap => "Store Locations",
            WidgetKind::StoresByState => "Most Stores by State",
            WidgetKind::VisitsByState => "Highest Foot Traffic by State",
            WidgetKind::PaymentMethods => "Cash vs. Credit",
            WidgetKind::CardProviders => "Top Card Providers",
            WidgetKind::MemberRevenueLine | WidgetKind::MemberRevenueArea => {
                "Members vs. Nonmembers"
            }
        }
    }

    /// The data node this widget draws.
    pub fn input(self) -> DataNode {
        match self {
            WidgetKind::VisitsByPeriod => DataNode::VisitsByPeriod,
            WidgetKind::StoreMap => DataNode::StoreLocations,
            WidgetKind::StoresByState => DataNode::StoresByState,
            WidgetKind::VisitsByState => DataNode::VisitsByState,
            WidgetKind::PaymentMethods => DataNode::PaymentMethods,
            WidgetKind::CardProviders => DataNode::CardProviders,
            WidgetKind::MemberRevenueLine | WidgetKind::MemberRevenueArea => {
                DataNode::MemberRevenue
            }
        }
    }

    fn graph_type(self) -> GraphType {
        match self {
            WidgetKind::VisitsByPeriod | WidgetKind::MemberRevenueLine => GraphType::Line,
            WidgetKind::MemberRevenueArea => GraphType::Area,
            WidgetKind::StoreMap => GraphType::Map,
            WidgetKind::StoresByState | WidgetKind::VisitsByState => GraphType::Bar,
            WidgetKind::PaymentMethods => GraphType::Pie,
            WidgetKind::CardProviders => GraphType::HorizontalBar,
        }
    }
}

/// Derived tables the widgets read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataNode {
    VisitsByPeriod,
    StoreLocations,
    StoresByState,
    VisitsByState,
    PaymentMethods,
    CardProviders,
    MemberRevenue,
}

/// User-selectable widget parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetParams {
    pub bucket: BucketWidth,
    pub top_n: usize,
}

/// A data node together with only the parameters it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeKey {
    node: DataNode,
    bucket: Option<BucketWidth>,
    top_n: Option<usize>,
}

impl NodeKey {
    fn new(node: DataNode, params: WidgetParams) -> Self {
        let (bucket, top_n) = match node {
            DataNode::VisitsByPeriod | DataNode::MemberRevenue => (Some(params.bucket), None),
            DataNode::StoresByState | DataNode::VisitsByState | DataNode::CardProviders => {
                (None, Some(params.top_n))
            }
            DataNode::StoreLocations | DataNode::PaymentMethods => (None, None),
        };
        NodeKey { node, bucket, top_n }
    }
}

/// Output of a data node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WidgetData {
    Counts(Vec<Bucket<usize>>),
    Ranking(Vec<CategoryCount>),
    Points(Vec<MapPoint>),
    Revenue(Vec<RevenueBucket>),
}

fn evaluate(key: NodeKey, dataset: &Dataset) -> WidgetData {
    let bucket = key.bucket.unwrap_or(BucketWidth::WEEKLY);
    let top_n = key.top_n.unwrap_or(metrics::DEFAULT_TOP_N);
    match key.node {
        DataNode::VisitsByPeriod => {
            WidgetData::Counts(metrics::visits_by_period(&dataset.visits, bucket))
        }
        DataNode::StoreLocations => WidgetData::Points(metrics::store_locations(&dataset.stores)),
        DataNode::StoresByState => {
            WidgetData::Ranking(metrics::store_count_by_state(&dataset.stores, top_n))
        }
        DataNode::VisitsByState => {
            WidgetData::Ranking(metrics::visit_count_by_state(&dataset.joined, top_n))
        }
        DataNode::PaymentMethods => {
            WidgetData::Ranking(metrics::payment_method_breakdown(&dataset.joined))
        }
        DataNode::CardProviders => {
            WidgetData::Ranking(metrics::card_provider_breakdown(&dataset.joined, top_n))
        }
        DataNode::MemberRevenue => WidgetData::Revenue(metrics::member_vs_nonmember_revenue(
            &dataset.joined,
            bucket,
        )),
    }
}

fn render(kind: WidgetKind, data: &WidgetData) -> Result<String> {
    let options = GraphOptions::new(kind.title(), kind.graph_type());
    match data {
        WidgetData::Counts(buckets) => {
            let labels: Vec<String> = buckets.iter().map(|b| b.start.to_string()).collect();
            let values = buckets.iter().map(|b| b.value as f64).collect();
            graph::render_series(
                &labels,
                &[Series::new("visits", values)],
                &options.labels("Period start", "Visits"),
            )
        }
        WidgetData::Revenue(buckets) => {
            let labels: Vec<String> = buckets.iter().map(|b| b.start.to_string()).collect();
            let series = [
                Series::new("nonmember", buckets.iter().map(|b| b.non_member).collect()),
                Series::new("member", buckets.iter().map(|b| b.member).collect()),
            ];
            graph::render_series(&labels, &series, &options.labels("Week starting", "Revenue"))
        }
        WidgetData::Ranking(counts) => {
            let options = match kind.graph_type() {
                GraphType::HorizontalBar => options.labels("Visits", ""),
                GraphType::Bar => options.labels("State", "Count"),
                _ => options,
            };
            graph::render_categories(counts, &options)
        }
        WidgetData::Points(points) => graph::render_map(points, &options),
    }
}

struct Memo<T> {
    generation: u64,
    value: Arc<T>,
}

/// Memoized evaluation of data nodes and chart renders.
#[derive(Default)]
pub struct WidgetGraph {
    data: Mutex<HashMap<NodeKey, Memo<WidgetData>>>,
    charts: Mutex<HashMap<(WidgetKind, NodeKey), Memo<String>>>,
    evaluations: AtomicU64,
    renders: AtomicU64,
}

impl WidgetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data behind `kind`, recomputed only if the generation or a parameter it
    /// reads has changed.
    pub fn data(
        &self,
        generation: u64,
        dataset: &Dataset,
        kind: WidgetKind,
        params: WidgetParams,
    ) -> Arc<WidgetData> {
        let key = NodeKey::new(kind.input(), params);
        let mut memo = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = memo.get(&key) {
            if entry.generation == generation {
                return Arc::clone(&entry.value);
            }
        }

        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(evaluate(key, dataset));
        memo.insert(
            key,
            Memo {
                generation,
                value: Arc::clone(&value),
            },
        );
        value
    }

    /// SVG chart for `kind`, re-rendered only when its input changed.
    pub fn chart(
        &self,
        generation: u64,
        dataset: &Dataset,
        kind: WidgetKind,
        params: WidgetParams,
    ) -> Result<Arc<String>> {
        let key = (kind, NodeKey::new(kind.input(), params));
        {
            let charts = self.charts.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = charts.get(&key) {
                if entry.generation == generation {
                    return Ok(Arc::clone(&entry.value));
                }
            }
        }

        let data = self.data(generation, dataset, kind, params);
        self.renders.fetch_add(1, Ordering::Relaxed);
        let svg = Arc::new(render(kind, &data)?);
        self.charts.lock().unwrap_or_else(|e| e.into_inner()).insert(
            key,
            Memo {
                generation,
                value: Arc::clone(&svg),
            },
        );
        Ok(svg)
    }

    /// Drop memoized results from generations other than `generation`.
    pub fn retain_generation(&self, generation: u64) {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, m| m.generation == generation);
        self.charts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, m| m.generation == generation);
    }

    /// Number of data node evaluations performed so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Number of chart renders performed so far.
    pub fn renders(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }
}

/// One metric tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTile {
    pub label: &'static str,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
}

/// Tiles for a summary, with store count and deltas only where asked for.
pub fn metric_tiles(
    summary: &KpiSummary,
    deltas: Option<&KpiDeltas>,
    show_store_count: bool,
) -> Vec<MetricTile> {
    let mut tiles = Vec::with_capacity(4);
    if show_store_count {
        tiles.push(MetricTile {
            label: "Store Count",
            value: summary.store_count.to_string(),
            delta: None,
        });
    }
    tiles.push(MetricTile {
        label: "Active Customers",
        value: summary.active_customers.to_string(),
        delta: None,
    });
    tiles.push(MetricTile {
        label: "Total Visits",
        value: summary.total_visits.to_string(),
        delta: deltas.map(|d| format!("{:+}", d.visits)),
    });
    tiles.push(MetricTile {
        label: if deltas.is_some() { "Revenue" } else { "Total Revenue" },
        value: metrics::format_revenue_millions(summary.total_revenue_millions),
        delta: deltas.map(|d| format!("{:+}", d.revenue)),
    });
    tiles
}

impl WidgetParams {
    pub fn new(bucket_days: u32, top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(DashboardError::InvalidParameter(
                "top_n must be at least 1".to_string(),
            ));
        }
        Ok(WidgetParams {
            bucket: BucketWidth::days(bucket_days)?,
            top_n,
        })
    }
}
