use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{DashboardConfig, Variant};
use crate::downloader;
use crate::error::DashboardError;
use crate::refresh::{RefreshDriver, RefreshPolicy, Snapshot};
use crate::widgets::{WidgetGraph, WidgetKind, WidgetParams, metric_tiles};

const MAX_BUCKET_DAYS: u32 = 366;
const MAX_TOP_N: usize = 50;

pub struct AppState {
    config: DashboardConfig,
    driver: RefreshDriver,
    widgets: WidgetGraph,
    seen_generation: AtomicU64,
}

impl AppState {
    pub fn new(config: DashboardConfig, driver: RefreshDriver) -> Self {
        AppState {
            config,
            driver,
            widgets: WidgetGraph::new(),
            seen_generation: AtomicU64::new(0),
        }
    }

    /// Driver configured for `config`'s variant and source.
    pub fn from_config(config: DashboardConfig) -> Self {
        let policy = match config.refresh_interval() {
            Some(interval) => RefreshPolicy::every(interval),
            None => RefreshPolicy::manual(),
        }
        .with_max_backoff(config.max_backoff());
        let driver = if config.variant.tracks_deltas() {
            RefreshDriver::tracking_deltas(config.source(), policy)
        } else {
            RefreshDriver::new(config.source(), policy)
        };
        Self::new(config, driver)
    }

    pub fn driver(&self) -> &RefreshDriver {
        &self.driver
    }

    pub fn widgets(&self) -> &WidgetGraph {
        &self.widgets
    }

    /// Latest snapshot; memoized widget results of older generations are
    /// dropped the first time a newer one is seen.
    fn current(&self) -> Result<Arc<Snapshot>, Response> {
        let Some(snapshot) = self.driver.snapshot() else {
            let message = self
                .driver
                .status()
                .last_error
                .unwrap_or_else(|| "data has not been loaded yet".to_string());
            return Err(status_response(StatusCode::SERVICE_UNAVAILABLE, message));
        };
        let previous = self
            .seen_generation
            .fetch_max(snapshot.generation, Ordering::AcqRel);
        if previous < snapshot.generation {
            self.widgets.retain_generation(snapshot.generation);
        }
        Ok(snapshot)
    }

    fn params_for(&self, kind: WidgetKind, query: &WidgetQuery) -> Result<WidgetParams, DashboardError> {
        let default_bucket = match kind {
            WidgetKind::VisitsByPeriod => self.config.variant.visits_bucket_days(),
            _ => 7,
        };
        let bucket_days = query.bucket_days.unwrap_or(default_bucket);
        let top_n = query.top_n.unwrap_or(self.config.top_n);
        if bucket_days > MAX_BUCKET_DAYS || top_n > MAX_TOP_N {
            return Err(DashboardError::InvalidParameter(format!(
                "bucket_days must be at most {} and top_n at most {}",
                MAX_BUCKET_DAYS, MAX_TOP_N
            )));
        }
        WidgetParams::new(bucket_days, top_n)
    }

    fn widget(&self, slug: &str) -> Result<WidgetKind, Response> {
        WidgetKind::from_slug(slug)
            .filter(|k| self.config.variant.widgets().contains(k))
            .ok_or_else(|| {
                status_response(StatusCode::NOT_FOUND, format!("no widget named `{}`", slug))
            })
    }
}

#[derive(Serialize)]
struct StatusBody {
    status: String,
    message: Option<String>,
}

fn status_response(code: StatusCode, message: impl Into<String>) -> Response {
    let status = if code.is_success() { "ok" } else { "error" };
    (
        code,
        Json(StatusBody {
            status: status.to_string(),
            message: Some(message.into()),
        }),
    )
        .into_response()
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let code = match &self {
            DashboardError::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DashboardError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status_response(code, self.to_string())
    }
}

// Malformed query strings get the same JSON error body as other bad requests
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    query
        .map(|Query(params)| params)
        .map_err(|e| status_response(StatusCode::BAD_REQUEST, e.body_text()))
}

#[derive(Deserialize, Default)]
struct WidgetQuery {
    bucket_days: Option<u32>,
    top_n: Option<usize>,
}

#[derive(Deserialize)]
struct RawQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

#[derive(Serialize)]
struct WidgetInfo {
    slug: &'static str,
    title: &'static str,
    chart_url: String,
    data_url: String,
}

#[derive(Serialize)]
struct LayoutResponse {
    title: &'static str,
    variant: Variant,
    widgets: Vec<WidgetInfo>,
    raw_row_limit: usize,
    refresh_interval_secs: Option<u64>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/api/layout", get(get_layout))
        .route("/api/summary", get(get_summary))
        .route("/api/raw", get(get_raw))
        .route("/api/raw/export", get(export_raw))
        .route("/api/widgets/:widget", get(get_widget_data))
        .route("/charts/:widget", get(get_widget_chart))
        .route("/api/refresh", post(trigger_refresh))
        .route("/api/status", get(get_status))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn run(config: DashboardConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let bind = config.bind.clone();
    let state = Arc::new(AppState::from_config(config));

    // Start the refresh loop; it performs the initial load
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = state.driver().spawn(shutdown_rx);

    let app = router(Arc::clone(&state));

    // Start server
    let listener = TcpListener::bind(&bind).await?;
    info!(
        "Foot Traffic Dashboard ({:?}, {}) listening on http://{}",
        state.config.variant,
        state.driver().source(),
        bind
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let _ = shutdown_tx.send(true);
    refresher.await?;
    info!("dashboard stopped");
    Ok(())
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(include_str!("./static/dashboard.html"))
}

async fn get_layout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let widgets = state
        .config
        .variant
        .widgets()
        .iter()
        .map(|k| WidgetInfo {
            slug: k.slug(),
            title: k.title(),
            chart_url: format!("/charts/{}", k.slug()),
            data_url: format!("/api/widgets/{}", k.slug()),
        })
        .collect();

    Json(LayoutResponse {
        title: "Foot Traffic Dashboard",
        variant: state.config.variant,
        widgets,
        raw_row_limit: state.config.raw_limit(),
        refresh_interval_secs: state.config.refresh_interval().map(|d| d.as_secs()),
    })
}

async fn get_summary(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = match state.current() {
        Ok(s) => s,
        Err(response) => return response,
    };
    let tiles = metric_tiles(
        &snapshot.summary,
        snapshot.deltas.as_ref(),
        state.config.variant.shows_store_count(),
    );
    Json(serde_json::json!({
        "generation": snapshot.generation,
        "loaded_at": snapshot.loaded_at,
        "tiles": tiles,
        "summary": snapshot.summary,
        "deltas": snapshot.deltas,
    }))
    .into_response()
}

async fn get_raw(
    query: Result<Query<RawQuery>, QueryRejection>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let params = match query_params(query) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let snapshot = match state.current() {
        Ok(s) => s,
        Err(response) => return response,
    };
    let cap = state.config.raw_limit();
    let limit = params.limit.unwrap_or(cap).min(cap);
    let rows = &snapshot.dataset.joined[..limit.min(snapshot.dataset.joined.len())];

    Json(serde_json::json!({
        "generation": snapshot.generation,
        "total_rows": snapshot.dataset.joined.len(),
        "rows": rows,
    }))
    .into_response()
}

async fn export_raw(
    query: Result<Query<ExportQuery>, QueryRejection>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let params = match query_params(query) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let snapshot = match state.current() {
        Ok(s) => s,
        Err(response) => return response,
    };
    let joined = &snapshot.dataset.joined;

    match params.format.as_deref().unwrap_or("csv") {
        "csv" => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"visits.csv\""),
            ],
            downloader::to_csv(joined),
        )
            .into_response(),
        "xlsx" => match downloader::to_xlsx(joined) {
            Ok(bytes) => (
                [
                    (
                        header::CONTENT_TYPE,
                        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                    ),
                    (header::CONTENT_DISPOSITION, "attachment; filename=\"visits.xlsx\""),
                ],
                bytes,
            )
                .into_response(),
            Err(e) => e.into_response(),
        },
        other => status_response(
            StatusCode::BAD_REQUEST,
            format!("unsupported export format `{}`", other),
        ),
    }
}

async fn get_widget_data(
    Path(slug): Path<String>,
    query: Result<Query<WidgetQuery>, QueryRejection>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let kind = match state.widget(&slug) {
        Ok(k) => k,
        Err(response) => return response,
    };
    let query = match query_params(query) {
        Ok(q) => q,
        Err(response) => return response,
    };
    let params = match state.params_for(kind, &query) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let snapshot = match state.current() {
        Ok(s) => s,
        Err(response) => return response,
    };

    let data = state
        .widgets
        .data(snapshot.generation, &snapshot.dataset, kind, params);
    Json(serde_json::json!({
        "widget": kind,
        "title": kind.title(),
        "generation": snapshot.generation,
        "result": &*data,
    }))
    .into_response()
}

async fn get_widget_chart(
    Path(slug): Path<String>,
    query: Result<Query<WidgetQuery>, QueryRejection>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let kind = match state.widget(&slug) {
        Ok(k) => k,
        Err(response) => return response,
    };
    let query = match query_params(query) {
        Ok(q) => q,
        Err(response) => return response,
    };
    let params = match state.params_for(kind, &query) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let snapshot = match state.current() {
        Ok(s) => s,
        Err(response) => return response,
    };

    match state
        .widgets
        .chart(snapshot.generation, &snapshot.dataset, kind, params)
    {
        Ok(svg) => (
            [
                (header::CONTENT_TYPE, "image/svg+xml"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            (*svg).clone(),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn trigger_refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let outcome = state.driver.trigger();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": outcome })),
    )
}

async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.driver.status())
}
