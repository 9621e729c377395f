#![cfg(feature = "web")]
use plotters::coord::Shift;
use plotters::prelude::*;
use std::f64::consts::PI;

use crate::error::{DashboardError, Result};
use crate::metrics::{CategoryCount, MapPoint};

/// Chart kinds the dashboard can draw
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphType {
    /// Line graph - one line per series over ordered buckets
    Line,

    /// Area graph - like a line graph with the area below each line filled in
    Area,

    /// Bar graph - vertical bars, one per category
    Bar,

    /// Horizontal bar graph - categories on the Y axis
    HorizontalBar,

    /// Donut chart - category shares as ring segments
    Pie,

    /// Point map - store coordinates on a longitude/latitude plane
    Map,
}

/// Configuration options for graph generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the graph
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,

    /// Type of graph to generate
    pub graph_type: GraphType,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            x_label: String::new(),
            y_label: String::new(),
            width: 800,
            height: 400,
            graph_type: GraphType::Line,
        }
    }
}

impl GraphOptions {
    pub fn new(title: impl Into<String>, graph_type: GraphType) -> Self {
        Self {
            title: title.into(),
            graph_type,
            ..Self::default()
        }
    }

    pub fn labels(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }
}

/// A named sequence of values, one per bucket label.
#[derive(Clone, Debug)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

fn render_err<E: std::fmt::Display>(e: E) -> DashboardError {
    DashboardError::Render(e.to_string())
}

fn series_color(index: usize) -> RGBColor {
    const COLORS: [RGBColor; 4] = [
        RGBColor(31, 119, 180),
        RGBColor(255, 127, 14),
        RGBColor(44, 160, 44),
        RGBColor(214, 39, 40),
    ];
    COLORS[index % COLORS.len()]
}

/// Renders a line or area chart of one or more series to SVG.
///
/// `labels` names the buckets along the X axis; every series must have one
/// value per label.
///
/// # Errors
/// * `InvalidParameter` if a series length differs from the label count
/// * `InvalidParameter` if the graph type is not `Line` or `Area`
pub fn render_series(labels: &[String], series: &[Series], options: &GraphOptions) -> Result<String> {
    if let Some(s) = series.iter().find(|s| s.values.len() != labels.len()) {
        return Err(DashboardError::InvalidParameter(format!(
            "series `{}` has {} values for {} labels",
            s.name,
            s.values.len(),
            labels.len()
        )));
    }
    if !matches!(options.graph_type, GraphType::Line | GraphType::Area) {
        return Err(DashboardError::InvalidParameter(
            "series charts must be line or area charts".to_string(),
        ));
    }

    let max_x = labels.len().max(1) as i32;
    let max_y = series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .fold(0.0f64, f64::max);
    let y_top = if max_y > 0.0 { max_y * 1.1 } else { 1.0 };

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 24).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0..max_x, 0.0..y_top)
            .map_err(render_err)?;

        let label_at = |x: &i32| {
            usize::try_from(*x)
                .ok()
                .and_then(|i| labels.get(i))
                .cloned()
                .unwrap_or_default()
        };
        chart
            .configure_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .x_labels(labels.len().clamp(1, 12))
            .x_label_formatter(&label_at)
            .draw()
            .map_err(render_err)?;

        for (i, s) in series.iter().enumerate() {
            let color = series_color(i);
            let points = s.values.iter().enumerate().map(|(x, y)| (x as i32, *y));
            let drawn = match options.graph_type {
                GraphType::Area => chart
                    .draw_series(
                        AreaSeries::new(points, 0.0, color.mix(0.3)).border_style(color),
                    )
                    .map_err(render_err)?,
                _ => chart
                    .draw_series(LineSeries::new(points, color.stroke_width(2)))
                    .map_err(render_err)?,
            };
            drawn.label(s.name.clone()).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
        }

        if series.len() > 1 {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(render_err)?;
        }

        root.present().map_err(render_err)?;
    }

    Ok(svg)
}

/// Renders category counts as a vertical bar, horizontal bar or donut chart.
///
/// Categories are drawn in the given order.
pub fn render_categories(data: &[CategoryCount], options: &GraphOptions) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        match options.graph_type {
            GraphType::Bar => draw_bars(&root, data, options, false)?,
            GraphType::HorizontalBar => draw_bars(&root, data, options, true)?,
            GraphType::Pie => draw_donut(&root, data, options, 0.4)?,
            _ => {
                return Err(DashboardError::InvalidParameter(
                    "category charts must be bar or pie charts".to_string(),
                ));
            }
        }

        root.present().map_err(render_err)?;
    }
    Ok(svg)
}

fn draw_bars(
    root: &DrawingArea<SVGBackend<'_>, Shift>,
    data: &[CategoryCount],
    options: &GraphOptions,
    horizontal: bool,
) -> Result<()> {
    let n = data.len().max(1) as i32;
    let max_count = data.iter().map(|c| c.count).max().unwrap_or(0) as f64;
    let top = if max_count > 0.0 { max_count * 1.1 } else { 1.0 };

    let category = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => usize::try_from(*i)
            .ok()
            .and_then(|i| data.get(i))
            .map(|c| c.key.clone())
            .unwrap_or_default(),
        SegmentValue::Last => String::new(),
    };

    let mut builder = ChartBuilder::on(root);
    builder
        .caption(&options.title, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(if horizontal { 120 } else { 60 });

    if horizontal {
        let mut chart = builder
            .build_cartesian_2d(0.0..top, (0..n).into_segmented())
            .map_err(render_err)?;
        chart
            .configure_mesh()
            .disable_y_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .y_labels(n as usize)
            .y_label_formatter(&category)
            .draw()
            .map_err(render_err)?;
        chart
            .draw_series(
                Histogram::horizontal(&chart)
                    .style(series_color(0).filled())
                    .margin(4)
                    .data(data.iter().enumerate().map(|(i, c)| (i as i32, c.count as f64))),
            )
            .map_err(render_err)?;
    } else {
        let mut chart = builder
            .build_cartesian_2d((0..n).into_segmented(), 0.0..top)
            .map_err(render_err)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .x_labels(n as usize)
            .x_label_formatter(&category)
            .draw()
            .map_err(render_err)?;
        chart
            .draw_series(
                Histogram::vertical(&chart)
                    .style(series_color(0).filled())
                    .margin(8)
                    .data(data.iter().enumerate().map(|(i, c)| (i as i32, c.count as f64))),
            )
            .map_err(render_err)?;
    }
    Ok(())
}

fn draw_donut(
    root: &DrawingArea<SVGBackend<'_>, Shift>,
    data: &[CategoryCount],
    options: &GraphOptions,
    hole: f64,
) -> Result<()> {
    let area = root
        .titled(&options.title, ("sans-serif", 24).into_font())
        .map_err(render_err)?;
    let (width, height) = area.dim_in_pixel();
    let legend_width = (width / 3) as i32;
    let radius = (((width as i32 - legend_width).min(height as i32)) / 2 - 10).max(10) as f64;
    let center = ((width as i32 - legend_width) / 2, height as i32 / 2);
    let total: usize = data.iter().map(|c| c.count).sum();

    if total == 0 {
        area.draw(&Text::new(
            "No data",
            (center.0 - 30, center.1),
            ("sans-serif", 18).into_font(),
        ))
        .map_err(render_err)?;
        return Ok(());
    }

    // Start at twelve o'clock and run clockwise
    let mut start = -PI / 2.0;
    for (i, c) in data.iter().enumerate() {
        let sweep = 2.0 * PI * c.count as f64 / total as f64;
        let points = ring_segment(center, radius, radius * hole, start, start + sweep);
        area.draw(&Polygon::new(points, Palette99::pick(i).filled()))
            .map_err(render_err)?;
        start += sweep;

        let y = 20 + i as i32 * 22;
        let x = width as i32 - legend_width + 10;
        area.draw(&Rectangle::new([(x, y), (x + 14, y + 14)], Palette99::pick(i).filled()))
            .map_err(render_err)?;
        let share = 100.0 * c.count as f64 / total as f64;
        area.draw(&Text::new(
            format!("{} ({:.1}%)", c.key, share),
            (x + 20, y),
            ("sans-serif", 14).into_font(),
        ))
        .map_err(render_err)?;
    }
    Ok(())
}

// Outline of an annulus sector: outer arc forwards, inner arc backwards
fn ring_segment(center: (i32, i32), outer: f64, inner: f64, from: f64, to: f64) -> Vec<(i32, i32)> {
    let steps = (((to - from) / (PI / 90.0)).ceil() as usize).max(1);
    let at = |r: f64, a: f64| {
        (
            center.0 + (r * a.cos()).round() as i32,
            center.1 + (r * a.sin()).round() as i32,
        )
    };
    let mut points: Vec<(i32, i32)> = (0..=steps)
        .map(|s| at(outer, from + (to - from) * s as f64 / steps as f64))
        .collect();
    points.extend((0..=steps).rev().map(|s| at(inner, from + (to - from) * s as f64 / steps as f64)));
    points
}

/// Renders store coordinates as points on a longitude/latitude plane.
///
/// An empty point set falls back to the bounds of the contiguous US.
pub fn render_map(points: &[MapPoint], options: &GraphOptions) -> Result<String> {
    let (mut lon_min, mut lon_max, mut lat_min, mut lat_max) = points.iter().fold(
        (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
        |(a, b, c, d), p| (a.min(p.longitude), b.max(p.longitude), c.min(p.latitude), d.max(p.latitude)),
    );
    if points.is_empty() {
        (lon_min, lon_max, lat_min, lat_max) = (-125.0, -66.0, 24.0, 50.0);
    }
    let pad_lon = ((lon_max - lon_min) * 0.05).max(1.0);
    let pad_lat = ((lat_max - lat_min) * 0.05).max(1.0);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 24).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(
                (lon_min - pad_lon)..(lon_max + pad_lon),
                (lat_min - pad_lat)..(lat_max + pad_lat),
            )
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc("Longitude")
            .y_desc("Latitude")
            .light_line_style(WHITE.mix(0.0))
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(
                points
                    .iter()
                    .map(|p| Circle::new((p.longitude, p.latitude), 4, RED.mix(0.7).filled())),
            )
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }
    Ok(svg)
}
