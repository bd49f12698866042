#![forbid(unsafe_code)]

pub mod fixtures;

use std::fs;
use std::path::{Path, PathBuf};

use fd_aggregate::{
    AggError, AggregateResult, BinnedSummary, RankedSlice, Reducer, binned_summary,
    correlation_matrix, describe, distinct_groups, group_summary, group_values, pivot_matrix,
    ranked_slice,
};
use fd_dashboard::{
    ArtifactWriter, DEFAULT_RENDERER_SRC, DashboardError, EmbedMode, Manifest, RenderOptions,
    ShellSection, SummaryTile, publish, render_page, render_shell,
};
use fd_fit::{FitCurve, FitError, fit_normal};
use fd_frame::{ColumnSlice, Dataset, FrameError};
use fd_io::IoError;
use fd_layout::{CellOptions, GridSpec, Layout, LayoutError, Theme, compose};
use fd_panel::{ChartKind, Encoding, EncodingOptions, PanelData, PanelError, build_panel};
use fd_runtime::{LogConfig, RUN_LEDGER_FILE, RunLedger, RuntimeError};
use fd_types::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SHELL_NAME: &str = "index";
const ROUTE_KEY: [&str; 2] = ["source_city", "destination_city"];
const CORRELATION_COLUMNS: [&str; 3] = ["price", "duration", "days_left"];

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Aggregate(#[from] AggError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Panel(#[from] PanelError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Dashboard(#[from] DashboardError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl SuiteError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigRead { .. } => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Parameter,
            Self::Frame(err) => err.kind(),
            Self::Aggregate(err) => err.kind(),
            Self::Fit(err) => err.kind(),
            Self::Panel(err) => err.kind(),
            Self::Layout(err) => err.kind(),
            Self::Dashboard(err) => err.kind(),
            Self::Io(err) => err.kind(),
            Self::Runtime(err) => err.kind(),
        }
    }
}

// ── Configuration ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingBins {
    pub boundaries: Vec<f64>,
    pub labels: Vec<String>,
}

impl Default for BookingBins {
    fn default() -> Self {
        Self {
            boundaries: vec![0.0, 7.0, 14.0, 30.0, 49.0],
            labels: ["1-7", "8-14", "15-30", "31-49"]
                .iter()
                .map(|l| (*l).to_owned())
                .collect(),
        }
    }
}

/// Run configuration, usually read from YAML. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub input: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub title: String,
    pub theme: Theme,
    pub booking_bins: BookingBins,
    pub top_n: i64,
    pub fit_samples: usize,
    pub histogram_bins: usize,
    /// Rows drawn into scatter panels.
    pub scatter_sample: usize,
    pub embed: EmbedMode,
    pub renderer_src: String,
    pub log: LogConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            input: None,
            output_dir: PathBuf::from("dashboards"),
            title: "Airlines Data Analysis Dashboard".to_owned(),
            theme: Theme::default(),
            booking_bins: BookingBins::default(),
            top_n: 10,
            fit_samples: 100,
            histogram_bins: 50,
            scatter_sample: 2000,
            embed: EmbedMode::Reference,
            renderer_src: DEFAULT_RENDERER_SRC.to_owned(),
            log: LogConfig::default(),
        }
    }
}

impl SuiteConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self, SuiteError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SuiteError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SuiteError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    #[must_use]
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            renderer_src: self.renderer_src.clone(),
        }
    }
}

// ── Formatting ─────────────────────────────────────────────────────────

/// `1234567` -> `"1,234,567"`.
#[must_use]
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn money(value: Option<f64>) -> String {
    value.map_or_else(
        || "n/a".to_owned(),
        |v| format!("${}", group_thousands(v.round() as i64)),
    )
}

fn one_decimal(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "n/a".to_owned(), |v| format!("{v:.1}{unit}"))
}

// ── Shared aggregates ──────────────────────────────────────────────────

/// Flight count per airline, largest first.
pub fn market_share(ds: &Dataset) -> Result<RankedSlice, SuiteError> {
    let airlines = distinct_groups(ds, &["airline"])?.max(1);
    Ok(ranked_slice(
        ds,
        &["airline"],
        "airline",
        Reducer::Count,
        airlines as i64,
        false,
    )?)
}

pub fn booking_patterns(ds: &Dataset, cfg: &SuiteConfig) -> Result<BinnedSummary, SuiteError> {
    Ok(binned_summary(
        ds,
        "days_left",
        &cfg.booking_bins.boundaries,
        &cfg.booking_bins.labels,
        "price",
        &[Reducer::Mean, Reducer::Count],
    )?)
}

fn sampled(
    ds: &Dataset,
    cfg: &SuiteConfig,
    columns: &[&str],
) -> Result<Vec<ColumnSlice>, SuiteError> {
    let positions = ds.sample_positions(cfg.scatter_sample);
    Ok(columns
        .iter()
        .map(|name| ds.slice(name, &positions))
        .collect::<Result<Vec<_>, _>>()?)
}

fn colored_points(title: &str, color: &str, opacity: f64) -> EncodingOptions {
    EncodingOptions {
        color: Some(Encoding::Column(color.to_owned())),
        colorscale: Some("Viridis".to_owned()),
        opacity: Some(opacity),
        ..EncodingOptions::titled(title)
    }
}

fn heat(title: &str, colorscale: &str) -> EncodingOptions {
    EncodingOptions {
        colorscale: Some(colorscale.to_owned()),
        ..EncodingOptions::titled(title)
    }
}

// ── Page catalog ───────────────────────────────────────────────────────

pub fn build_overview(ds: &Dataset, cfg: &SuiteConfig) -> Result<Layout, SuiteError> {
    let by_airline: AggregateResult = group_values(ds, "price", "airline")?.into();
    let routes: AggregateResult =
        pivot_matrix(ds, "source_city", "destination_city", "price", Reducer::Count)?.into();
    let points = sampled(ds, cfg, &["duration", "price"])?;
    let share: AggregateResult = market_share(ds)?.into();
    let booking: AggregateResult = booking_patterns(ds, cfg)?.into();
    let by_stops: AggregateResult = group_values(ds, "price", "stops")?.into();

    let mut grid = GridSpec::new(3, 2).with_height(1200);
    grid.place(
        1,
        1,
        build_panel(
            ds,
            ChartKind::Box,
            PanelData::Aggregate(&by_airline),
            &EncodingOptions::titled("Price Distribution by Airline"),
        )?,
    )
    .place(
        1,
        2,
        build_panel(
            ds,
            ChartKind::Heatmap,
            PanelData::Aggregate(&routes),
            &heat("Route Popularity Heatmap", "Viridis"),
        )?,
    )
    .place(
        2,
        1,
        build_panel(
            ds,
            ChartKind::Scatter,
            PanelData::Columns(&points),
            &EncodingOptions {
                x_label: Some("Duration (hours)".to_owned()),
                y_label: Some("Price".to_owned()),
                ..colored_points("Price vs Duration Analysis", "days_left", 0.6)
            },
        )?,
    )
    .place(
        2,
        2,
        build_panel(
            ds,
            ChartKind::Pie,
            PanelData::Aggregate(&share),
            &EncodingOptions::titled("Market Share by Airline"),
        )?,
    )
    .place(
        3,
        1,
        build_panel(
            ds,
            ChartKind::Bar,
            PanelData::Aggregate(&booking),
            &EncodingOptions {
                statistic: Some(Reducer::Mean),
                color: Some(Encoding::Fixed("orange".to_owned())),
                ..EncodingOptions::titled("Booking Patterns by Days Left")
            },
        )?,
    )
    .place(
        3,
        2,
        build_panel(
            ds,
            ChartKind::Violin,
            PanelData::Aggregate(&by_stops),
            &EncodingOptions::titled("Price Analysis by Stops"),
        )?,
    );
    grid.configure(1, 1, CellOptions::titled("Price Distribution by Airline"))
        .configure(1, 2, CellOptions::titled("Route Popularity Heatmap"))
        .configure(2, 1, CellOptions::titled("Price vs Duration Analysis"))
        .configure(2, 2, CellOptions::titled("Market Share by Airline"))
        .configure(3, 1, CellOptions::titled("Booking Patterns by Days Left"))
        .configure(3, 2, CellOptions::titled("Price Analysis by Stops"));

    Ok(compose(&cfg.title, grid, &cfg.theme)?)
}

/// Price histogram with a normal fit rescaled to histogram counts so both
/// share the count axis. Flight counts per day ride the trend panel's
/// secondary axis.
pub fn build_pricing(ds: &Dataset, cfg: &SuiteConfig) -> Result<Layout, SuiteError> {
    let prices = [ds.full_slice("price")?];
    let curve = fit_normal(ds, "price", cfg.fit_samples)?;
    let summary = describe(ds, "price")?;
    let span = match (summary.min.value(), summary.max.value()) {
        (Some(lo), Some(hi)) => hi - lo,
        _ => 0.0,
    };
    let bin_width = span / cfg.histogram_bins.max(1) as f64;
    let density = curve.scaled_to_histogram(curve.n, bin_width);
    let overlay = FitCurve { density, ..curve };

    let by_class: AggregateResult = group_values(ds, "price", "class")?.into();
    let trend: AggregateResult =
        group_summary(ds, "price", "days_left", &[Reducer::Mean, Reducer::Count])?.into();
    let volatility: AggregateResult =
        ranked_slice(ds, &ROUTE_KEY, "price", Reducer::Std, cfg.top_n, false)?.into();

    let mut grid = GridSpec::new(2, 2).with_height(800);
    grid.place(
        1,
        1,
        build_panel(
            ds,
            ChartKind::Histogram,
            PanelData::Columns(&prices),
            &EncodingOptions {
                name: Some("Actual".to_owned()),
                bins: Some(cfg.histogram_bins),
                opacity: Some(0.7),
                color: Some(Encoding::Fixed("lightblue".to_owned())),
                ..EncodingOptions::default()
            },
        )?,
    )
    .place(
        1,
        1,
        build_panel(
            ds,
            ChartKind::Line,
            PanelData::Fit(&overlay),
            &EncodingOptions {
                name: Some("Normal Fit".to_owned()),
                color: Some(Encoding::Fixed("red".to_owned())),
                ..EncodingOptions::default()
            },
        )?,
    )
    .configure(1, 1, CellOptions::titled("Price Distribution with Normal Fit"))
    .place(
        1,
        2,
        build_panel(
            ds,
            ChartKind::Box,
            PanelData::Aggregate(&by_class),
            &EncodingOptions::titled("Price by Class"),
        )?,
    )
    .configure(1, 2, CellOptions::titled("Price by Class"))
    .place(
        2,
        1,
        build_panel(
            ds,
            ChartKind::Line,
            PanelData::Aggregate(&trend),
            &EncodingOptions {
                name: Some("Average Price".to_owned()),
                statistic: Some(Reducer::Mean),
                x_label: Some("Days Left".to_owned()),
                ..EncodingOptions::titled("Price Trends by Days Left")
            },
        )?,
    )
    .place(
        2,
        1,
        build_panel(
            ds,
            ChartKind::Line,
            PanelData::Aggregate(&trend),
            &EncodingOptions {
                name: Some("Flights".to_owned()),
                statistic: Some(Reducer::Count),
                y_label: Some("Flights".to_owned()),
                color: Some(Encoding::Fixed("gray".to_owned())),
                ..EncodingOptions::default()
            },
        )?,
    )
    .configure(
        2,
        1,
        CellOptions {
            secondary_axis: true,
            ..CellOptions::titled("Price Trends by Days Left")
        },
    )
    .place(
        2,
        2,
        build_panel(
            ds,
            ChartKind::Bar,
            PanelData::Aggregate(&volatility),
            &EncodingOptions {
                name: Some("Price Volatility".to_owned()),
                ..EncodingOptions::titled("Price Volatility Analysis")
            },
        )?,
    )
    .configure(2, 2, CellOptions::titled("Price Volatility Analysis"));

    Ok(compose("Advanced Price Analysis", grid, &cfg.theme)?)
}

pub fn build_routes(ds: &Dataset, cfg: &SuiteConfig) -> Result<Layout, SuiteError> {
    let popular: AggregateResult =
        ranked_slice(ds, &ROUTE_KEY, "source_city", Reducer::Count, cfg.top_n, false)?.into();
    let expensive: AggregateResult =
        ranked_slice(ds, &ROUTE_KEY, "price", Reducer::Mean, cfg.top_n, false)?.into();
    let duration = group_summary(ds, "duration", "airline", &[Reducer::Mean])?;
    let price = group_summary(ds, "price", "airline", &[Reducer::Mean, Reducer::Count])?;
    let prices: AggregateResult =
        pivot_matrix(ds, "source_city", "destination_city", "price", Reducer::Mean)?.into();

    let mut grid = GridSpec::new(2, 2).with_height(800);
    grid.place(
        1,
        1,
        build_panel(
            ds,
            ChartKind::Bar,
            PanelData::Aggregate(&popular),
            &EncodingOptions {
                name: Some("Flight Count".to_owned()),
                color: Some(Encoding::Fixed("blue".to_owned())),
                ..EncodingOptions::titled("Most Popular Routes")
            },
        )?,
    )
    .place(
        1,
        2,
        build_panel(
            ds,
            ChartKind::Bar,
            PanelData::Aggregate(&expensive),
            &EncodingOptions {
                name: Some("Average Price".to_owned()),
                color: Some(Encoding::Fixed("red".to_owned())),
                ..EncodingOptions::titled("Most Expensive Routes")
            },
        )?,
    )
    .place(
        2,
        1,
        build_panel(
            ds,
            ChartKind::Scatter,
            PanelData::AggregatePair {
                x: &duration,
                y: &price,
            },
            &EncodingOptions {
                name: Some("Airline Performance".to_owned()),
                statistic: Some(Reducer::Mean),
                size: Some(Encoding::Statistic(Reducer::Count)),
                x_label: Some("Avg Duration (hours)".to_owned()),
                y_label: Some("Avg Price".to_owned()),
                ..EncodingOptions::titled("Airline Performance Comparison")
            },
        )?,
    )
    .place(
        2,
        2,
        build_panel(
            ds,
            ChartKind::Heatmap,
            PanelData::Aggregate(&prices),
            &heat("Route Price Heatmap", "Viridis"),
        )?,
    );
    grid.configure(1, 1, CellOptions::titled("Most Popular Routes"))
        .configure(1, 2, CellOptions::titled("Most Expensive Routes"))
        .configure(2, 1, CellOptions::titled("Airline Performance Comparison"))
        .configure(2, 2, CellOptions::titled("Route Price Heatmap"));

    Ok(compose("Route and Airline Analysis", grid, &cfg.theme)?)
}

pub fn build_timing(ds: &Dataset, cfg: &SuiteConfig) -> Result<Layout, SuiteError> {
    let slots = group_summary(ds, "price", "departure_time", &[Reducer::Mean, Reducer::Count])?;
    let slots: AggregateResult = slots.into();
    let points = sampled(ds, cfg, &["days_left", "duration"])?;

    let mut grid = GridSpec::new(2, 2).with_height(800);
    grid.place(
        1,
        1,
        build_panel(
            ds,
            ChartKind::Bar,
            PanelData::Aggregate(&slots),
            &EncodingOptions {
                name: Some("Flight Count".to_owned()),
                statistic: Some(Reducer::Count),
                color: Some(Encoding::Fixed("orange".to_owned())),
                ..EncodingOptions::titled("Departure Time Preferences")
            },
        )?,
    )
    .place(
        1,
        2,
        build_panel(
            ds,
            ChartKind::Bar,
            PanelData::Aggregate(&slots),
            &EncodingOptions {
                name: Some("Average Price".to_owned()),
                statistic: Some(Reducer::Mean),
                color: Some(Encoding::Fixed("green".to_owned())),
                ..EncodingOptions::titled("Price by Departure Time")
            },
        )?,
    )
    .place(
        2,
        1,
        build_panel(
            ds,
            ChartKind::Scatter,
            PanelData::Columns(&points),
            &EncodingOptions {
                x_label: Some("Days Left".to_owned()),
                y_label: Some("Duration (hours)".to_owned()),
                ..colored_points("Duration vs Days Left", "price", 0.5)
            },
        )?,
    )
    .place(
        2,
        2,
        build_panel(
            ds,
            ChartKind::Line,
            PanelData::Aggregate(&slots),
            &EncodingOptions {
                name: Some("Price Trend".to_owned()),
                statistic: Some(Reducer::Mean),
                color: Some(Encoding::Fixed("purple".to_owned())),
                ..EncodingOptions::titled("Time-based Price Trends")
            },
        )?,
    );
    grid.configure(1, 1, CellOptions::titled("Departure Time Preferences"))
        .configure(1, 2, CellOptions::titled("Price by Departure Time"))
        .configure(2, 1, CellOptions::titled("Duration vs Days Left"))
        .configure(2, 2, CellOptions::titled("Time-based Price Trends"));

    Ok(compose("Time Analysis Dashboard", grid, &cfg.theme)?)
}

pub fn build_statistics(ds: &Dataset, cfg: &SuiteConfig) -> Result<Layout, SuiteError> {
    let correlation: AggregateResult = correlation_matrix(ds, &CORRELATION_COLUMNS)?.into();
    let by_stops: AggregateResult = group_values(ds, "price", "stops")?.into();
    let share: AggregateResult = market_share(ds)?.into();
    let revenue: AggregateResult = group_summary(ds, "price", "airline", &[Reducer::Sum])?.into();

    let mut grid = GridSpec::new(2, 2).with_height(800);
    grid.place(
        1,
        1,
        build_panel(
            ds,
            ChartKind::Heatmap,
            PanelData::Aggregate(&correlation),
            &heat("Correlation Matrix Heatmap", "RdBu"),
        )?,
    )
    .place(
        1,
        2,
        build_panel(
            ds,
            ChartKind::Box,
            PanelData::Aggregate(&by_stops),
            &EncodingOptions::titled("Price Distribution by Stops"),
        )?,
    )
    .place(
        2,
        1,
        build_panel(
            ds,
            ChartKind::Pie,
            PanelData::Aggregate(&share),
            &EncodingOptions::titled("Market Share Analysis"),
        )?,
    )
    .place(
        2,
        2,
        build_panel(
            ds,
            ChartKind::Bar,
            PanelData::Aggregate(&revenue),
            &EncodingOptions {
                name: Some("Total Revenue".to_owned()),
                color: Some(Encoding::Fixed("green".to_owned())),
                ..EncodingOptions::titled("Revenue Analysis by Airline")
            },
        )?,
    );
    grid.configure(1, 1, CellOptions::titled("Correlation Matrix Heatmap"))
        .configure(1, 2, CellOptions::titled("Price Distribution by Stops"))
        .configure(2, 1, CellOptions::titled("Market Share Analysis"))
        .configure(2, 2, CellOptions::titled("Revenue Analysis by Airline"));

    Ok(compose("Advanced Statistical Analysis", grid, &cfg.theme)?)
}

pub fn build_heatmaps(ds: &Dataset, cfg: &SuiteConfig) -> Result<Layout, SuiteError> {
    let specs = [
        ("price", Reducer::Mean, "Price Heatmap by Route", "Viridis"),
        ("duration", Reducer::Mean, "Duration Heatmap by Route", "Plasma"),
        ("price", Reducer::Count, "Flight Count Heatmap by Route", "Blues"),
        ("days_left", Reducer::Mean, "Days Left Heatmap by Route", "Reds"),
    ];
    let mut grid = GridSpec::new(2, 2).with_height(800);
    for (i, (value, reducer, title, colorscale)) in specs.into_iter().enumerate() {
        let (row, col) = (i / 2 + 1, i % 2 + 1);
        let pivot: AggregateResult =
            pivot_matrix(ds, "source_city", "destination_city", value, reducer)?.into();
        grid.place(
            row,
            col,
            build_panel(
                ds,
                ChartKind::Heatmap,
                PanelData::Aggregate(&pivot),
                &heat(title, colorscale),
            )?,
        )
        .configure(row, col, CellOptions::titled(title));
    }
    Ok(compose("Advanced Route Analysis Heatmaps", grid, &cfg.theme)?)
}

pub fn build_explorer(ds: &Dataset, cfg: &SuiteConfig) -> Result<Layout, SuiteError> {
    let points = sampled(ds, cfg, &["price", "duration", "days_left"])?;
    let mut grid = GridSpec::new(1, 1).with_height(700);
    grid.place(
        1,
        1,
        build_panel(
            ds,
            ChartKind::Scatter3d,
            PanelData::Columns(&points),
            &EncodingOptions {
                color: Some(Encoding::Column("airline".to_owned())),
                opacity: Some(0.7),
                ..EncodingOptions::titled("Price vs Duration vs Days Left")
            },
        )?,
    );
    Ok(compose("3D Analysis: Price vs Duration vs Days Left", grid, &cfg.theme)?)
}

/// `(metric, value)` rows of the summary table.
pub fn summary_metrics(ds: &Dataset) -> Result<Vec<(String, String)>, SuiteError> {
    let price = describe(ds, "price")?;
    let duration = describe(ds, "duration")?;
    let routes = distinct_groups(ds, &ROUTE_KEY)?;
    let airlines = distinct_groups(ds, &["airline"])?;

    let popular = ranked_slice(ds, &ROUTE_KEY, "source_city", Reducer::Count, 1, false)?;
    let popular = popular.entries.first().map_or_else(
        || "n/a".to_owned(),
        |entry| {
            entry
                .key
                .0
                .iter()
                .map(|k| k.label())
                .collect::<Vec<_>>()
                .join(" → ")
        },
    );
    let share = market_share(ds)?;
    let leader = share.entries.first().map_or_else(
        || "n/a".to_owned(),
        |entry| {
            let pct = entry.value / ds.len().max(1) as f64 * 100.0;
            format!("{} ({pct:.1}%)", entry.key.label())
        },
    );
    let range = match (price.min.value(), price.max.value()) {
        (Some(lo), Some(hi)) => format!("{} - {}", money(Some(lo)), money(Some(hi))),
        _ => "n/a".to_owned(),
    };

    Ok(vec![
        ("Total Flights".to_owned(), group_thousands(ds.len() as i64)),
        ("Total Airlines".to_owned(), airlines.to_string()),
        ("Total Routes".to_owned(), routes.to_string()),
        ("Average Price".to_owned(), money(price.mean.value())),
        ("Median Price".to_owned(), money(price.median.value())),
        ("Price Range".to_owned(), range),
        (
            "Average Duration".to_owned(),
            one_decimal(duration.mean.value(), " hours"),
        ),
        ("Most Popular Route".to_owned(), popular),
        ("Market Leader".to_owned(), leader),
    ])
}

pub fn build_summary_table(ds: &Dataset, cfg: &SuiteConfig) -> Result<Layout, SuiteError> {
    let header = vec!["Metric".to_owned(), "Value".to_owned()];
    let rows: Vec<Vec<String>> = summary_metrics(ds)?
        .into_iter()
        .map(|(metric, value)| vec![metric, value])
        .collect();
    let mut grid = GridSpec::new(1, 1).with_height(500);
    grid.place(
        1,
        1,
        build_panel(
            ds,
            ChartKind::Table,
            PanelData::Table {
                header: &header,
                rows: &rows,
            },
            &EncodingOptions::default(),
        )?,
    );
    Ok(compose("Dataset Summary Statistics", grid, &cfg.theme)?)
}

pub type PageBuilder = fn(&Dataset, &SuiteConfig) -> Result<Layout, SuiteError>;

#[derive(Debug, Clone, Copy)]
pub struct PageEntry {
    /// Artifact name and shell section id.
    pub name: &'static str,
    pub label: &'static str,
    pub build: PageBuilder,
}

/// Pages in shell order.
pub const PAGES: [PageEntry; 8] = [
    PageEntry {
        name: "overview",
        label: "Overview",
        build: build_overview,
    },
    PageEntry {
        name: "pricing",
        label: "Pricing Analysis",
        build: build_pricing,
    },
    PageEntry {
        name: "routes",
        label: "Routes & Airlines",
        build: build_routes,
    },
    PageEntry {
        name: "timing",
        label: "Time Analysis",
        build: build_timing,
    },
    PageEntry {
        name: "statistics",
        label: "Statistics",
        build: build_statistics,
    },
    PageEntry {
        name: "heatmaps",
        label: "Route Heatmaps",
        build: build_heatmaps,
    },
    PageEntry {
        name: "explorer",
        label: "3D Explorer",
        build: build_explorer,
    },
    PageEntry {
        name: "summary",
        label: "Summary",
        build: build_summary_table,
    },
];

// ── Shell ──────────────────────────────────────────────────────────────

/// Header tiles for the shell, computed once per run.
pub fn summary_tiles(ds: &Dataset) -> Result<Vec<SummaryTile>, SuiteError> {
    let airlines = distinct_groups(ds, &["airline"])?;
    let routes = distinct_groups(ds, &ROUTE_KEY)?;
    let price = describe(ds, "price")?;
    let duration = describe(ds, "duration")?;
    let days_left = describe(ds, "days_left")?;

    Ok(vec![
        SummaryTile::new("Total Flights", group_thousands(ds.len() as i64)),
        SummaryTile::new("Airlines", airlines.to_string()),
        SummaryTile::new("Routes", routes.to_string()),
        SummaryTile::new("Average Price", money(price.mean.value())),
        SummaryTile::new("Avg Duration", one_decimal(duration.mean.value(), "h")),
        SummaryTile::new(
            "Avg Days Left",
            days_left
                .mean
                .value()
                .map_or_else(|| "n/a".to_owned(), |v| format!("{v:.0}")),
        ),
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuiteReport {
    pub manifest: Manifest,
    pub ledger: RunLedger,
}

/// Build every page, the shell and the manifest into `cfg.output_dir`.
pub fn run_suite(ds: &Dataset, cfg: &SuiteConfig) -> Result<SuiteReport, SuiteError> {
    tracing::info!(
        rows = ds.len(),
        out = %cfg.output_dir.display(),
        pages = PAGES.len(),
        "dashboard run started"
    );
    let mut ledger = RunLedger::new();
    let render = cfg.render_options();

    let mut pages = Vec::with_capacity(PAGES.len());
    for entry in &PAGES {
        let layout = ledger.time(&format!("build:{}", entry.name), || (entry.build)(ds, cfg))?;
        pages.push(render_page(entry.name, &layout, &render)?);
    }

    let tiles = ledger.time("tiles", || summary_tiles(ds))?;
    let sections: Vec<ShellSection<'_>> = PAGES
        .iter()
        .zip(&pages)
        .map(|(entry, page)| ShellSection {
            id: entry.name,
            label: entry.label,
            page,
        })
        .collect();
    let subtitle = format!(
        "Analysis of {} flight records",
        group_thousands(ds.len() as i64)
    );
    let shell = render_shell(SHELL_NAME, &cfg.title, &subtitle, &sections, &tiles, cfg.embed)?;

    let writer = ArtifactWriter::new(&cfg.output_dir);
    let manifest = ledger.time("publish", || publish(&writer, &pages, Some(&shell)))?;
    writer.write_file("run_ledger", RUN_LEDGER_FILE, ledger.to_json()?.as_bytes())?;

    tracing::info!(
        artifacts = manifest.artifacts.len(),
        elapsed_ms = ledger.total_ms(),
        "dashboard run finished"
    );
    Ok(SuiteReport { manifest, ledger })
}
