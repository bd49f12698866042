#![forbid(unsafe_code)]

use std::fmt;

use fd_aggregate::{AggregateResult, Cell, GroupSummary, RankedSlice, Reducer};
use fd_fit::FitCurve;
use fd_frame::{ColumnSlice, Dataset, FrameError};
use fd_types::{ErrorKind, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Histogram,
    Box,
    Violin,
    Bar,
    Line,
    Scatter,
    Heatmap,
    Pie,
    Table,
    Scatter3d,
}

impl ChartKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Histogram => "histogram",
            Self::Box => "box",
            Self::Violin => "violin",
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Scatter => "scatter",
            Self::Heatmap => "heatmap",
            Self::Pie => "pie",
            Self::Table => "table",
            Self::Scatter3d => "scatter3d",
        }
    }

    /// Cell geometry a panel of this kind must be placed in.
    #[must_use]
    pub fn geometry(self) -> Geometry {
        match self {
            Self::Pie => Geometry::Domain,
            Self::Table => Geometry::Table,
            Self::Scatter3d => Geometry::Scene,
            Self::Histogram
            | Self::Box
            | Self::Violin
            | Self::Bar
            | Self::Line
            | Self::Scatter
            | Self::Heatmap => Geometry::Xy,
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinate system of a layout cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    Xy,
    Domain,
    Scene,
    Table,
}

impl Geometry {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xy => "xy",
            Self::Domain => "domain",
            Self::Scene => "scene",
            Self::Table => "table",
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PanelError {
    #[error("{kind} panel cannot be built from {data}: {reason}")]
    ShapeMismatch {
        kind: ChartKind,
        data: &'static str,
        reason: String,
    },
    #[error("{what} lengths differ: {left} vs {right}")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },
    #[error("encoding references unknown column or statistic {name:?}")]
    UnknownEncodingColumn { name: String },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl PanelError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ShapeMismatch { .. } | Self::LengthMismatch { .. } => ErrorKind::Shape,
            Self::UnknownEncodingColumn { .. } => ErrorKind::Schema,
            Self::Frame(err) => err.kind(),
        }
    }
}

/// Input handed to `build_panel`.
#[derive(Debug, Clone, Copy)]
pub enum PanelData<'a> {
    Aggregate(&'a AggregateResult),
    /// Two summaries over the same keys, plotted against each other.
    AggregatePair {
        x: &'a GroupSummary,
        y: &'a GroupSummary,
    },
    Fit(&'a FitCurve),
    /// Raw column slices taken at the same row positions.
    Columns(&'a [ColumnSlice]),
    Labeled {
        labels: &'a [String],
        values: &'a [f64],
    },
    Table {
        header: &'a [String],
        rows: &'a [Vec<String>],
    },
}

impl PanelData<'_> {
    #[must_use]
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Aggregate(result) => result.shape_name(),
            Self::AggregatePair { .. } => "group_summary_pair",
            Self::Fit(_) => "fit_curve",
            Self::Columns(_) => "column_slices",
            Self::Labeled { .. } => "labeled_values",
            Self::Table { .. } => "table_rows",
        }
    }
}

/// Where a color or size channel takes its values from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Encoding {
    Column(String),
    Statistic(Reducer),
    Fixed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingOptions {
    pub title: Option<String>,
    /// Trace name shown in the legend.
    pub name: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    /// Statistic plotted from an aggregate; defaults to its first reducer.
    pub statistic: Option<Reducer>,
    pub color: Option<Encoding>,
    pub size: Option<Encoding>,
    pub colorscale: Option<String>,
    pub bins: Option<usize>,
    pub opacity: Option<f64>,
}

impl EncodingOptions {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AxisValue {
    Number(f64),
    Text(String),
}

impl AxisValue {
    #[must_use]
    pub fn from_scalar(value: &Scalar) -> Option<Self> {
        if value.is_missing() {
            return None;
        }
        match value {
            Scalar::Int64(v) => Some(Self::Number(*v as f64)),
            Scalar::Float64(v) => Some(Self::Number(*v)),
            Scalar::Utf8(v) => Some(Self::Text(v.clone())),
            Scalar::Null(_) => None,
        }
    }
}

/// An encoding after its source has been looked up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BoundEncoding {
    Column {
        column: String,
        values: Vec<Option<AxisValue>>,
    },
    Statistic {
        statistic: Reducer,
        values: Vec<Option<f64>>,
    },
    Fixed {
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionGroup {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum PanelBody {
    Histogram {
        values: Vec<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bins: Option<usize>,
    },
    Distribution {
        groups: Vec<DistributionGroup>,
    },
    Categorical {
        labels: Vec<String>,
        values: Vec<Option<f64>>,
    },
    Series {
        x: Vec<Option<AxisValue>>,
        y: Vec<Option<f64>>,
    },
    Points {
        x: Vec<Option<f64>>,
        y: Vec<Option<f64>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<Vec<String>>,
    },
    Grid {
        x: Vec<String>,
        y: Vec<String>,
        /// Row-major; `None` cells render blank.
        z: Vec<Vec<Option<f64>>>,
    },
    Slices {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Points3d {
        x: Vec<Option<f64>>,
        y: Vec<Option<f64>>,
        z: Vec<Option<f64>>,
    },
}

/// Renderable description of one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub kind: ChartKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<BoundEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<BoundEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorscale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    pub body: PanelBody,
}

impl Panel {
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.kind.geometry()
    }
}

/// Fixed-point rendering for table cells: integers without decimals,
/// everything else with two.
#[must_use]
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn cell_values(cells: &[Cell]) -> Vec<Option<f64>> {
    cells.iter().map(|c| c.value()).collect()
}

fn mismatch(kind: ChartKind, data: &PanelData<'_>, reason: impl Into<String>) -> PanelError {
    PanelError::ShapeMismatch {
        kind,
        data: data.shape_name(),
        reason: reason.into(),
    }
}

fn choose_statistic(
    requested: Option<Reducer>,
    available: &[Reducer],
) -> Result<Reducer, PanelError> {
    match requested {
        Some(reducer) if available.contains(&reducer) => Ok(reducer),
        Some(reducer) => Err(PanelError::UnknownEncodingColumn {
            name: reducer.as_str().to_owned(),
        }),
        None => available
            .first()
            .copied()
            .ok_or_else(|| PanelError::UnknownEncodingColumn {
                name: "<none>".to_owned(),
            }),
    }
}

fn summary_statistic(
    summary: &GroupSummary,
    requested: Option<Reducer>,
) -> Result<Vec<Option<f64>>, PanelError> {
    let reducer = choose_statistic(requested, &summary.reducers)?;
    summary
        .statistic(reducer)
        .map(|cells| cell_values(&cells))
        .ok_or_else(|| PanelError::UnknownEncodingColumn {
            name: reducer.as_str().to_owned(),
        })
}

fn ranked_values(
    slice: &RankedSlice,
    requested: Option<Reducer>,
) -> Result<Vec<f64>, PanelError> {
    choose_statistic(requested, &[slice.reducer])?;
    Ok(slice.values())
}

fn numeric_slices(
    kind: ChartKind,
    data: &PanelData<'_>,
    slices: &[ColumnSlice],
    expected: usize,
) -> Result<Vec<Vec<Option<f64>>>, PanelError> {
    if slices.len() != expected {
        return Err(mismatch(
            kind,
            data,
            format!("expected {expected} column slice(s), got {}", slices.len()),
        ));
    }
    let mut out = Vec::with_capacity(expected);
    for slice in slices {
        let numbers = slice.numbers().ok_or_else(|| {
            mismatch(
                kind,
                data,
                format!("column {:?} is not numeric", slice.name),
            )
        })?;
        if let Some(first) = out.first() {
            let first: &Vec<Option<f64>> = first;
            if first.len() != numbers.len() {
                return Err(PanelError::LengthMismatch {
                    what: "column slice",
                    left: first.len(),
                    right: numbers.len(),
                });
            }
        }
        out.push(numbers);
    }
    Ok(out)
}

fn check_slice_values(labels: &[String], values: &[f64]) -> Result<(), PanelError> {
    if labels.len() != values.len() {
        return Err(PanelError::LengthMismatch {
            what: "label/value",
            left: labels.len(),
            right: values.len(),
        });
    }
    Ok(())
}

fn pie_values(
    kind: ChartKind,
    data: &PanelData<'_>,
    values: &[Option<f64>],
) -> Result<Vec<f64>, PanelError> {
    values
        .iter()
        .map(|v| match v {
            Some(x) if *x >= 0.0 => Ok(*x),
            Some(x) => Err(mismatch(kind, data, format!("negative slice value {x}"))),
            None => Err(mismatch(kind, data, "undefined slice value")),
        })
        .collect()
}

fn build_body(
    kind: ChartKind,
    data: &PanelData<'_>,
    options: &EncodingOptions,
) -> Result<PanelBody, PanelError> {
    use AggregateResult as A;

    let body = match (kind, data) {
        (ChartKind::Histogram, PanelData::Columns(slices)) => {
            let mut numbers = numeric_slices(kind, data, slices, 1)?;
            PanelBody::Histogram {
                values: numbers.remove(0).into_iter().flatten().collect(),
                bins: options.bins,
            }
        }
        (ChartKind::Box | ChartKind::Violin, PanelData::Aggregate(A::GroupedValues(g))) => {
            PanelBody::Distribution {
                groups: g
                    .groups
                    .iter()
                    .map(|group| DistributionGroup {
                        name: group.key.label(),
                        values: group.values.clone(),
                    })
                    .collect(),
            }
        }
        (ChartKind::Box | ChartKind::Violin, PanelData::Columns(slices)) => {
            let mut numbers = numeric_slices(kind, data, slices, 1)?;
            PanelBody::Distribution {
                groups: vec![DistributionGroup {
                    name: slices[0].name.clone(),
                    values: numbers.remove(0).into_iter().flatten().collect(),
                }],
            }
        }
        (ChartKind::Bar, PanelData::Aggregate(A::GroupSummary(s))) => PanelBody::Categorical {
            labels: s.labels(),
            values: summary_statistic(s, options.statistic)?,
        },
        (ChartKind::Bar, PanelData::Aggregate(A::BinnedSummary(b))) => {
            let reducer = choose_statistic(options.statistic, &b.reducers)?;
            PanelBody::Categorical {
                labels: b.labels(),
                values: b
                    .statistic(reducer)
                    .map(|cells| cell_values(&cells))
                    .unwrap_or_default(),
            }
        }
        (ChartKind::Bar, PanelData::Aggregate(A::RankedSlice(r))) => PanelBody::Categorical {
            labels: r.labels(),
            values: ranked_values(r, options.statistic)?
                .into_iter()
                .map(Some)
                .collect(),
        },
        (ChartKind::Bar, PanelData::Labeled { labels, values }) => {
            check_slice_values(labels, values)?;
            PanelBody::Categorical {
                labels: labels.to_vec(),
                values: values.iter().copied().map(Some).collect(),
            }
        }
        (ChartKind::Line, PanelData::Aggregate(A::GroupSummary(s))) => PanelBody::Series {
            x: s.keys().map(AxisValue::from_scalar).collect(),
            y: summary_statistic(s, options.statistic)?,
        },
        (ChartKind::Line, PanelData::Aggregate(A::BinnedSummary(b))) => {
            let reducer = choose_statistic(options.statistic, &b.reducers)?;
            PanelBody::Series {
                x: b.labels().into_iter().map(|l| Some(AxisValue::Text(l))).collect(),
                y: b
                    .statistic(reducer)
                    .map(|cells| cell_values(&cells))
                    .unwrap_or_default(),
            }
        }
        (ChartKind::Line, PanelData::Fit(curve)) => PanelBody::Series {
            x: curve.x.iter().map(|v| Some(AxisValue::Number(*v))).collect(),
            y: curve.density.iter().copied().map(Some).collect(),
        },
        (ChartKind::Line, PanelData::Labeled { labels, values }) => {
            check_slice_values(labels, values)?;
            PanelBody::Series {
                x: labels.iter().map(|l| Some(AxisValue::Text(l.clone()))).collect(),
                y: values.iter().copied().map(Some).collect(),
            }
        }
        (ChartKind::Scatter, PanelData::Columns(slices)) => {
            let mut numbers = numeric_slices(kind, data, slices, 2)?;
            let y = numbers.remove(1);
            let x = numbers.remove(0);
            PanelBody::Points { x, y, text: None }
        }
        (ChartKind::Scatter, PanelData::AggregatePair { x, y }) => {
            let x_keys: Vec<&Scalar> = x.keys().collect();
            let y_keys: Vec<&Scalar> = y.keys().collect();
            let same = x_keys.len() == y_keys.len()
                && x_keys.iter().zip(&y_keys).all(|(a, b)| a.semantic_eq(b));
            if !same {
                return Err(mismatch(kind, data, "summaries are keyed differently"));
            }
            PanelBody::Points {
                x: summary_statistic(x, options.statistic)?,
                y: summary_statistic(y, options.statistic)?,
                text: Some(x.labels()),
            }
        }
        (ChartKind::Heatmap, PanelData::Aggregate(A::PivotMatrix(p))) => PanelBody::Grid {
            x: p.col_labels.iter().map(Scalar::label).collect(),
            y: p.row_labels.iter().map(Scalar::label).collect(),
            z: p.cells.iter().map(|row| cell_values(row)).collect(),
        },
        (ChartKind::Heatmap, PanelData::Aggregate(A::CorrelationMatrix(c))) => PanelBody::Grid {
            x: c.columns.clone(),
            y: c.columns.clone(),
            z: c.cells.iter().map(|row| cell_values(row)).collect(),
        },
        (ChartKind::Pie, PanelData::Labeled { labels, values }) => {
            check_slice_values(labels, values)?;
            let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
            PanelBody::Slices {
                labels: labels.to_vec(),
                values: pie_values(kind, data, &wrapped)?,
            }
        }
        (ChartKind::Pie, PanelData::Aggregate(A::RankedSlice(r))) => {
            let wrapped: Vec<Option<f64>> = ranked_values(r, options.statistic)?
                .into_iter()
                .map(Some)
                .collect();
            PanelBody::Slices {
                labels: r.labels(),
                values: pie_values(kind, data, &wrapped)?,
            }
        }
        (ChartKind::Pie, PanelData::Aggregate(A::GroupSummary(s))) => PanelBody::Slices {
            labels: s.labels(),
            values: pie_values(kind, data, &summary_statistic(s, options.statistic)?)?,
        },
        (ChartKind::Table, PanelData::Table { header, rows }) => {
            for row in rows.iter() {
                if row.len() != header.len() {
                    return Err(PanelError::LengthMismatch {
                        what: "table row",
                        left: header.len(),
                        right: row.len(),
                    });
                }
            }
            PanelBody::Table {
                header: header.to_vec(),
                rows: rows.to_vec(),
            }
        }
        (ChartKind::Table, PanelData::Aggregate(A::GroupSummary(s))) => {
            let mut header = vec![s.key_column.clone()];
            header.extend(s.reducers.iter().map(|r| format!("{} {}", r, s.value_column)));
            let rows = s
                .rows
                .iter()
                .map(|row| {
                    let mut out = vec![row.key.label()];
                    out.extend(
                        row.stats
                            .iter()
                            .map(|c| c.value().map(format_value).unwrap_or_default()),
                    );
                    out
                })
                .collect();
            PanelBody::Table { header, rows }
        }
        (ChartKind::Scatter3d, PanelData::Columns(slices)) => {
            let mut numbers = numeric_slices(kind, data, slices, 3)?;
            let z = numbers.remove(2);
            let y = numbers.remove(1);
            let x = numbers.remove(0);
            PanelBody::Points3d { x, y, z }
        }
        _ => return Err(mismatch(kind, data, "unsupported input for this chart kind")),
    };
    Ok(body)
}

fn key_labels_for_column(data: &PanelData<'_>, column: &str) -> Option<Vec<Option<AxisValue>>> {
    let text = |labels: Vec<String>| -> Vec<Option<AxisValue>> {
        labels.into_iter().map(|l| Some(AxisValue::Text(l))).collect()
    };
    match data {
        PanelData::Aggregate(AggregateResult::GroupSummary(s)) if s.key_column == column => {
            Some(s.keys().map(AxisValue::from_scalar).collect())
        }
        PanelData::Aggregate(AggregateResult::GroupedValues(g)) if g.key_column == column => {
            Some(g.groups.iter().map(|v| AxisValue::from_scalar(&v.key)).collect())
        }
        PanelData::Aggregate(AggregateResult::BinnedSummary(b)) if b.column == column => {
            Some(text(b.labels()))
        }
        PanelData::Aggregate(AggregateResult::RankedSlice(r)) => {
            let idx = r.key_columns.iter().position(|k| k == column)?;
            Some(
                r.entries
                    .iter()
                    .map(|e| e.key.0.get(idx).and_then(AxisValue::from_scalar))
                    .collect(),
            )
        }
        PanelData::AggregatePair { x, .. } if x.key_column == column => {
            Some(x.keys().map(AxisValue::from_scalar).collect())
        }
        _ => None,
    }
}

fn statistic_values(data: &PanelData<'_>, reducer: Reducer) -> Option<Vec<Option<f64>>> {
    match data {
        PanelData::Aggregate(AggregateResult::GroupSummary(s)) => {
            s.statistic(reducer).map(|c| cell_values(&c))
        }
        PanelData::Aggregate(AggregateResult::BinnedSummary(b)) => {
            b.statistic(reducer).map(|c| cell_values(&c))
        }
        PanelData::Aggregate(AggregateResult::RankedSlice(r)) if r.reducer == reducer => {
            Some(r.values().into_iter().map(Some).collect())
        }
        PanelData::AggregatePair { x, y } => y
            .statistic(reducer)
            .or_else(|| x.statistic(reducer))
            .map(|c| cell_values(&c)),
        _ => None,
    }
}

fn bind_encoding(
    ds: &Dataset,
    kind: ChartKind,
    data: &PanelData<'_>,
    encoding: &Encoding,
) -> Result<BoundEncoding, PanelError> {
    match encoding {
        Encoding::Fixed(value) => Ok(BoundEncoding::Fixed {
            value: value.clone(),
        }),
        Encoding::Column(column) => {
            if !ds.has_column(column) {
                return Err(PanelError::UnknownEncodingColumn {
                    name: column.clone(),
                });
            }
            let values = match data {
                PanelData::Columns(slices) => {
                    let positions = slices.first().map(|s| s.positions.as_slice()).unwrap_or(&[]);
                    ds.slice(column, positions)?
                        .values
                        .iter()
                        .map(AxisValue::from_scalar)
                        .collect()
                }
                _ => key_labels_for_column(data, column).ok_or_else(|| {
                    mismatch(
                        kind,
                        data,
                        format!("column {column:?} is not a key of the aggregate"),
                    )
                })?,
            };
            Ok(BoundEncoding::Column {
                column: column.clone(),
                values,
            })
        }
        Encoding::Statistic(reducer) => {
            let values = statistic_values(data, *reducer).ok_or_else(|| {
                PanelError::UnknownEncodingColumn {
                    name: reducer.as_str().to_owned(),
                }
            })?;
            Ok(BoundEncoding::Statistic {
                statistic: *reducer,
                values,
            })
        }
    }
}

/// Turn one aggregate, fit or slice set into a panel of `kind`.
///
/// The input's shape is checked against the chart kind and every color or
/// size encoding is resolved against the dataset or the aggregate. Inputs
/// are only read.
pub fn build_panel(
    ds: &Dataset,
    kind: ChartKind,
    data: PanelData<'_>,
    options: &EncodingOptions,
) -> Result<Panel, PanelError> {
    let body = build_body(kind, &data, options)?;
    let color = options
        .color
        .as_ref()
        .map(|e| bind_encoding(ds, kind, &data, e))
        .transpose()?;
    let size = options
        .size
        .as_ref()
        .map(|e| bind_encoding(ds, kind, &data, e))
        .transpose()?;

    tracing::debug!(kind = kind.as_str(), data = data.shape_name(), "panel built");

    Ok(Panel {
        kind,
        title: options.title.clone(),
        name: options.name.clone(),
        x_label: options.x_label.clone(),
        y_label: options.y_label.clone(),
        color,
        size,
        colorscale: options.colorscale.clone(),
        opacity: options.opacity,
        body,
    })
}

#[cfg(test)]
mod tests {
    use fd_aggregate::{
        AggregateResult, Reducer, correlation_matrix, group_summary, group_values, pivot_matrix,
        ranked_slice,
    };
    use fd_fit::fit_normal;
    use fd_frame::{Dataset, Schema};
    use fd_types::{ErrorKind, Scalar};

    use super::{
        AxisValue, BoundEncoding, ChartKind, Encoding, EncodingOptions, Geometry, PanelBody,
        PanelData, PanelError, build_panel, format_value,
    };

    fn text(v: &str) -> Scalar {
        Scalar::Utf8(v.to_owned())
    }

    fn flight(airline: &str, source: &str, dest: &str, days: i64, price: i64) -> Vec<Scalar> {
        vec![
            text(airline),
            text("XX-1"),
            text(source),
            text("Morning"),
            text("zero"),
            text("Night"),
            text(dest),
            text("Economy"),
            Scalar::Float64(days as f64 / 10.0 + 1.0),
            Scalar::Int64(days),
            Scalar::Int64(price),
        ]
    }

    fn sample() -> Dataset {
        Dataset::from_rows(
            Schema::flights(),
            vec![
                flight("Vistara", "Delhi", "Mumbai", 1, 9000),
                flight("Indigo", "Delhi", "Mumbai", 30, 3000),
                flight("Vistara", "Mumbai", "Delhi", 14, 5000),
                flight("AirAsia", "Delhi", "Chennai", 49, 2000),
            ],
        )
        .expect("dataset")
    }

    #[test]
    fn kinds_map_to_geometries() {
        assert_eq!(ChartKind::Pie.geometry(), Geometry::Domain);
        assert_eq!(ChartKind::Scatter3d.geometry(), Geometry::Scene);
        assert_eq!(ChartKind::Table.geometry(), Geometry::Table);
        assert_eq!(ChartKind::Violin.geometry(), Geometry::Xy);
    }

    #[test]
    fn histogram_from_single_numeric_slice() {
        let ds = sample();
        let slices = [ds.full_slice("price").expect("slice")];
        let options = EncodingOptions {
            bins: Some(50),
            ..EncodingOptions::titled("Price Distribution")
        };
        let panel = build_panel(&ds, ChartKind::Histogram, PanelData::Columns(&slices), &options)
            .expect("panel");
        assert_eq!(panel.title.as_deref(), Some("Price Distribution"));
        assert_eq!(
            panel.body,
            PanelBody::Histogram {
                values: vec![9000.0, 3000.0, 5000.0, 2000.0],
                bins: Some(50)
            }
        );
    }

    #[test]
    fn histogram_rejects_aggregate_input() {
        let ds = sample();
        let summary: AggregateResult = group_summary(&ds, "price", "airline", &[Reducer::Mean])
            .expect("summary")
            .into();
        let err = build_panel(
            &ds,
            ChartKind::Histogram,
            PanelData::Aggregate(&summary),
            &EncodingOptions::default(),
        )
        .expect_err("shape");
        assert!(matches!(
            err,
            PanelError::ShapeMismatch {
                kind: ChartKind::Histogram,
                data: "group_summary",
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn histogram_rejects_text_slice() {
        let ds = sample();
        let slices = [ds.full_slice("airline").expect("slice")];
        let err = build_panel(
            &ds,
            ChartKind::Histogram,
            PanelData::Columns(&slices),
            &EncodingOptions::default(),
        )
        .expect_err("text");
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn bar_uses_requested_statistic() {
        let ds = sample();
        let summary: AggregateResult =
            group_summary(&ds, "price", "airline", &[Reducer::Mean, Reducer::Count])
                .expect("summary")
                .into();
        let options = EncodingOptions {
            statistic: Some(Reducer::Count),
            ..EncodingOptions::default()
        };
        let panel = build_panel(&ds, ChartKind::Bar, PanelData::Aggregate(&summary), &options)
            .expect("panel");
        assert_eq!(
            panel.body,
            PanelBody::Categorical {
                labels: vec!["Vistara".into(), "Indigo".into(), "AirAsia".into()],
                values: vec![Some(2.0), Some(1.0), Some(1.0)],
            }
        );

        let options = EncodingOptions {
            statistic: Some(Reducer::Median),
            ..EncodingOptions::default()
        };
        let err = build_panel(&ds, ChartKind::Bar, PanelData::Aggregate(&summary), &options)
            .expect_err("missing statistic");
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn box_panel_from_grouped_values() {
        let ds = sample();
        let grouped: AggregateResult = group_values(&ds, "price", "airline").expect("g").into();
        let panel = build_panel(
            &ds,
            ChartKind::Box,
            PanelData::Aggregate(&grouped),
            &EncodingOptions::default(),
        )
        .expect("panel");
        let PanelBody::Distribution { groups } = panel.body else {
            panic!("expected distribution body");
        };
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].name, "Vistara");
        assert_eq!(groups[0].values, vec![9000.0, 5000.0]);
    }

    #[test]
    fn heatmap_leaves_undefined_cells_blank() {
        let ds = sample();
        let pivot: AggregateResult =
            pivot_matrix(&ds, "source_city", "destination_city", "price", Reducer::Mean)
                .expect("pivot")
                .into();
        let panel = build_panel(
            &ds,
            ChartKind::Heatmap,
            PanelData::Aggregate(&pivot),
            &EncodingOptions::default(),
        )
        .expect("panel");
        let json = serde_json::to_value(&panel).expect("json");
        assert!(json["body"]["z"][1][0].is_null());

        let PanelBody::Grid { x, y, z } = panel.body else {
            panic!("expected grid");
        };
        assert_eq!(x, vec!["Chennai", "Delhi", "Mumbai"]);
        assert_eq!(y, vec!["Delhi", "Mumbai"]);
        assert_eq!(z[0], vec![Some(2000.0), None, Some(6000.0)]);
        assert_eq!(z[1], vec![None, Some(5000.0), None]);
    }

    #[test]
    fn heatmap_from_correlation() {
        let ds = sample();
        let corr: AggregateResult = correlation_matrix(&ds, &["price", "days_left"])
            .expect("corr")
            .into();
        let panel = build_panel(
            &ds,
            ChartKind::Heatmap,
            PanelData::Aggregate(&corr),
            &EncodingOptions::default(),
        )
        .expect("panel");
        let PanelBody::Grid { z, .. } = panel.body else {
            panic!("expected grid");
        };
        assert_eq!(z[0][0], Some(1.0));
        assert_eq!(z[0][1], z[1][0]);
    }

    #[test]
    fn pie_requires_matching_non_negative_values() {
        let ds = sample();
        let labels = vec!["a".to_owned(), "b".to_owned()];
        let err = build_panel(
            &ds,
            ChartKind::Pie,
            PanelData::Labeled {
                labels: &labels,
                values: &[1.0],
            },
            &EncodingOptions::default(),
        )
        .expect_err("length");
        assert_eq!(
            err,
            PanelError::LengthMismatch {
                what: "label/value",
                left: 2,
                right: 1
            }
        );

        let err = build_panel(
            &ds,
            ChartKind::Pie,
            PanelData::Labeled {
                labels: &labels,
                values: &[1.0, -2.0],
            },
            &EncodingOptions::default(),
        )
        .expect_err("negative");
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn pie_from_market_share_ranking() {
        let ds = sample();
        let share: AggregateResult =
            ranked_slice(&ds, &["airline"], "price", Reducer::Count, 10, false)
                .expect("ranked")
                .into();
        let panel = build_panel(
            &ds,
            ChartKind::Pie,
            PanelData::Aggregate(&share),
            &EncodingOptions::default(),
        )
        .expect("panel");
        assert_eq!(panel.geometry(), Geometry::Domain);
        assert_eq!(
            panel.body,
            PanelBody::Slices {
                labels: vec!["Vistara".into(), "AirAsia".into(), "Indigo".into()],
                values: vec![2.0, 1.0, 1.0],
            }
        );
    }

    #[test]
    fn ranked_bar_rejects_statistic_it_was_not_reduced_by() {
        let ds = sample();
        let ranked: AggregateResult =
            ranked_slice(&ds, &["airline"], "price", Reducer::Mean, 10, false)
                .expect("ranked")
                .into();
        let matching = EncodingOptions {
            statistic: Some(Reducer::Mean),
            ..EncodingOptions::default()
        };
        build_panel(&ds, ChartKind::Bar, PanelData::Aggregate(&ranked), &matching)
            .expect("mean is the ranking statistic");

        let other = EncodingOptions {
            statistic: Some(Reducer::Count),
            ..EncodingOptions::default()
        };
        for kind in [ChartKind::Bar, ChartKind::Pie] {
            let err = build_panel(&ds, kind, PanelData::Aggregate(&ranked), &other)
                .expect_err("count was not computed");
            assert_eq!(
                err,
                PanelError::UnknownEncodingColumn {
                    name: "count".to_owned()
                }
            );
            assert_eq!(err.kind(), ErrorKind::Schema);
        }
    }

    #[test]
    fn scatter_from_columns_binds_color_column() {
        let ds = sample();
        let positions = [0, 2];
        let slices = [
            ds.slice("duration", &positions).expect("x"),
            ds.slice("price", &positions).expect("y"),
        ];
        let options = EncodingOptions {
            color: Some(Encoding::Column("days_left".to_owned())),
            colorscale: Some("viridis".to_owned()),
            ..EncodingOptions::default()
        };
        let panel = build_panel(&ds, ChartKind::Scatter, PanelData::Columns(&slices), &options)
            .expect("panel");
        assert_eq!(
            panel.color,
            Some(BoundEncoding::Column {
                column: "days_left".to_owned(),
                values: vec![Some(AxisValue::Number(1.0)), Some(AxisValue::Number(14.0))],
            })
        );
    }

    #[test]
    fn unknown_encoding_column_is_rejected() {
        let ds = sample();
        let slices = [
            ds.full_slice("duration").expect("x"),
            ds.full_slice("price").expect("y"),
        ];
        let options = EncodingOptions {
            color: Some(Encoding::Column("fare_class".to_owned())),
            ..EncodingOptions::default()
        };
        let err = build_panel(&ds, ChartKind::Scatter, PanelData::Columns(&slices), &options)
            .expect_err("unknown");
        assert_eq!(
            err,
            PanelError::UnknownEncodingColumn {
                name: "fare_class".to_owned()
            }
        );
    }

    #[test]
    fn scatter_pair_sizes_by_count() {
        let ds = sample();
        let durations = group_summary(&ds, "duration", "airline", &[Reducer::Mean]).expect("d");
        let prices =
            group_summary(&ds, "price", "airline", &[Reducer::Mean, Reducer::Count]).expect("p");
        let options = EncodingOptions {
            statistic: Some(Reducer::Mean),
            size: Some(Encoding::Statistic(Reducer::Count)),
            color: Some(Encoding::Column("airline".to_owned())),
            ..EncodingOptions::default()
        };
        let panel = build_panel(
            &ds,
            ChartKind::Scatter,
            PanelData::AggregatePair {
                x: &durations,
                y: &prices,
            },
            &options,
        )
        .expect("panel");
        assert_eq!(
            panel.size,
            Some(BoundEncoding::Statistic {
                statistic: Reducer::Count,
                values: vec![Some(2.0), Some(1.0), Some(1.0)],
            })
        );
        let PanelBody::Points { text, .. } = &panel.body else {
            panic!("expected points");
        };
        assert_eq!(text.as_deref().map(<[String]>::len), Some(3));

        let stops = group_summary(&ds, "price", "stops", &[Reducer::Mean]).expect("s");
        let err = build_panel(
            &ds,
            ChartKind::Scatter,
            PanelData::AggregatePair {
                x: &durations,
                y: &stops,
            },
            &EncodingOptions::default(),
        )
        .expect_err("keys differ");
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn statistic_encoding_on_raw_columns_is_unknown() {
        let ds = sample();
        let slices = [
            ds.full_slice("duration").expect("x"),
            ds.full_slice("price").expect("y"),
        ];
        let options = EncodingOptions {
            size: Some(Encoding::Statistic(Reducer::Count)),
            ..EncodingOptions::default()
        };
        let err = build_panel(&ds, ChartKind::Scatter, PanelData::Columns(&slices), &options)
            .expect_err("no statistic");
        assert!(matches!(err, PanelError::UnknownEncodingColumn { .. }));
    }

    #[test]
    fn line_from_fit_curve() {
        let ds = sample();
        let curve = fit_normal(&ds, "price", 10).expect("fit");
        let panel = build_panel(
            &ds,
            ChartKind::Line,
            PanelData::Fit(&curve),
            &EncodingOptions::default(),
        )
        .expect("panel");
        let PanelBody::Series { x, y } = panel.body else {
            panic!("expected series");
        };
        assert_eq!(x.len(), 10);
        assert_eq!(y.len(), 10);
        assert_eq!(x[0], Some(AxisValue::Number(2000.0)));
    }

    #[test]
    fn table_rows_must_match_header() {
        let ds = sample();
        let header = vec!["Metric".to_owned(), "Value".to_owned()];
        let rows = vec![vec!["Total Flights".to_owned()]];
        let err = build_panel(
            &ds,
            ChartKind::Table,
            PanelData::Table {
                header: &header,
                rows: &rows,
            },
            &EncodingOptions::default(),
        )
        .expect_err("width");
        assert_eq!(err.kind(), ErrorKind::Shape);

        let summary: AggregateResult = group_summary(&ds, "price", "airline", &[Reducer::Mean])
            .expect("summary")
            .into();
        let panel = build_panel(
            &ds,
            ChartKind::Table,
            PanelData::Aggregate(&summary),
            &EncodingOptions::default(),
        )
        .expect("table");
        let PanelBody::Table { header, rows } = panel.body else {
            panic!("expected table");
        };
        assert_eq!(header, vec!["airline", "mean price"]);
        assert_eq!(rows[0], vec!["Vistara", "7000"]);
    }

    #[test]
    fn scatter3d_needs_three_slices() {
        let ds = sample();
        let two = [
            ds.full_slice("duration").expect("x"),
            ds.full_slice("price").expect("y"),
        ];
        let err = build_panel(
            &ds,
            ChartKind::Scatter3d,
            PanelData::Columns(&two),
            &EncodingOptions::default(),
        )
        .expect_err("two slices");
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn format_value_trims_integers() {
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(2.456), "2.46");
    }

    #[test]
    fn panel_serializes_kind_and_body_layout() {
        let ds = sample();
        let labels = vec!["a".to_owned()];
        let panel = build_panel(
            &ds,
            ChartKind::Bar,
            PanelData::Labeled {
                labels: &labels,
                values: &[4.0],
            },
            &EncodingOptions::default(),
        )
        .expect("panel");
        let json = serde_json::to_value(&panel).expect("json");
        assert_eq!(json["kind"], "bar");
        assert_eq!(json["body"]["layout"], "categorical");
        assert!(json.get("title").is_none());
    }
}
