#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use fd_frame::{Dataset, FrameError, Schema};
use fd_types::{DType, ErrorKind, NullKind, Scalar};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("csv input has no column {name:?}")]
    MissingColumn { name: String },
    #[error("line {line}: column {column:?} value {value:?} is not a valid {expected:?}")]
    Parse {
        line: u64,
        column: String,
        value: String,
        expected: DType,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl IoError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingHeaders | Self::MissingColumn { .. } | Self::Parse { .. } => {
                ErrorKind::Schema
            }
            Self::Csv(_) | Self::Io(_) => ErrorKind::Io,
            Self::Frame(err) => err.kind(),
        }
    }
}

fn parse_field(field: &str, dtype: DType) -> Option<Scalar> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Some(Scalar::Null(NullKind::Null));
    }
    match dtype {
        DType::Null => Some(Scalar::Null(NullKind::Null)),
        DType::Int64 => trimmed.parse::<i64>().ok().map(Scalar::Int64),
        DType::Float64 => trimmed.parse::<f64>().ok().map(Scalar::Float64),
        DType::Utf8 | DType::Category => Some(Scalar::Utf8(trimmed.to_owned())),
    }
}

/// Column index in `headers` for every schema field, in schema order.
fn locate_fields(headers: &StringRecord, schema: &Schema) -> Result<Vec<usize>, IoError> {
    schema
        .fields()
        .iter()
        .map(|field| {
            headers
                .iter()
                .position(|h| h.trim() == field.name())
                .ok_or_else(|| IoError::MissingColumn {
                    name: field.name().to_owned(),
                })
        })
        .collect()
}

fn read_csv<R: Read>(input: R, schema: &Schema, size_hint: usize) -> Result<Dataset, IoError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(input);

    let headers = reader.headers().cloned().map_err(IoError::from)?;
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }
    let positions = locate_fields(&headers, schema)?;

    let row_hint = size_hint / (headers.len() * 8).max(1);
    let mut columns: Vec<Vec<Scalar>> = (0..positions.len())
        .map(|_| Vec::with_capacity(row_hint))
        .collect();

    for row in reader.records() {
        let record = row?;
        let line = record.position().map_or(0, |p| p.line());
        for ((field, &idx), column) in schema.fields().iter().zip(&positions).zip(&mut columns) {
            let raw = record.get(idx).unwrap_or_default();
            let value = parse_field(raw, field.dtype()).ok_or_else(|| IoError::Parse {
                line,
                column: field.name().to_owned(),
                value: raw.to_owned(),
                expected: field.dtype(),
            })?;
            column.push(value);
        }
    }

    Ok(Dataset::from_column_values(schema.clone(), columns)?)
}

/// Parse CSV text against `schema`. Columns the schema does not declare are
/// ignored; empty fields become null.
pub fn read_csv_str(input: &str, schema: &Schema) -> Result<Dataset, IoError> {
    read_csv(input.as_bytes(), schema, input.len())
}

pub fn read_csv_path(path: impl AsRef<Path>, schema: &Schema) -> Result<Dataset, IoError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let size_hint = file.metadata().map_or(0, |m| m.len() as usize);
    let ds = read_csv(file, schema, size_hint)?;
    tracing::info!(path = %path.display(), rows = ds.len(), "dataset loaded");
    Ok(ds)
}

/// Load a flights file with the fixed flight schema.
pub fn read_flights_csv(path: impl AsRef<Path>) -> Result<Dataset, IoError> {
    read_csv_path(path, &Schema::flights())
}
