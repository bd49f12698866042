#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use fd_columnar::{Column, ColumnError};
use fd_types::{DType, ErrorKind, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Departure and arrival time slots, earliest first.
pub const TIME_SLOT_LEVELS: [&str; 6] = [
    "Early_Morning",
    "Morning",
    "Afternoon",
    "Evening",
    "Night",
    "Late_Night",
];
pub const STOP_LEVELS: [&str; 3] = ["zero", "one", "two_or_more"];
pub const CLASS_LEVELS: [&str; 2] = ["Economy", "Business"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("schema declares field {name:?} more than once")]
    DuplicateField { name: String },
    #[error("unknown column {name:?}")]
    UnknownColumn { name: String },
    #[error("column {name:?} is not declared in the schema")]
    UndeclaredColumn { name: String },
    #[error("column {column:?} has dtype {actual:?}, schema declares {expected:?}")]
    DTypeMismatch {
        column: String,
        expected: DType,
        actual: DType,
    },
    #[error("column {column:?} category levels differ from the schema")]
    LevelMismatch { column: String },
    #[error("column {column:?} has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("row {row} has {actual} values, schema has {expected} fields")]
    RowWidthMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("column {column:?} must be numeric, found {dtype:?}")]
    NotNumeric { column: String, dtype: DType },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

impl FrameError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LengthMismatch { .. } | Self::RowWidthMismatch { .. } => ErrorKind::Shape,
            Self::Column(ColumnError::PositionOutOfBounds { .. }) => ErrorKind::Parameter,
            _ => ErrorKind::Schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    dtype: DType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    levels: Option<Vec<String>>,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            levels: None,
        }
    }

    #[must_use]
    pub fn category<S: AsRef<str>>(name: impl Into<String>, levels: &[S]) -> Self {
        Self {
            name: name.into(),
            dtype: DType::Category,
            levels: Some(levels.iter().map(|l| l.as_ref().to_owned()).collect()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn levels(&self) -> Option<&[String]> {
        self.levels.as_deref()
    }

    /// Build a column of this field's declared type from raw values.
    pub fn build_column(&self, values: Vec<Scalar>) -> Result<Column, FrameError> {
        let column = match &self.levels {
            Some(levels) => Column::categorical(levels.clone(), values)?,
            None => Column::new(self.dtype, values)?,
        };
        Ok(column)
    }
}

/// Ordered field declarations for a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self, FrameError> {
        for (idx, field) in fields.iter().enumerate() {
            if fields[..idx].iter().any(|f| f.name == field.name) {
                return Err(FrameError::DuplicateField {
                    name: field.name.clone(),
                });
            }
        }
        Ok(Self { fields })
    }

    /// The flight-records layout.
    #[must_use]
    pub fn flights() -> Self {
        Self {
            fields: vec![
                Field::new("airline", DType::Utf8),
                Field::new("flight", DType::Utf8),
                Field::new("source_city", DType::Utf8),
                Field::category("departure_time", &TIME_SLOT_LEVELS),
                Field::category("stops", &STOP_LEVELS),
                Field::category("arrival_time", &TIME_SLOT_LEVELS),
                Field::new("destination_city", DType::Utf8),
                Field::category("class", &CLASS_LEVELS),
                Field::new("duration", DType::Float64),
                Field::new("days_left", DType::Int64),
                Field::new("price", DType::Int64),
            ],
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Row positions of one column together with the values found there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSlice {
    pub name: String,
    pub dtype: DType,
    pub positions: Vec<usize>,
    pub values: Vec<Scalar>,
}

impl ColumnSlice {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Numeric view of the slice; `None` when the column is not numeric.
    #[must_use]
    pub fn numbers(&self) -> Option<Vec<Option<f64>>> {
        if !self.dtype.is_numeric() {
            return None;
        }
        Some(
            self.values
                .iter()
                .map(|v| if v.is_missing() { None } else { v.to_f64().ok() })
                .collect(),
        )
    }
}

/// Immutable, schema-checked column store.
///
/// Construction validates every declared field once (presence, dtype,
/// category levels, row count); afterwards the typed accessors only have to
/// look columns up by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: Schema,
    columns: BTreeMap<String, Column>,
    len: usize,
}

impl Dataset {
    pub fn new(schema: Schema, columns: BTreeMap<String, Column>) -> Result<Self, FrameError> {
        if let Some(name) = columns.keys().find(|name| schema.field(name).is_none()) {
            return Err(FrameError::UndeclaredColumn { name: name.clone() });
        }

        let mut len = None;
        for field in schema.fields() {
            let column = columns
                .get(field.name())
                .ok_or_else(|| FrameError::UnknownColumn {
                    name: field.name().to_owned(),
                })?;
            if column.dtype() != field.dtype() {
                return Err(FrameError::DTypeMismatch {
                    column: field.name().to_owned(),
                    expected: field.dtype(),
                    actual: column.dtype(),
                });
            }
            if column.levels() != field.levels() {
                return Err(FrameError::LevelMismatch {
                    column: field.name().to_owned(),
                });
            }
            match len {
                None => len = Some(column.len()),
                Some(expected) if expected != column.len() => {
                    return Err(FrameError::LengthMismatch {
                        column: field.name().to_owned(),
                        expected,
                        actual: column.len(),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            schema,
            columns,
            len: len.unwrap_or(0),
        })
    }

    /// Build from row-major records whose values follow the schema's field order.
    pub fn from_rows(schema: Schema, rows: Vec<Vec<Scalar>>) -> Result<Self, FrameError> {
        let width = schema.len();
        let mut buffers: Vec<Vec<Scalar>> = vec![Vec::with_capacity(rows.len()); width];
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(FrameError::RowWidthMismatch {
                    row: row_idx,
                    expected: width,
                    actual: row.len(),
                });
            }
            for (buffer, value) in buffers.iter_mut().zip(row) {
                buffer.push(value);
            }
        }
        Self::from_column_values(schema, buffers)
    }

    /// Build from column-major values in schema field order.
    pub fn from_column_values(
        schema: Schema,
        values: Vec<Vec<Scalar>>,
    ) -> Result<Self, FrameError> {
        let mut columns = BTreeMap::new();
        for (field, column_values) in schema.fields().iter().zip(values) {
            columns.insert(field.name().to_owned(), field.build_column(column_values)?);
        }
        Self::new(schema, columns)
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, FrameError> {
        self.columns
            .get(name)
            .ok_or_else(|| FrameError::UnknownColumn {
                name: name.to_owned(),
            })
    }

    /// Row-aligned numeric values of `name`; missing entries are `None`.
    pub fn numeric(&self, name: &str) -> Result<Vec<Option<f64>>, FrameError> {
        let column = self.column(name)?;
        column.to_f64_values().map_err(|err| match err {
            ColumnError::NotNumeric { dtype } => FrameError::NotNumeric {
                column: name.to_owned(),
                dtype,
            },
            other => FrameError::Column(other),
        })
    }

    /// Present numeric values of `name`, nulls dropped, in row order.
    pub fn non_null_numeric(&self, name: &str) -> Result<Vec<f64>, FrameError> {
        Ok(self.numeric(name)?.into_iter().flatten().collect())
    }

    pub fn non_null_count(&self, name: &str) -> Result<usize, FrameError> {
        Ok(self.column(name)?.count_valid())
    }

    /// Values of `name` at `positions`.
    pub fn slice(&self, name: &str, positions: &[usize]) -> Result<ColumnSlice, FrameError> {
        let column = self.column(name)?;
        let taken = column.take(positions)?;
        Ok(ColumnSlice {
            name: name.to_owned(),
            dtype: column.dtype(),
            positions: positions.to_vec(),
            values: taken.values().to_vec(),
        })
    }

    /// Every row of `name`.
    pub fn full_slice(&self, name: &str) -> Result<ColumnSlice, FrameError> {
        let positions: Vec<usize> = (0..self.len).collect();
        self.slice(name, &positions)
    }

    /// Up to `n` evenly spaced row positions, ascending and deterministic.
    #[must_use]
    pub fn sample_positions(&self, n: usize) -> Vec<usize> {
        if n >= self.len {
            return (0..self.len).collect();
        }
        (0..n).map(|i| i * self.len / n).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use fd_columnar::Column;
    use fd_types::{DType, ErrorKind, NullKind, Scalar};

    use super::{Dataset, Field, FrameError, Schema};

    fn text(v: &str) -> Scalar {
        Scalar::Utf8(v.to_owned())
    }

    fn flight_row(airline: &str, stops: &str, duration: f64, days: i64, price: i64) -> Vec<Scalar> {
        vec![
            text(airline),
            text("AI-101"),
            text("Delhi"),
            text("Morning"),
            text(stops),
            text("Night"),
            text("Mumbai"),
            text("Economy"),
            Scalar::Float64(duration),
            Scalar::Int64(days),
            Scalar::Int64(price),
        ]
    }

    #[test]
    fn flights_schema_declares_eleven_fields() {
        let schema = Schema::flights();
        assert_eq!(schema.len(), 11);
        assert_eq!(schema.field("stops").map(Field::dtype), Some(DType::Category));
        assert_eq!(
            schema.field("departure_time").and_then(Field::levels).map(<[String]>::len),
            Some(6)
        );
        assert_eq!(schema.field("price").map(Field::dtype), Some(DType::Int64));
    }

    #[test]
    fn schema_rejects_duplicate_fields() {
        let err = Schema::new(vec![
            Field::new("price", DType::Int64),
            Field::new("price", DType::Float64),
        ])
        .expect_err("duplicate");
        assert_eq!(
            err,
            FrameError::DuplicateField {
                name: "price".to_owned()
            }
        );
    }

    #[test]
    fn from_rows_builds_typed_columns() {
        let ds = Dataset::from_rows(
            Schema::flights(),
            vec![
                flight_row("Vistara", "one", 2.5, 3, 5000),
                flight_row("Indigo", "zero", 1.25, 10, 3000),
            ],
        )
        .expect("dataset");
        assert_eq!(ds.len(), 2);
        assert_eq!(
            ds.non_null_numeric("price").expect("price"),
            vec![5000.0, 3000.0]
        );
        let stops = ds.column("stops").expect("stops");
        assert_eq!(stops.category_rank("one"), Some(1));
    }

    #[test]
    fn from_rows_rejects_unknown_category_level() {
        let err = Dataset::from_rows(
            Schema::flights(),
            vec![flight_row("Vistara", "three", 2.5, 3, 5000)],
        )
        .expect_err("unknown level");
        assert!(matches!(err, FrameError::Column(_)));
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let mut row = flight_row("Vistara", "one", 2.5, 3, 5000);
        row.pop();
        let err = Dataset::from_rows(Schema::flights(), vec![row]).expect_err("ragged");
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn new_checks_presence_dtype_and_length() {
        let schema = Schema::new(vec![
            Field::new("a", DType::Int64),
            Field::new("b", DType::Int64),
        ])
        .expect("schema");

        let mut columns = BTreeMap::new();
        columns.insert(
            "a".to_owned(),
            Column::new(DType::Int64, vec![Scalar::Int64(1)]).expect("a"),
        );
        let err = Dataset::new(schema.clone(), columns.clone()).expect_err("missing b");
        assert_eq!(
            err,
            FrameError::UnknownColumn {
                name: "b".to_owned()
            }
        );

        columns.insert(
            "b".to_owned(),
            Column::new(DType::Float64, vec![Scalar::Float64(1.0)]).expect("b"),
        );
        let err = Dataset::new(schema.clone(), columns.clone()).expect_err("dtype");
        assert!(matches!(err, FrameError::DTypeMismatch { .. }));

        columns.insert(
            "b".to_owned(),
            Column::new(DType::Int64, vec![Scalar::Int64(1), Scalar::Int64(2)]).expect("b"),
        );
        let err = Dataset::new(schema.clone(), columns.clone()).expect_err("length");
        assert!(matches!(err, FrameError::LengthMismatch { .. }));

        columns.insert(
            "c".to_owned(),
            Column::new(DType::Int64, vec![Scalar::Int64(1)]).expect("c"),
        );
        let err = Dataset::new(schema, columns).expect_err("undeclared");
        assert!(matches!(err, FrameError::UndeclaredColumn { .. }));
    }

    #[test]
    fn typed_accessors_fail_fast() {
        let ds = Dataset::from_rows(
            Schema::flights(),
            vec![flight_row("Vistara", "one", 2.5, 3, 5000)],
        )
        .expect("dataset");
        let err = ds.numeric("airline").expect_err("text column");
        assert_eq!(
            err,
            FrameError::NotNumeric {
                column: "airline".to_owned(),
                dtype: DType::Utf8
            }
        );
        let err = ds.column("fare").expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn non_null_count_and_numeric_skip_missing() {
        let mut row = flight_row("Vistara", "one", 2.5, 3, 5000);
        row[10] = Scalar::Null(NullKind::Null);
        let ds = Dataset::from_rows(
            Schema::flights(),
            vec![row, flight_row("Indigo", "zero", 1.0, 1, 100)],
        )
        .expect("dataset");
        assert_eq!(ds.non_null_count("price").expect("count"), 1);
        assert_eq!(ds.numeric("price").expect("price"), vec![None, Some(100.0)]);
    }

    #[test]
    fn slice_and_sample_positions() {
        let rows = (0..10)
            .map(|i| flight_row("Vistara", "one", 1.0, i, 100 * i))
            .collect();
        let ds = Dataset::from_rows(Schema::flights(), rows).expect("dataset");

        let positions = ds.sample_positions(4);
        assert_eq!(positions, vec![0, 2, 5, 7]);
        assert_eq!(ds.sample_positions(50).len(), 10);
        assert!(ds.sample_positions(0).is_empty());

        let slice = ds.slice("days_left", &positions).expect("slice");
        assert_eq!(
            slice.numbers().expect("numeric"),
            vec![Some(0.0), Some(2.0), Some(5.0), Some(7.0)]
        );
        assert!(ds.slice("airline", &[0]).expect("text").numbers().is_none());

        let err = ds.slice("price", &[10]).expect_err("out of bounds");
        assert_eq!(err.kind(), ErrorKind::Parameter);
        assert_eq!(ds.full_slice("price").expect("full").len(), 10);
    }
}
