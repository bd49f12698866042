#![forbid(unsafe_code)]

use fd_types::{DType, Scalar, TypeError, cast_scalar_owned, infer_dtype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Packed per-row validity bits; bit set means the value is present.
#[derive(Debug, Clone, Eq)]
pub struct ValidityMask {
    words: Vec<u64>,
    len: usize,
}

impl ValidityMask {
    #[must_use]
    pub fn from_values(values: &[Scalar]) -> Self {
        let len = values.len();
        let word_count = len.div_ceil(64);
        let mut words = vec![0_u64; word_count];
        for (idx, value) in values.iter().enumerate() {
            if !value.is_missing() {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Self { words, len }
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        let full_words = self.len / 64;
        let mut count: u32 = self.words[..full_words]
            .iter()
            .map(|w| w.count_ones())
            .sum();
        let remainder = self.len % 64;
        if remainder > 0 && full_words < self.words.len() {
            let mask = (1_u64 << remainder) - 1;
            count += (self.words[full_words] & mask).count_ones();
        }
        count as usize
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }
}

impl PartialEq for ValidityMask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bits().eq(other.bits())
    }
}

impl Serialize for ValidityMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let bits: Vec<bool> = self.bits().collect();
        let mut state = serializer.serialize_struct("ValidityMask", 1)?;
        state.serialize_field("bits", &bits)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ValidityMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bits: Vec<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let len = raw.bits.len();
        let mut words = vec![0_u64; len.div_ceil(64)];
        for (idx, &valid) in raw.bits.iter().enumerate() {
            if valid {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Ok(Self { words, len })
    }
}

/// A typed column of scalars with its validity mask.
///
/// Ordered categories store their values as `Scalar::Utf8` and carry the
/// declared level order in `levels`; every present value is one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
    validity: ValidityMask,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    levels: Option<Vec<String>>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("category columns need declared levels; use Column::categorical")]
    CategoryLevelsRequired,
    #[error("category level {level:?} declared more than once")]
    DuplicateCategoryLevel { level: String },
    #[error("value {value:?} is not a declared category level")]
    UnknownCategory { value: String },
    #[error("column of dtype {dtype:?} is not numeric")]
    NotNumeric { dtype: DType },
    #[error("position {position} out of bounds for column of length {len}")]
    PositionOutOfBounds { position: usize, len: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl Column {
    /// Construct a column, coercing values to the target dtype.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        if dtype == DType::Category {
            return Err(ColumnError::CategoryLevelsRequired);
        }
        let values = coerce(dtype, values)?;
        let validity = ValidityMask::from_values(&values);
        Ok(Self {
            dtype,
            values,
            validity,
            levels: None,
        })
    }

    /// Construct an ordered-category column. `levels` fixes the ranking used
    /// by grouping; every present value must be one of them.
    pub fn categorical(levels: Vec<String>, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        for (idx, level) in levels.iter().enumerate() {
            if levels[..idx].contains(level) {
                return Err(ColumnError::DuplicateCategoryLevel {
                    level: level.clone(),
                });
            }
        }
        let values = coerce(DType::Category, values)?;
        for value in &values {
            if let Scalar::Utf8(v) = value {
                if !levels.iter().any(|level| level == v) {
                    return Err(ColumnError::UnknownCategory { value: v.clone() });
                }
            }
        }
        let validity = ValidityMask::from_values(&values);
        Ok(Self {
            dtype: DType::Category,
            values,
            validity,
            levels: Some(levels),
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = match infer_dtype(&values)? {
            DType::Category => DType::Utf8,
            other => other,
        };
        Self::new(dtype, values)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.validity.count_valid()
    }

    #[must_use]
    pub fn levels(&self) -> Option<&[String]> {
        self.levels.as_deref()
    }

    /// Position of `value` in the declared level order.
    #[must_use]
    pub fn category_rank(&self, value: &str) -> Option<usize> {
        self.levels
            .as_ref()
            .and_then(|levels| levels.iter().position(|level| level == value))
    }

    /// Row-aligned numeric view; missing entries are `None`.
    pub fn to_f64_values(&self) -> Result<Vec<Option<f64>>, ColumnError> {
        if !self.dtype.is_numeric() && self.dtype != DType::Null {
            return Err(ColumnError::NotNumeric { dtype: self.dtype });
        }
        Ok(self
            .values
            .iter()
            .map(|v| if v.is_missing() { None } else { v.to_f64().ok() })
            .collect())
    }

    /// Gather rows by position, keeping dtype and levels.
    pub fn take(&self, positions: &[usize]) -> Result<Self, ColumnError> {
        let len = self.values.len();
        let values = positions
            .iter()
            .map(|&position| {
                self.values
                    .get(position)
                    .cloned()
                    .ok_or(ColumnError::PositionOutOfBounds { position, len })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let validity = ValidityMask::from_values(&values);
        Ok(Self {
            dtype: self.dtype,
            values,
            validity,
            levels: self.levels.clone(),
        })
    }
}

fn coerce(dtype: DType, values: Vec<Scalar>) -> Result<Vec<Scalar>, ColumnError> {
    values
        .into_iter()
        .map(|value| cast_scalar_owned(value, dtype).map_err(ColumnError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use fd_types::{DType, NullKind, Scalar, TypeError};

    use super::{Column, ColumnError, ValidityMask};

    fn levels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn validity_mask_counts_across_word_boundary() {
        let mut values = vec![Scalar::Int64(1); 70];
        values[3] = Scalar::Null(NullKind::Null);
        values[65] = Scalar::Float64(f64::NAN);
        let mask = ValidityMask::from_values(&values);
        assert_eq!(mask.len(), 70);
        assert_eq!(mask.count_valid(), 68);
        assert!(!mask.get(3));
        assert!(!mask.get(65));
        assert!(!mask.get(500));
    }

    #[test]
    fn validity_mask_serde_uses_bit_list() {
        let mask = ValidityMask::from_values(&[Scalar::Int64(1), Scalar::Null(NullKind::Null)]);
        let json = serde_json::to_string(&mask).expect("serialize");
        assert_eq!(json, r#"{"bits":[true,false]}"#);
        let back: ValidityMask = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, mask);
    }

    #[test]
    fn new_coerces_int_to_float() {
        let column = Column::new(DType::Float64, vec![Scalar::Int64(2), Scalar::Float64(1.5)])
            .expect("column");
        assert_eq!(column.values()[0], Scalar::Float64(2.0));
        assert_eq!(column.count_valid(), 2);
    }

    #[test]
    fn new_marks_nulls_with_the_dtype_missing_marker() {
        let column = Column::new(
            DType::Float64,
            vec![Scalar::Null(NullKind::Null), Scalar::Int64(4)],
        )
        .expect("column");
        assert_eq!(column.values()[0], Scalar::Null(NullKind::NaN));
        assert_eq!(column.count_valid(), 1);
    }

    #[test]
    fn new_rejects_fractional_values_in_int_column() {
        let err = Column::new(DType::Int64, vec![Scalar::Int64(1), Scalar::Float64(2.5)])
            .expect_err("lossy");
        assert!(matches!(
            err,
            ColumnError::Type(TypeError::LossyFloatToInt { .. })
        ));
        assert_eq!(err.to_string(), "cannot cast float 2.5 to int64 without loss");

        let whole = Column::new(DType::Int64, vec![Scalar::Float64(3.0)]).expect("whole");
        assert_eq!(whole.values()[0], Scalar::Int64(3));
    }

    #[test]
    fn new_rejects_category_without_levels() {
        let err = Column::new(DType::Category, vec![]).expect_err("levels required");
        assert_eq!(err, ColumnError::CategoryLevelsRequired);
    }

    #[test]
    fn categorical_ranks_by_declared_levels() {
        let column = Column::categorical(
            levels(&["zero", "one", "two_or_more"]),
            vec![
                Scalar::Utf8("one".to_owned()),
                Scalar::Null(NullKind::Null),
                Scalar::Utf8("zero".to_owned()),
            ],
        )
        .expect("categorical");
        assert_eq!(column.dtype(), DType::Category);
        assert_eq!(column.category_rank("two_or_more"), Some(2));
        assert_eq!(column.category_rank("three"), None);
        assert_eq!(column.count_valid(), 2);
    }

    #[test]
    fn categorical_rejects_unknown_value() {
        let err = Column::categorical(
            levels(&["Economy", "Business"]),
            vec![Scalar::Utf8("First".to_owned())],
        )
        .expect_err("unknown level");
        assert_eq!(
            err,
            ColumnError::UnknownCategory {
                value: "First".to_owned()
            }
        );
    }

    #[test]
    fn categorical_rejects_duplicate_levels() {
        let err = Column::categorical(levels(&["a", "b", "a"]), vec![]).expect_err("dup");
        assert!(matches!(err, ColumnError::DuplicateCategoryLevel { .. }));
    }

    #[test]
    fn to_f64_values_maps_missing_to_none() {
        let column = Column::from_values(vec![
            Scalar::Int64(3),
            Scalar::Null(NullKind::Null),
            Scalar::Int64(5),
        ])
        .expect("column");
        assert_eq!(
            column.to_f64_values().expect("numeric"),
            vec![Some(3.0), None, Some(5.0)]
        );
    }

    #[test]
    fn to_f64_values_rejects_text() {
        let column = Column::from_values(vec![Scalar::Utf8("x".to_owned())]).expect("column");
        let err = column.to_f64_values().expect_err("not numeric");
        assert_eq!(err, ColumnError::NotNumeric { dtype: DType::Utf8 });
    }

    #[test]
    fn take_gathers_positions_and_keeps_levels() {
        let column = Column::categorical(
            levels(&["Economy", "Business"]),
            vec![
                Scalar::Utf8("Economy".to_owned()),
                Scalar::Utf8("Business".to_owned()),
            ],
        )
        .expect("categorical");
        let taken = column.take(&[1, 1, 0]).expect("take");
        assert_eq!(taken.len(), 3);
        assert_eq!(taken.value(0), Some(&Scalar::Utf8("Business".to_owned())));
        assert_eq!(taken.levels(), column.levels());

        let err = column.take(&[2]).expect_err("out of bounds");
        assert_eq!(err, ColumnError::PositionOutOfBounds { position: 2, len: 2 });
    }
}
