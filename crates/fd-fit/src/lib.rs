#![forbid(unsafe_code)]

use std::f64::consts::PI;

use fd_frame::{Dataset, FrameError};
use fd_types::ErrorKind;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("column {column:?} has {found} non-null values; a fit needs at least 2")]
    InsufficientData { column: String, found: usize },
    #[error("column {column:?} is constant; fitted scale is zero")]
    DegenerateScale { column: String },
    #[error("sample_count must be at least 2, got {count}")]
    InvalidSampleCount { count: usize },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl FitError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientData { .. } | Self::DegenerateScale { .. } => {
                ErrorKind::DataSufficiency
            }
            Self::InvalidSampleCount { .. } => ErrorKind::Parameter,
            Self::Frame(err) => err.kind(),
        }
    }
}

/// Normal density sampled over the fitted column's observed support.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitCurve {
    pub column: String,
    pub x: Vec<f64>,
    pub density: Vec<f64>,
    /// Fitted mean.
    pub location: f64,
    /// Fitted population standard deviation.
    pub scale: f64,
    /// Observations the fit used.
    pub n: usize,
}

impl FitCurve {
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Density rescaled to the height of a count histogram with `count`
    /// observations in bins `bin_width` wide.
    #[must_use]
    pub fn scaled_to_histogram(&self, count: usize, bin_width: f64) -> Vec<f64> {
        let factor = count as f64 * bin_width;
        self.density.iter().map(|d| d * factor).collect()
    }
}

#[must_use]
pub fn normal_pdf(x: f64, location: f64, scale: f64) -> f64 {
    let z = (x - location) / scale;
    (-0.5 * z * z).exp() / (scale * (2.0 * PI).sqrt())
}

/// `count` evenly spaced points from `start` to `stop`, both inclusive.
#[must_use]
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i == count - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Maximum-likelihood normal fit of `column`: location is the mean, scale
/// the population standard deviation.
pub fn fit_normal(ds: &Dataset, column: &str, sample_count: usize) -> Result<FitCurve, FitError> {
    if sample_count < 2 {
        return Err(FitError::InvalidSampleCount {
            count: sample_count,
        });
    }
    let values = ds.non_null_numeric(column)?;
    if values.len() < 2 {
        return Err(FitError::InsufficientData {
            column: column.to_owned(),
            found: values.len(),
        });
    }

    let insufficient = || FitError::InsufficientData {
        column: column.to_owned(),
        found: values.len(),
    };
    let location = fd_types::mean(&values).ok_or_else(insufficient)?;
    let scale = fd_types::std_dev(&values, 0).ok_or_else(insufficient)?;
    if scale == 0.0 {
        return Err(FitError::DegenerateScale {
            column: column.to_owned(),
        });
    }
    let lo = fd_types::min(&values).ok_or_else(insufficient)?;
    let hi = fd_types::max(&values).ok_or_else(insufficient)?;

    let x = linspace(lo, hi, sample_count);
    let density = x.iter().map(|&v| normal_pdf(v, location, scale)).collect();

    tracing::debug!(column, n = values.len(), location, scale, "normal fit");

    Ok(FitCurve {
        column: column.to_owned(),
        x,
        density,
        location,
        scale,
        n: values.len(),
    })
}

#[cfg(test)]
mod tests {
    use fd_frame::{Dataset, Field, Schema};
    use fd_types::{DType, ErrorKind, NullKind, Scalar};

    use super::{FitError, fit_normal, linspace, normal_pdf};

    fn prices(values: &[Option<i64>]) -> Dataset {
        let schema = Schema::new(vec![
            Field::new("price", DType::Int64),
            Field::new("airline", DType::Utf8),
        ])
        .expect("schema");
        let rows = values
            .iter()
            .map(|v| {
                vec![
                    v.map_or(Scalar::Null(NullKind::Null), Scalar::Int64),
                    Scalar::Utf8("A".to_owned()),
                ]
            })
            .collect();
        Dataset::from_rows(schema, rows).expect("dataset")
    }

    #[test]
    fn fit_recovers_mean_and_population_scale() {
        let ds = prices(&[Some(10), Some(20), Some(30)]);
        let curve = fit_normal(&ds, "price", 100).expect("fit");
        assert_eq!(curve.location, 20.0);
        assert!((curve.scale - (200.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(curve.n, 3);
        assert_eq!(curve.len(), 100);
        assert_eq!(curve.x[0], 10.0);
        assert_eq!(curve.x[99], 30.0);
        assert_eq!(curve.density.len(), 100);
    }

    #[test]
    fn density_peaks_at_location() {
        let ds = prices(&[Some(10), Some(20), Some(30)]);
        let curve = fit_normal(&ds, "price", 3).expect("fit");
        assert_eq!(curve.x, vec![10.0, 20.0, 30.0]);
        assert!(curve.density[1] > curve.density[0]);
        assert!((curve.density[0] - curve.density[2]).abs() < 1e-15);
    }

    #[test]
    fn fit_ignores_nulls() {
        let ds = prices(&[Some(10), None, Some(30)]);
        let curve = fit_normal(&ds, "price", 2).expect("fit");
        assert_eq!(curve.location, 20.0);
        assert_eq!(curve.scale, 10.0);
    }

    #[test]
    fn single_value_is_insufficient() {
        let ds = prices(&[Some(10), None]);
        let err = fit_normal(&ds, "price", 100).expect_err("one value");
        assert_eq!(
            err,
            FitError::InsufficientData {
                column: "price".to_owned(),
                found: 1
            }
        );
        assert_eq!(err.kind(), ErrorKind::DataSufficiency);
    }

    #[test]
    fn constant_column_is_degenerate() {
        let ds = prices(&[Some(7), Some(7), Some(7)]);
        let err = fit_normal(&ds, "price", 10).expect_err("constant");
        assert!(matches!(err, FitError::DegenerateScale { .. }));
        assert_eq!(err.kind(), ErrorKind::DataSufficiency);
    }

    #[test]
    fn parameter_and_schema_errors() {
        let ds = prices(&[Some(1), Some(2)]);
        let err = fit_normal(&ds, "price", 1).expect_err("sample count");
        assert_eq!(err.kind(), ErrorKind::Parameter);
        let err = fit_normal(&ds, "airline", 10).expect_err("text");
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn histogram_scaling_multiplies_density() {
        let ds = prices(&[Some(10), Some(20), Some(30)]);
        let curve = fit_normal(&ds, "price", 5).expect("fit");
        let scaled = curve.scaled_to_histogram(3, 50.0);
        for (s, d) in scaled.iter().zip(&curve.density) {
            assert!((s - d * 150.0).abs() < 1e-12);
        }
    }

    #[test]
    fn linspace_and_pdf_basics() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
        let peak = normal_pdf(0.0, 0.0, 1.0);
        assert!((peak - 0.398_942_280_401_432_7).abs() < 1e-12);
    }
}
