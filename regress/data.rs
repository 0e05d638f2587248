//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for user-provided data. It reads the
//! medical charges table (CSV, or TSV when the file ends in `.tsv`), validates it
//! against a strict, fixed schema, and turns it into an immutable [`Dataset`].
//!
//! - Strict Schema: column names are not configurable. The file must carry `age`,
//!   `gender`, `bmi`, `kids`, `smoker`, `exercise`, `region` and `charges`.
//!   Extra columns are ignored.
//! - User-Centric Errors: failures are assumed to be user-input errors and the
//!   `DataError` enum is written to say what to fix.
//! - Range checks on the response (`charges > 0`) are left to the encoder, which
//!   is where the log transform actually happens.

use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Column names of the fixed input schema, in record field order.
pub const NUMERIC_COLUMNS: [&str; 5] = ["age", "bmi", "kids", "exercise", "charges"];
pub const CATEGORICAL_COLUMNS: [&str; 3] = ["gender", "smoker", "region"];

/// One observation from the charges table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Age in whole years (18-64 in the reference data).
    pub age: u32,
    /// Binary category, e.g. `female` / `male`.
    pub gender: String,
    pub bmi: f64,
    /// Number of children covered.
    pub kids: u32,
    /// Binary category, e.g. `no` / `yes`.
    pub smoker: String,
    /// Exercise days per week, 0-7.
    pub exercise: u32,
    /// Four-level geographic category.
    pub region: String,
    /// Response variable on the original (currency) scale.
    pub charges: f64,
}

/// The full table, fixed at load time.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Borrows the records at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Vec<&Record> {
        indices.iter().map(|&i| &self.records[i]).collect()
    }

    /// The response column on its original scale.
    pub fn charges(&self) -> Array1<f64> {
        self.records.iter().map(|r| r.charges).collect()
    }
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. This tool requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error(
        "Input file contains only {found} data rows, but at least {required} are needed for cross-validation."
    )]
    InsufficientRows { found: usize, required: usize },
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. This tool requires all data to be finite."
    )]
    NonFiniteValuesFound(String),
}

/// Loads and validates the charges table from `path`.
pub fn load_dataset(path: &str) -> Result<Dataset, DataError> {
    let df = internal::read_frame(path)?;
    internal::frame_to_dataset(&df)
}

/// Internal module for the shared parsing and validation logic.
mod internal {
    use super::*;

    pub(super) const MINIMUM_ROWS: usize = 20;

    pub(super) fn read_frame(path: &str) -> Result<DataFrame, DataError> {
        let separator = if path.ends_with(".tsv") { b'\t' } else { b',' };
        log::info!("Loading data from '{path}'");

        let df = CsvReader::new(File::open(Path::new(path))?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(separator)),
            )
            .finish()?;

        log::info!("Loaded {} rows x {} columns", df.height(), df.width());
        Ok(df)
    }

    fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }

        let wrong_type = || DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        };

        let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
        // A failed string-to-float cast surfaces as new nulls rather than an error.
        if casted.null_count() > 0 {
            return Err(wrong_type());
        }

        let chunked = casted.f64()?.rechunk();
        let values: Vec<f64> = chunked.into_no_null_iter().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(values)
    }

    fn extract_count_column(df: &DataFrame, column_name: &str) -> Result<Vec<u32>, DataError> {
        extract_numeric_column(df, column_name)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
                    Err(DataError::ColumnWrongType {
                        column_name: column_name.to_string(),
                        expected_type: "non-negative integer",
                        found_type: format!("value {value} at row {}", row + 1),
                    })
                } else {
                    Ok(value as u32)
                }
            })
            .collect()
    }

    fn extract_category_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<String>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }
        let casted = series
            .cast(&DataType::String)
            .map_err(|_| DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "string (category)",
                found_type: format!("{:?}", series.dtype()),
            })?;
        let levels = casted.as_materialized_series().str()?;
        let mut values = Vec::with_capacity(levels.len());
        for value in levels.into_iter() {
            match value {
                Some(level) if !level.trim().is_empty() => values.push(level.trim().to_string()),
                _ => return Err(DataError::MissingValuesFound(column_name.to_string())),
            }
        }
        Ok(values)
    }

    pub(super) fn frame_to_dataset(df: &DataFrame) -> Result<Dataset, DataError> {
        if df.height() < MINIMUM_ROWS {
            return Err(DataError::InsufficientRows {
                found: df.height(),
                required: MINIMUM_ROWS,
            });
        }

        let present: HashSet<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        for col_name in NUMERIC_COLUMNS.iter().chain(CATEGORICAL_COLUMNS.iter()) {
            if !present.contains(*col_name) {
                return Err(DataError::ColumnNotFound(col_name.to_string()));
            }
        }

        let age = extract_count_column(df, "age")?;
        let gender = extract_category_column(df, "gender")?;
        let bmi = extract_numeric_column(df, "bmi")?;
        let kids = extract_count_column(df, "kids")?;
        let smoker = extract_category_column(df, "smoker")?;
        let exercise = extract_count_column(df, "exercise")?;
        let region = extract_category_column(df, "region")?;
        let charges = extract_numeric_column(df, "charges")?;

        let records = (0..df.height())
            .map(|i| Record {
                age: age[i],
                gender: gender[i].clone(),
                bmi: bmi[i],
                kids: kids[i],
                smoker: smoker[i].clone(),
                exercise: exercise[i],
                region: region[i].clone(),
                charges: charges[i],
            })
            .collect();

        log::info!("Data validation successful: all eight required columns are complete.");
        Ok(Dataset::new(records))
    }
}
