//! # Feature Encoding
//!
//! Turns records into the numeric design matrix shared by every model family.
//!
//! The [`EncodingSchema`] is fitted once on the training records and then applied
//! verbatim to any other subset, so train and test matrices always have the same
//! columns in the same order with the same reference levels. Numeric fields pass
//! through unchanged. A categorical field with `k` levels expands to `k - 1`
//! indicator columns named R-style (`smokeryes`, `regionnorthwest`, ...).
//!
//! Reference levels are an explicit part of the schema. They come from
//! [`EncoderConfig::reference_levels`] when configured, and otherwise default to
//! the alphabetically first level seen in training. Either way the chosen level
//! is stored and reported.
//!
//! A level that only appears outside the training data has no column and is
//! rejected with [`EncodeError::UnknownCategoryLevel`] instead of being silently
//! mapped to the reference row.

use crate::data::Record;
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error(
        "Category level '{level}' of field '{field}' was not present in the training data, so it has no encoding column."
    )]
    UnknownCategoryLevel { field: String, level: String },
    #[error(
        "Row {row} has charges = {value}; the log transform requires strictly positive, finite charges."
    )]
    NonPositiveResponse { row: usize, value: f64 },
    #[error("An encoding schema cannot be fitted on an empty set of training records.")]
    EmptyTrainingSet,
    #[error(
        "A reference level was configured for '{field}', which is not a categorical field (expected one of: {expected})."
    )]
    UnknownReferenceField { field: String, expected: String },
}

/// The predictor fields of a record, in their canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordField {
    Age,
    Gender,
    Bmi,
    Kids,
    Smoker,
    Exercise,
    Region,
}

impl RecordField {
    /// Predictor fields in design-matrix order. `charges` is the response.
    pub const PREDICTORS: [RecordField; 7] = [
        RecordField::Age,
        RecordField::Gender,
        RecordField::Bmi,
        RecordField::Kids,
        RecordField::Smoker,
        RecordField::Exercise,
        RecordField::Region,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RecordField::Age => "age",
            RecordField::Gender => "gender",
            RecordField::Bmi => "bmi",
            RecordField::Kids => "kids",
            RecordField::Smoker => "smoker",
            RecordField::Exercise => "exercise",
            RecordField::Region => "region",
        }
    }

    pub fn is_categorical(self) -> bool {
        matches!(
            self,
            RecordField::Gender | RecordField::Smoker | RecordField::Region
        )
    }

    fn numeric_value(self, record: &Record) -> f64 {
        match self {
            RecordField::Age => f64::from(record.age),
            RecordField::Bmi => record.bmi,
            RecordField::Kids => f64::from(record.kids),
            RecordField::Exercise => f64::from(record.exercise),
            RecordField::Gender | RecordField::Smoker | RecordField::Region => f64::NAN,
        }
    }

    fn category_value(self, record: &Record) -> &str {
        match self {
            RecordField::Gender => &record.gender,
            RecordField::Smoker => &record.smoker,
            RecordField::Region => &record.region,
            RecordField::Age | RecordField::Bmi | RecordField::Kids | RecordField::Exercise => "",
        }
    }
}

/// User-facing encoder settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Field name to reference level, e.g. `smoker = "no"`. Fields left out use
    /// their alphabetically first training level.
    pub reference_levels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldEncoding {
    Numeric,
    Categorical {
        /// All training levels, sorted. Includes the reference.
        levels: Vec<String>,
        reference: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub field: RecordField,
    pub encoding: FieldEncoding,
}

/// Frozen encoding rules derived from the training records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingSchema {
    pub fields: Vec<SchemaField>,
    /// Output predictor names, in column order.
    pub columns: Vec<String>,
}

/// Numeric predictors plus the log-transformed response for one record subset.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    pub columns: Vec<String>,
    /// Shape `[n_rows, n_predictors]`, no intercept column.
    pub x: Array2<f64>,
    /// `ln(charges)`.
    pub y: Array1<f64>,
    /// Charges on the original scale, kept for back-transformed metrics.
    pub charges: Array1<f64>,
}

impl DesignMatrix {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_predictors(&self) -> usize {
        self.x.ncols()
    }

    /// Builds a matrix directly from numeric parts; `y` is derived as `ln(charges)`.
    pub fn from_parts(
        columns: Vec<String>,
        x: Array2<f64>,
        charges: Array1<f64>,
    ) -> Result<Self, EncodeError> {
        let y = log_response(charges.view())?;
        Ok(Self {
            columns,
            x,
            y,
            charges,
        })
    }

    /// Row subset, keeping the column set.
    pub fn select_rows(&self, rows: &[usize]) -> DesignMatrix {
        DesignMatrix {
            columns: self.columns.clone(),
            x: self.x.select(Axis(0), rows),
            y: self.y.select(Axis(0), rows),
            charges: self.charges.select(Axis(0), rows),
        }
    }

    /// Looks up a predictor column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn as_record<R: Borrow<Record>>(record: &R) -> &Record {
    record.borrow()
}

fn log_response(charges: ArrayView1<f64>) -> Result<Array1<f64>, EncodeError> {
    charges
        .iter()
        .enumerate()
        .map(|(row, &value)| {
            if value > 0.0 && value.is_finite() {
                Ok(value.ln())
            } else {
                Err(EncodeError::NonPositiveResponse { row, value })
            }
        })
        .collect()
}

impl EncodingSchema {
    /// Collects level sets and reference levels from the training records.
    pub fn fit<R: Borrow<Record>>(
        training: &[R],
        config: &EncoderConfig,
    ) -> Result<Self, EncodeError> {
        if training.is_empty() {
            return Err(EncodeError::EmptyTrainingSet);
        }
        let categorical: Vec<&str> = RecordField::PREDICTORS
            .into_iter()
            .filter(|f| f.is_categorical())
            .map(RecordField::name)
            .collect();
        if let Some(field) = config
            .reference_levels
            .keys()
            .find(|key| !categorical.contains(&key.as_str()))
        {
            return Err(EncodeError::UnknownReferenceField {
                field: field.clone(),
                expected: categorical.join(", "),
            });
        }

        let mut fields = Vec::with_capacity(RecordField::PREDICTORS.len());
        let mut columns = Vec::new();
        for field in RecordField::PREDICTORS {
            if !field.is_categorical() {
                columns.push(field.name().to_string());
                fields.push(SchemaField {
                    field,
                    encoding: FieldEncoding::Numeric,
                });
                continue;
            }

            let levels: Vec<String> = training
                .iter()
                .map(|r| field.category_value(as_record(r)).to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let reference = match config.reference_levels.get(field.name()) {
                Some(level) if levels.contains(level) => level.clone(),
                Some(level) => {
                    return Err(EncodeError::UnknownCategoryLevel {
                        field: field.name().to_string(),
                        level: level.clone(),
                    });
                }
                None => levels[0].clone(),
            };
            log::info!(
                "Encoding '{}' with levels [{}], reference level '{}'",
                field.name(),
                levels.iter().join(", "),
                reference
            );

            columns.extend(
                levels
                    .iter()
                    .filter(|level| **level != reference)
                    .map(|level| format!("{}{}", field.name(), level)),
            );
            fields.push(SchemaField {
                field,
                encoding: FieldEncoding::Categorical { levels, reference },
            });
        }

        Ok(Self { fields, columns })
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Numeric encoding of a single record, in schema column order.
    pub fn encode_row(&self, record: &Record) -> Result<Array1<f64>, EncodeError> {
        let mut row = Vec::with_capacity(self.columns.len());
        for schema_field in &self.fields {
            let field = schema_field.field;
            match &schema_field.encoding {
                FieldEncoding::Numeric => row.push(field.numeric_value(record)),
                FieldEncoding::Categorical { levels, reference } => {
                    let value = field.category_value(record);
                    if !levels.iter().any(|l| l == value) {
                        return Err(EncodeError::UnknownCategoryLevel {
                            field: field.name().to_string(),
                            level: value.to_string(),
                        });
                    }
                    row.extend(
                        levels
                            .iter()
                            .filter(|level| *level != reference)
                            .map(|level| if level == value { 1.0 } else { 0.0 }),
                    );
                }
            }
        }
        Ok(Array1::from_vec(row))
    }

    /// Encodes a record subset into a design matrix with the log response.
    pub fn encode<R: Borrow<Record>>(&self, records: &[R]) -> Result<DesignMatrix, EncodeError> {
        let mut x = Array2::zeros((records.len(), self.columns.len()));
        for (i, record) in records.iter().enumerate() {
            let row = self.encode_row(as_record(record))?;
            x.row_mut(i).assign(&row);
        }
        let charges: Array1<f64> = records.iter().map(|r| as_record(r).charges).collect();
        DesignMatrix::from_parts(self.columns.clone(), x, charges)
    }
}
