//! # Report
//!
//! The finished comparison: configuration echo, encoding schema, split summary
//! and one outcome per model family, keyed by family name. A family that
//! failed keeps its slot with the failure reason so the report always names
//! all four.
//!
//! Reports are written as TOML. Coefficients can additionally be exported as
//! a flat tab-separated table (`model`, `term`, `estimate`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::encode::EncodingSchema;
use crate::model::{FitResult, ModelFamily};
use crate::penalized::CvCurve;
use crate::subset::SubsetCandidate;

/// Term name used for the intercept in coefficient exports.
pub const INTERCEPT_TERM: &str = "(Intercept)";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to read or write report file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to serialize report to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Failed to parse TOML report file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to write coefficient table: {0}")]
    CsvError(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub n_total: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub fraction: f64,
    pub seed: u64,
    pub mean_log_charges_train: f64,
    pub mean_log_charges_test: f64,
}

/// Family-specific selection diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FamilyDetails {
    Subset {
        candidates: Vec<SubsetCandidate>,
        best_bic_size: usize,
        best_cv_size: usize,
    },
    /// One CV curve per alpha tried.
    Path {
        curves: Vec<CvCurve>,
        selected_alpha: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyReport {
    /// The recommended model: minimum BIC for subsets, `lambda_min` for paths.
    pub primary: FitResult,
    /// Other tuning choices, evaluated the same way (CV-optimal subset size,
    /// `lambda_1se`).
    pub alternatives: Vec<FitResult>,
    pub details: FamilyDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FamilyOutcome {
    Fitted(FamilyReport),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub config: PipelineConfig,
    pub schema: EncodingSchema,
    pub split: SplitSummary,
    pub families: BTreeMap<String, FamilyOutcome>,
}

#[derive(Serialize)]
struct CoefficientRow<'a> {
    model: &'a str,
    term: &'a str,
    estimate: f64,
}

impl Report {
    /// The recommended fit of one family, if it succeeded.
    pub fn fit(&self, family: ModelFamily) -> Option<&FitResult> {
        match self.families.get(family.name()) {
            Some(FamilyOutcome::Fitted(report)) => Some(&report.primary),
            _ => None,
        }
    }

    /// Saves the report to a file in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), ReportError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, ReportError> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }

    /// Writes every primary fit's intercept and coefficients as TSV rows.
    pub fn write_coefficients_tsv(&self, path: &str) -> Result<(), ReportError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        for (name, outcome) in &self.families {
            let FamilyOutcome::Fitted(report) = outcome else {
                continue;
            };
            writer.serialize(CoefficientRow {
                model: name,
                term: INTERCEPT_TERM,
                estimate: report.primary.intercept,
            })?;
            for coefficient in &report.primary.coefficients {
                writer.serialize(CoefficientRow {
                    model: name,
                    term: &coefficient.term,
                    estimate: coefficient.estimate,
                })?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
