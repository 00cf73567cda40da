//! Error types for loading and allocating subjects.

use crate::GroupId;
use thiserror::Error;

/// A malformed subject record. Aborts the whole run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record {record}: missing identifier")]
    MissingId { record: usize },

    #[error("record {record} ({id}): duplicate identifier, first seen at record {first}")]
    DuplicateId { record: usize, id: String, first: usize },

    #[error("record {record} ({id}): missing sex")]
    MissingSex { record: usize, id: String },

    #[error("record {record} ({id}): unrecognized sex '{value}', expected M, F, Male or Female")]
    UnrecognizedSex {
        record: usize,
        id: String,
        value: String,
    },

    #[error("record {record} ({id}): missing genotype")]
    MissingGenotype { record: usize, id: String },

    #[error("record {record} ({id}): genotype '{value}' is not part of the design")]
    UnrecognizedGenotype {
        record: usize,
        id: String,
        value: String,
    },

    #[error("record {record} ({id}): missing baseline")]
    MissingBaseline { record: usize, id: String },

    #[error("record {record} ({id}): baseline '{value}' is not a finite number")]
    InvalidBaseline {
        record: usize,
        id: String,
        value: String,
    },

    #[error("record {record} ({id}): assigned group '{value}' is not a group id")]
    InvalidGroup {
        record: usize,
        id: String,
        value: String,
    },
}

impl ValidationError {
    /// The 1-based record the error refers to.
    pub fn record(&self) -> usize {
        match self {
            ValidationError::MissingId { record }
            | ValidationError::DuplicateId { record, .. }
            | ValidationError::MissingSex { record, .. }
            | ValidationError::UnrecognizedSex { record, .. }
            | ValidationError::MissingGenotype { record, .. }
            | ValidationError::UnrecognizedGenotype { record, .. }
            | ValidationError::MissingBaseline { record, .. }
            | ValidationError::InvalidBaseline { record, .. }
            | ValidationError::InvalidGroup { record, .. } => *record,
        }
    }
}

/// An inconsistent group table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DesignError {
    #[error("design has no arms")]
    NoArms,

    #[error("group {group} is used by more than one arm")]
    DuplicateGroup { group: GroupId },

    #[error("genotype '{genotype}' has more than one group for treatment '{treatment}'")]
    DuplicateArm { genotype: String, treatment: String },

    #[error("invalid design file: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Design(#[from] DesignError),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("workbook has no sheet named '{0}'")]
    MissingSheet(String),

    #[error("chart: {0}")]
    Chart(String),
}

impl AllocationError {
    /// Returns the validation failure, if this error is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            AllocationError::Validation(err) => Some(err),
            _ => None,
        }
    }
}
