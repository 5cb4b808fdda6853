//! Error types shared by the library modules. Binaries wrap these in
//! `anyhow::Error` with context.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::record::AgeGroup;

/// A batch of records that violates the dataset invariants.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("expected {expected} age groups, found {found}")]
    RowCount { expected: usize, found: usize },

    #[error("age group {0} appears more than once")]
    DuplicateAgeGroup(AgeGroup),

    #[error("record dated {found} does not belong to {expected}")]
    DateMismatch { expected: NaiveDate, found: NaiveDate },

    #[error("male_{what} + female_{what} = {sum} exceeds {what} = {total} for age group {age_group}")]
    SexSumExceedsTotal {
        age_group: AgeGroup,
        what: &'static str,
        sum: u64,
        total: u64,
    },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("could not find the report datetime on the first page")]
    Datetime,

    #[error("could not find the table in the pdf")]
    TableNotFound,

    #[error("table page has no `0-9` row")]
    MissingTableStart,

    #[error("table is truncated: expected {expected} tokens, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("cannot parse {token:?} in column {column}")]
    Token { token: String, column: &'static str },

    #[error("sum of column {column} should be 100.0, it is {sum}")]
    PercentageSum { column: &'static str, sum: f64 },

    #[error(transparent)]
    Invalid(#[from] RecordError),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{0} already exists with different content; dated files are immutable")]
    Immutable(PathBuf),

    #[error("duplicate row ({date}, {age_group}) in the archive")]
    DuplicateKey { date: String, age_group: AgeGroup },

    #[error("invalid records for {date}: {source}")]
    Invalid {
        date: NaiveDate,
        #[source]
        source: RecordError,
    },
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum BadgeError {
    #[error("no file named iccas_<yyyy-mm-dd>.csv in {0}")]
    NoDatedFiles(PathBuf),

    #[error("badge publish failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid gist address: {0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
